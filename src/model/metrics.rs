//! Evaluation metrics reported by `Model::score`.

use crate::predictors::LossFunction;
use std::collections::BTreeMap;

pub fn mae(y: &[f64], yhat: &[f64]) -> f64 {
    mean(y.iter().zip(yhat).map(|(a, b)| (a - b).abs()), y.len())
}

pub fn rmse(y: &[f64], yhat: &[f64]) -> f64 {
    mean(y.iter().zip(yhat).map(|(a, b)| (a - b) * (a - b)), y.len()).sqrt()
}

/// Squared correlation between targets and predictions.
pub fn rsquared(y: &[f64], yhat: &[f64]) -> f64 {
    let r = crate::compute::kernel::correlation(y, yhat);
    r * r
}

/// Share of rows whose prediction falls on the right side of `0.5`.
pub fn accuracy(y: &[f64], yhat: &[f64]) -> f64 {
    mean(y.iter().zip(yhat).map(|(&a, &p)| if (p >= 0.5) == (a >= 0.5) { 1.0 } else { 0.0 }), y.len())
}

/// Area under the ROC curve via the rank-sum statistic; tied predictions share
/// their average rank. `NaN` when only one class is present.
pub fn auc(y: &[f64], yhat: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..y.len()).collect();
    order.sort_by(|&a, &b| yhat[a].total_cmp(&yhat[b]));

    let mut ranks = vec![0.0; y.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && yhat[order[end]] == yhat[order[start]] { end += 1; }
        let rank = (start + end + 1) as f64 / 2.0;
        for &k in &order[start..end] { ranks[k] = rank; }
        start = end;
    }

    let positives = y.iter().filter(|&&v| v >= 0.5).count() as f64;
    let negatives = y.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 { return f64::NAN; }
    let rank_sum: f64 = y.iter().zip(&ranks).filter(|(&v, _)| v >= 0.5).map(|(_, r)| r).sum();
    (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

pub fn cross_entropy(y: &[f64], yhat: &[f64]) -> f64 {
    const EPS: f64 = 1e-15;
    mean(y.iter().zip(yhat).map(|(&a, &p)| {
        let p = p.clamp(EPS, 1.0 - EPS);
        -(a * p.ln() + (1.0 - a) * (1.0 - p).ln())
    }), y.len())
}

type Metric = fn(&[f64], &[f64]) -> f64;

fn metrics_for(loss: LossFunction) -> [(&'static str, Metric); 3] {
    if loss.is_classification() {
        [("accuracy", accuracy), ("auc", auc), ("cross_entropy", cross_entropy)]
    } else {
        [("mae", mae), ("rmse", rmse), ("rsquared", rsquared)]
    }
}

/// Names of the metrics reported for `loss`.
pub fn names(loss: LossFunction) -> [&'static str; 3] {
    metrics_for(loss).map(|(name, _)| name)
}

/// All metrics that apply to `loss`, by name.
pub fn evaluate(loss: LossFunction, y: &[f64], yhat: &[f64]) -> BTreeMap<String, f64> {
    metrics_for(loss).iter().map(|(name, f)| (name.to_string(), f(y, yhat))).collect()
}

/// Default objective for `loss` and whether larger values are better.
pub fn default_objective(loss: LossFunction) -> (&'static str, bool) {
    if loss.is_classification() { ("auc", true) } else { ("rmse", false) }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 { return f64::NAN; }
    values.sum::<f64>() / n as f64
}

//! Ranking of candidate features and the optional selection stage that
//! precedes final predictor training.

use crate::compute::{kernel, FeatureMatrix};
use crate::error::Result;
use crate::predictors::{LossFunction, PredictorConfig};
use std::cmp::Ordering;
use tracing::debug;

/// Largest absolute correlation between a feature and any target.
pub fn usefulness(values: &[f64], targets: &[&[f64]]) -> f64 {
    targets.iter().map(|y| kernel::correlation(values, y).abs()).fold(0.0, f64::max)
}

/// A candidate's position in the enumeration, its usefulness and depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub index: usize,
    pub score: f64,
    pub depth: usize,
}

impl Scored {
    /// Higher score first; ties go to the shallower, then the earlier candidate.
    pub fn cmp_rank(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score)
            .then(self.depth.cmp(&other.depth))
            .then(self.index.cmp(&other.index))
    }

    pub fn rank(items: &mut [Scored]) {
        items.sort_by(Scored::cmp_rank);
    }
}

/// Number of features kept for a share, at least one when any exist.
pub fn keep_count(n: usize, share: f64) -> usize {
    if n == 0 { return 0; }
    ((share * n as f64).ceil() as usize).clamp(1, n)
}

/// Columns of `x` to train the final predictor on, in column order.
///
/// With a selector, columns are ranked by its importances after fitting it on
/// all columns; without one, columns are assumed to be in usefulness order
/// already and the leading share is kept.
pub fn select(
    x: &FeatureMatrix,
    y: &[f64],
    selector: Option<&PredictorConfig>,
    loss: LossFunction,
    share: f64,
) -> Result<Vec<usize>> {
    let n = x.n_cols();
    let keep = keep_count(n, share);
    if keep == n {
        return Ok((0..n).collect());
    }

    let mut chosen: Vec<usize> = match selector {
        Some(config) => {
            let mut predictor = config.build(loss);
            predictor.fit(x, y)?;
            let importances = predictor.feature_importances();
            let mut ranked: Vec<Scored> = (0..n)
                .map(|j| Scored { index: j, score: importances.get(j).copied().unwrap_or(0.0), depth: 0 })
                .collect();
            Scored::rank(&mut ranked);
            ranked.into_iter().take(keep).map(|s| s.index).collect()
        }
        None => (0..keep).collect(),
    };
    chosen.sort_unstable();
    debug!(kept = chosen.len(), of = n, "feature selection");
    Ok(chosen)
}

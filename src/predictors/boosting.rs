use super::linear::check_width;
use super::loss::LossFunction;
use super::Predictor;
use crate::compute::kernel::split_points;
use crate::compute::FeatureMatrix;
use crate::error::{EngineError, Result};
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    pub gamma: f64,
    /// Candidate split points per feature.
    pub max_bins: usize,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            max_bins: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    /// Rows with `x[feature] <= threshold` go left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, x: &FeatureMatrix, i: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(w) => return *w,
                Node::Split { feature, threshold, left, right } => {
                    idx = if x.get(i, *feature) <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Second-order gradient boosted regression trees.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: GradientBoostingConfig,
    loss: LossFunction,
    base: f64,
    trees: Vec<Tree>,
    importances: Vec<f64>,
    fitted: bool,
}

struct Grower<'a> {
    config: &'a GradientBoostingConfig,
    x: &'a FeatureMatrix,
    splits: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
}

struct BestSplit {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl Grower<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 { -g / (h + self.config.reg_lambda) }

    fn score(&self, g: f64, h: f64) -> f64 { g * g / (h + self.config.reg_lambda) }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<BestSplit> {
        let candidates: Vec<Option<BestSplit>> = (0..self.x.n_cols()).into_par_iter().map(|f| {
            let col = self.x.column(f);
            let mut sorted: Vec<(f64, f64, f64)> = rows.iter().map(|&i| (col[i], self.grad[i], self.hess[i])).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (mut gl, mut hl, mut cursor) = (0.0, 0.0, 0);
            let mut best: Option<BestSplit> = None;
            for &t in &self.splits[f] {
                while cursor < sorted.len() && sorted[cursor].0 <= t {
                    gl += sorted[cursor].1;
                    hl += sorted[cursor].2;
                    cursor += 1;
                }
                let (gr, hr) = (g_total - gl, h_total - hl);
                if cursor == 0 || cursor == sorted.len() { continue; }
                if hl < self.config.min_child_weight || hr < self.config.min_child_weight { continue; }
                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - self.score(g_total, h_total)) - self.config.gamma;
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { gain, feature: f, threshold: t });
                }
            }
            best
        }).collect();

        candidates.into_iter().flatten().fold(None, |acc: Option<BestSplit>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
    }

    fn grow(&self, rows: Vec<usize>, depth: usize, nodes: &mut Vec<Node>, importances: &mut [f64]) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let idx = nodes.len();
        nodes.push(Node::Leaf(self.leaf_weight(g, h)));

        if depth >= self.config.max_depth || rows.len() < 2 { return idx; }
        let Some(best) = self.best_split(&rows, g, h) else { return idx };
        if best.gain <= 0.0 { return idx; }

        importances[best.feature] += best.gain;
        let col = self.x.column(best.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&i| col[i] <= best.threshold);
        let left = self.grow(left_rows, depth + 1, nodes, importances);
        let right = self.grow(right_rows, depth + 1, nodes, importances);
        nodes[idx] = Node::Split { feature: best.feature, threshold: best.threshold, left, right };
        idx
    }
}

impl GradientBoosting {
    pub fn new(config: GradientBoostingConfig, loss: LossFunction) -> Self {
        Self { config, loss, base: 0.0, trees: Vec::new(), importances: Vec::new(), fitted: false }
    }

    fn raw_scores(&self, x: &FeatureMatrix) -> Vec<f64> {
        (0..x.n_rows())
            .map(|i| self.base + self.config.learning_rate * self.trees.iter().map(|t| t.predict_row(x, i)).sum::<f64>())
            .collect()
    }
}

impl Predictor for GradientBoosting {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        if y.len() != x.n_rows() {
            return Err(EngineError::Computation("feature and target lengths differ".into()));
        }
        if self.loss.is_classification() && y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(EngineError::Config("classification expects targets in {0, 1}".into()));
        }
        let x = x.imputed();
        let n = x.n_rows();
        let splits: Vec<Vec<f64>> = (0..x.n_cols()).into_par_iter()
            .map(|j| split_points(x.column(j).iter().copied(), self.config.max_bins))
            .collect();

        self.base = self.loss.initial(y);
        self.trees.clear();
        self.importances = vec![0.0; x.n_cols()];
        let mut raw = vec![self.base; n];

        for _ in 0..self.config.n_estimators {
            let grad: Vec<f64> = (0..n).map(|i| self.loss.gradient(y[i], raw[i])).collect();
            let hess: Vec<f64> = raw.iter().map(|&r| self.loss.hessian(r)).collect();
            let grower = Grower { config: &self.config, x: &x, splits: &splits, grad: &grad, hess: &hess };

            let mut tree = Tree::default();
            grower.grow((0..n).collect(), 0, &mut tree.nodes, &mut self.importances);
            for (i, r) in raw.iter_mut().enumerate() {
                *r += self.config.learning_rate * tree.predict_row(&x, i);
            }
            self.trees.push(tree);
        }
        debug!(trees = self.trees.len(), columns = x.n_cols(), "gradient boosting fitted");
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if !self.fitted { return Err(EngineError::NotFitted); }
        check_width(x, self.importances.len())?;
        let x = x.imputed();
        Ok(self.raw_scores(&x).into_iter().map(|r| self.loss.link(r)).collect())
    }

    fn feature_importances(&self) -> Vec<f64> { self.importances.clone() }

    fn boxed_clone(&self) -> Box<dyn Predictor> { Box::new(self.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (FeatureMatrix, Vec<f64>) {
        let a: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let noise: Vec<f64> = (0..50).map(|i| ((i * 13) % 7) as f64).collect();
        let y: Vec<f64> = a.iter().map(|&v| if v < 25.0 { 0.0 } else { 1.0 }).collect();
        (FeatureMatrix::from_columns(50, vec![("a".into(), a), ("noise".into(), noise)]).unwrap(), y)
    }

    #[test]
    fn test_regression_fits_step() {
        let (x, y) = step_data();
        let mut gb = GradientBoosting::new(GradientBoostingConfig::default(), LossFunction::SquareLoss);
        gb.fit(&x, &y).unwrap();
        let pred = gb.predict(&x).unwrap();
        assert!(pred[0] < 0.1 && pred[49] > 0.9);
        let imp = gb.feature_importances();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_classification_outputs_probabilities() {
        let (x, y) = step_data();
        let mut gb = GradientBoosting::new(GradientBoostingConfig::default(), LossFunction::CrossEntropyLoss);
        gb.fit(&x, &y).unwrap();
        let pred = gb.predict(&x).unwrap();
        assert!(pred.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(pred[0] < 0.5 && pred[49] > 0.5);
    }

    #[test]
    fn test_deterministic() {
        let (x, y) = step_data();
        let mut a = GradientBoosting::new(GradientBoostingConfig::default(), LossFunction::SquareLoss);
        let mut b = a.clone();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }
}

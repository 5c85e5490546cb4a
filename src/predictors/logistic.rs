use super::linear::{check_width, Scaler};
use super::loss::sigmoid;
use super::{solve_normal, Predictor};
use crate::compute::FeatureMatrix;
use crate::error::{EngineError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    pub lambda: f64,
    pub max_iter: usize,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self { Self { lambda: 1e-4, max_iter: 25 } }
}

/// L2-regularised logistic regression fitted by Newton iterations.
/// Predictions are probabilities of the positive class.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticRegressionConfig,
    scaler: Scaler,
    /// Intercept followed by the standardised coefficients.
    weights: Vec<f64>,
    fitted: bool,
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self { config, ..Default::default() }
    }

    fn design(&self, x: &FeatureMatrix) -> Vec<Vec<f64>> {
        let mut cols = vec![vec![1.0; x.n_rows()]];
        cols.extend((0..x.n_cols()).map(|j| self.scaler.column(x, j)));
        cols
    }

    fn scores(&self, cols: &[Vec<f64>], n: usize) -> Vec<f64> {
        let mut z = vec![0.0; n];
        for (w, col) in self.weights.iter().zip(cols) {
            for (zi, v) in z.iter_mut().zip(col) { *zi += w * v; }
        }
        z
    }
}

impl Predictor for LogisticRegression {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        if y.len() != x.n_rows() {
            return Err(EngineError::Computation("feature and target lengths differ".into()));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(EngineError::Config("logistic regression expects targets in {0, 1}".into()));
        }
        let x = x.imputed();
        let n = x.n_rows();
        self.scaler = Scaler::fit(&x);
        let cols = self.design(&x);
        let k = cols.len();
        self.weights = vec![0.0; k];

        for _ in 0..self.config.max_iter {
            let z = self.scores(&cols, n);
            let p: Vec<f64> = z.iter().map(|&v| sigmoid(v)).collect();
            let w: Vec<f64> = p.iter().map(|&pi| (pi * (1.0 - pi)).max(1e-9)).collect();

            let mut hess = DMatrix::<f64>::zeros(k, k);
            let mut grad = DVector::<f64>::zeros(k);
            for a in 0..k {
                grad[a] = (0..n).map(|i| cols[a][i] * (y[i] - p[i])).sum::<f64>();
                if a > 0 { grad[a] -= self.config.lambda * self.weights[a]; }
                for b in a..k {
                    let v: f64 = (0..n).map(|i| cols[a][i] * w[i] * cols[b][i]).sum();
                    hess[(a, b)] = v;
                    hess[(b, a)] = v;
                }
                if a > 0 { hess[(a, a)] += self.config.lambda; }
            }

            let step = solve_normal(hess, grad);
            if step.iter().any(|s| !s.is_finite()) { break; }
            let mut largest = 0.0f64;
            for (wj, s) in self.weights.iter_mut().zip(&step) {
                *wj += s;
                largest = largest.max(s.abs());
            }
            if largest < 1e-8 { break; }
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if !self.fitted { return Err(EngineError::NotFitted); }
        check_width(x, self.weights.len() - 1)?;
        let x = x.imputed();
        let cols = self.design(&x);
        Ok(self.scores(&cols, x.n_rows()).into_iter().map(sigmoid).collect())
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.weights.iter().skip(1).map(|w| w.abs()).collect()
    }

    fn boxed_clone(&self) -> Box<dyn Predictor> { Box::new(self.clone()) }
}

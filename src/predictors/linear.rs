use super::{solve_normal, Predictor};
use crate::compute::kernel;
use crate::compute::FeatureMatrix;
use crate::error::{EngineError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionConfig {
    /// L2 penalty on the standardised coefficients.
    pub lambda: f64,
}

impl Default for LinearRegressionConfig {
    fn default() -> Self { Self { lambda: 1e-6 } }
}

/// Per-column centring and scaling, fitted on training data.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    /// Fits on `x` (already imputed). Constant columns get scale `0`, which
    /// drops them from the fit.
    pub fn fit(x: &FeatureMatrix) -> Self {
        let (mut mean, mut scale) = (Vec::new(), Vec::new());
        for j in 0..x.n_cols() {
            let col = x.column(j);
            let m = kernel::mean(col);
            let centred: Vec<f64> = col.iter().map(|v| v - m).collect();
            let var = kernel::dot(&centred, &centred) / col.len().max(1) as f64;
            mean.push(m);
            scale.push(if var > 1e-24 { var.sqrt() } else { 0.0 });
        }
        Self { mean, scale }
    }

    /// Standardised copy of column `j`; zeros for constant columns.
    pub fn column(&self, x: &FeatureMatrix, j: usize) -> Vec<f64> {
        let (m, s) = (self.mean[j], self.scale[j]);
        if s == 0.0 { return vec![0.0; x.n_rows()]; }
        x.column(j).iter().map(|v| (v - m) / s).collect()
    }
}

pub(crate) fn check_width(x: &FeatureMatrix, expected: usize) -> Result<()> {
    if x.n_cols() != expected {
        return Err(EngineError::Computation(format!(
            "predictor was fitted on {} features but received {}", expected, x.n_cols()
        )));
    }
    Ok(())
}

/// Ridge regression on standardised features with an unpenalised intercept.
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    config: LinearRegressionConfig,
    scaler: Scaler,
    /// Coefficients on the standardised scale.
    weights: Vec<f64>,
    intercept: f64,
    fitted: bool,
}

impl LinearRegression {
    pub fn new(config: LinearRegressionConfig) -> Self {
        Self { config, ..Default::default() }
    }
}

impl Predictor for LinearRegression {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        if y.len() != x.n_rows() {
            return Err(EngineError::Computation("feature and target lengths differ".into()));
        }
        let x = x.imputed();
        let p = x.n_cols();
        let scaler = Scaler::fit(&x);
        let cols: Vec<Vec<f64>> = (0..p).map(|j| scaler.column(&x, j)).collect();
        let y_mean = kernel::mean(y);
        let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

        let mut gram = DMatrix::<f64>::zeros(p, p);
        let mut rhs = DVector::<f64>::zeros(p);
        for a in 0..p {
            for b in a..p {
                let v = kernel::dot(&cols[a], &cols[b]);
                gram[(a, b)] = v;
                gram[(b, a)] = v;
            }
            gram[(a, a)] += self.config.lambda;
            rhs[a] = kernel::dot(&cols[a], &yc);
        }

        self.weights = solve_normal(gram, rhs).iter().copied().collect();
        self.intercept = y_mean;
        self.scaler = scaler;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if !self.fitted { return Err(EngineError::NotFitted); }
        check_width(x, self.weights.len())?;
        let x = x.imputed();
        let mut out = vec![self.intercept; x.n_rows()];
        for (j, w) in self.weights.iter().enumerate() {
            if *w == 0.0 { continue; }
            for (o, v) in out.iter_mut().zip(self.scaler.column(&x, j)) {
                *o += w * v;
            }
        }
        Ok(out)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.abs()).collect()
    }

    fn boxed_clone(&self) -> Box<dyn Predictor> { Box::new(self.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_linear_relation() {
        let a: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| ((i * 7) % 5) as f64).collect();
        let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| 3.0 * a - 2.0 * b + 1.0).collect();
        let x = FeatureMatrix::from_columns(20, vec![("a".into(), a), ("b".into(), b)]).unwrap();

        let mut lr = LinearRegression::new(LinearRegressionConfig { lambda: 0.0 });
        lr.fit(&x, &y).unwrap();
        let pred = lr.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(&y) {
            assert!((p - t).abs() < 1e-8);
        }
        let imp = lr.feature_importances();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_constant_and_missing_columns() {
        let x = FeatureMatrix::from_columns(3, vec![
            ("c".into(), vec![5.0, 5.0, 5.0]),
            ("m".into(), vec![f64::NAN, 1.0, 2.0]),
        ]).unwrap();
        let mut lr = LinearRegression::new(LinearRegressionConfig::default());
        lr.fit(&x, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(lr.feature_importances()[0], 0.0);
        assert!(lr.predict(&x).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_predict_before_fit() {
        let lr = LinearRegression::new(LinearRegressionConfig::default());
        assert_eq!(lr.predict(&FeatureMatrix::new(1)).unwrap_err(), EngineError::NotFitted);
    }
}

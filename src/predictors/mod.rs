//! Predictors trained on learned features, and the losses they share with
//! boosted feature growth.
pub mod boosting;
pub mod linear;
pub mod logistic;
pub mod loss;

pub use boosting::{GradientBoosting, GradientBoostingConfig};
pub use linear::{LinearRegression, LinearRegressionConfig};
pub use logistic::{LogisticRegression, LogisticRegressionConfig};
pub use loss::LossFunction;

use crate::compute::FeatureMatrix;
use crate::error::{EngineError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use std::fmt;

/// Anything that can be fitted on a feature matrix and predict a target.
/// Missing feature values are read as `0`.
pub trait Predictor: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()>;
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>>;
    /// One non-negative score per column of the training matrix.
    fn feature_importances(&self) -> Vec<f64>;
    fn boxed_clone(&self) -> Box<dyn Predictor>;
}

impl Clone for Box<dyn Predictor> {
    fn clone(&self) -> Self { self.boxed_clone() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictorConfig {
    LinearRegression(LinearRegressionConfig),
    LogisticRegression(LogisticRegressionConfig),
    GradientBoosting(GradientBoostingConfig),
}

impl Default for PredictorConfig {
    fn default() -> Self { PredictorConfig::LinearRegression(LinearRegressionConfig::default()) }
}

impl PredictorConfig {
    pub fn build(&self, loss: LossFunction) -> Box<dyn Predictor> {
        match self {
            PredictorConfig::LinearRegression(c) => Box::new(LinearRegression::new(*c)),
            PredictorConfig::LogisticRegression(c) => Box::new(LogisticRegression::new(*c)),
            PredictorConfig::GradientBoosting(c) => Box::new(GradientBoosting::new(*c, loss)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PredictorConfig::LinearRegression(_) => "linear_regression",
            PredictorConfig::LogisticRegression(_) => "logistic_regression",
            PredictorConfig::GradientBoosting(_) => "gradient_boosting",
        }
    }

    pub fn param_kind(&self, name: &str) -> Option<ParamKind> {
        use ParamKind::*;
        match (self, name) {
            (PredictorConfig::LinearRegression(_), "lambda") => Some(Float),
            (PredictorConfig::LogisticRegression(_), "lambda") => Some(Float),
            (PredictorConfig::LogisticRegression(_), "max_iter") => Some(Integer),
            (PredictorConfig::GradientBoosting(_), "n_estimators" | "max_depth" | "max_bins") => Some(Integer),
            (PredictorConfig::GradientBoosting(_), "learning_rate" | "reg_lambda" | "min_child_weight" | "gamma") => Some(Float),
            _ => None,
        }
    }

    /// Overrides one hyperparameter. Integers are rounded.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        self.param_kind(name).ok_or_else(|| EngineError::Config(format!(
            "{} has no parameter '{}'", self.name(), name
        )))?;
        let int = || to_count(name, value);
        match self {
            PredictorConfig::LinearRegression(c) => c.lambda = value,
            PredictorConfig::LogisticRegression(c) => match name {
                "lambda" => c.lambda = value,
                _ => c.max_iter = int()?,
            },
            PredictorConfig::GradientBoosting(c) => match name {
                "n_estimators" => c.n_estimators = int()?,
                "max_depth" => c.max_depth = int()?,
                "max_bins" => c.max_bins = int()?,
                "learning_rate" => c.learning_rate = value,
                "reg_lambda" => c.reg_lambda = value,
                "min_child_weight" => c.min_child_weight = value,
                _ => c.gamma = value,
            },
        }
        Ok(())
    }

    pub fn validate(&self, loss: LossFunction) -> Result<()> {
        let bad = |msg: &str| Err(EngineError::Config(format!("{}: {}", self.name(), msg)));
        match self {
            PredictorConfig::LinearRegression(c) => {
                if loss.is_classification() { return bad("cannot be trained with cross entropy loss"); }
                if !(c.lambda >= 0.0) { return bad("lambda must be non-negative"); }
            }
            PredictorConfig::LogisticRegression(c) => {
                if !loss.is_classification() { return bad("requires cross entropy loss"); }
                if !(c.lambda >= 0.0) { return bad("lambda must be non-negative"); }
                if c.max_iter == 0 { return bad("max_iter must be positive"); }
            }
            PredictorConfig::GradientBoosting(c) => {
                if c.n_estimators == 0 { return bad("n_estimators must be positive"); }
                if !(c.learning_rate > 0.0 && c.learning_rate <= 1.0) { return bad("learning_rate must be in (0, 1]"); }
                if !(c.reg_lambda >= 0.0) || !(c.gamma >= 0.0) || !(c.min_child_weight >= 0.0) {
                    return bad("reg_lambda, gamma and min_child_weight must be non-negative");
                }
                if c.max_bins == 0 { return bad("max_bins must be positive"); }
            }
        }
        Ok(())
    }
}

/// Solves the symmetric normal equations `gram * x = rhs`. Singular systems
/// get the least-norm solution, so directions without data stay at zero.
pub(crate) fn solve_normal(gram: DMatrix<f64>, rhs: DVector<f64>) -> DVector<f64> {
    if let Some(chol) = gram.clone().cholesky() {
        let x = chol.solve(&rhs);
        if x.iter().all(|v| v.is_finite()) {
            return x;
        }
    }
    let eps = 1e-12 * gram.amax().max(1.0);
    gram.svd(true, true)
        .solve(&rhs, eps)
        .unwrap_or_else(|_| DVector::zeros(rhs.len()))
}

/// Reads a sampled value as a non-negative integer parameter.
pub(crate) fn to_count(name: &str, value: f64) -> Result<usize> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::Config(format!("parameter '{}' must be a non-negative integer, got {}", name, value)));
    }
    Ok(value.round() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg: PredictorConfig = serde_json::from_str(r#"{"type": "gradient_boosting", "max_depth": 5}"#).unwrap();
        let PredictorConfig::GradientBoosting(c) = cfg else { panic!("wrong variant") };
        assert_eq!(c.max_depth, 5);
        assert_eq!(c.n_estimators, 100);
    }

    #[test]
    fn test_set_param() {
        let mut cfg = PredictorConfig::GradientBoosting(GradientBoostingConfig::default());
        cfg.set_param("n_estimators", 12.4).unwrap();
        cfg.set_param("reg_lambda", 0.5).unwrap();
        let PredictorConfig::GradientBoosting(c) = cfg else { panic!("wrong variant") };
        assert_eq!(c.n_estimators, 12);
        assert_eq!(c.reg_lambda, 0.5);

        let mut lin = PredictorConfig::default();
        assert!(matches!(lin.set_param("max_depth", 3.0), Err(EngineError::Config(_))));
        assert_eq!(lin.param_kind("lambda"), Some(ParamKind::Float));
    }

    #[test]
    fn test_solve_normal_full_rank() {
        // 2x + y = 5, x + 3y = 10
        let x = solve_normal(DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]), DVector::from_vec(vec![5.0, 10.0]));
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_normal_singular_leaves_zero() {
        let x = solve_normal(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]), DVector::from_vec(vec![4.0, 0.0]));
        assert!((x[0] - 4.0).abs() < 1e-10);
        assert!(x[1].abs() < 1e-10);
    }

    #[test]
    fn test_validate_matches_loss() {
        assert!(PredictorConfig::default().validate(LossFunction::CrossEntropyLoss).is_err());
        let log = PredictorConfig::LogisticRegression(LogisticRegressionConfig::default());
        assert!(log.validate(LossFunction::SquareLoss).is_err());
        assert!(log.validate(LossFunction::CrossEntropyLoss).is_ok());
    }
}

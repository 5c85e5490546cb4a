//! Serde-backed model configuration. Everything has a default, so a config
//! file only needs to name what it changes.

use crate::error::{EngineError, Result};
use crate::features::{MultirelConfig, RelboostConfig};
use crate::predictors::{LossFunction, ParamKind, PredictorConfig};
use serde::{Serialize, Deserialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureLearnerConfig {
    Multirel(MultirelConfig),
    Relboost(RelboostConfig),
}

impl Default for FeatureLearnerConfig {
    fn default() -> Self { FeatureLearnerConfig::Multirel(MultirelConfig::default()) }
}

impl FeatureLearnerConfig {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureLearnerConfig::Multirel(_) => "multirel",
            FeatureLearnerConfig::Relboost(_) => "relboost",
        }
    }

    pub fn param_kind(&self, name: &str) -> Option<ParamKind> {
        match self {
            FeatureLearnerConfig::Multirel(_) => MultirelConfig::param_kind(name),
            FeatureLearnerConfig::Relboost(_) => RelboostConfig::param_kind(name),
        }
    }

    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match self {
            FeatureLearnerConfig::Multirel(c) => c.set_param(name, value),
            FeatureLearnerConfig::Relboost(c) => c.set_param(name, value),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FeatureLearnerConfig::Multirel(c) => c.validate(),
            FeatureLearnerConfig::Relboost(c) => c.validate(),
        }
    }
}

/// Which part of a [`ModelConfig`] a tuned parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamTarget {
    FeatureLearner,
    Predictor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub feature_learner: FeatureLearnerConfig,
    pub predictor: PredictorConfig,
    /// Ranks features before the final predictor is trained, if set.
    pub feature_selector: Option<PredictorConfig>,
    pub loss_function: LossFunction,
    pub share_selected_features: f64,
    /// Worker threads per fit; `0` uses the current rayon pool.
    pub num_threads: usize,
    pub seed: u64,
    /// Fit only this target column (by position among the targets).
    pub target_num: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            feature_learner: FeatureLearnerConfig::default(),
            predictor: PredictorConfig::default(),
            feature_selector: None,
            loss_function: LossFunction::SquareLoss,
            share_selected_features: 1.0,
            num_threads: 0,
            seed: 5543,
            target_num: None,
        }
    }
}

impl ModelConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(format!("invalid model config: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Builds a config for `loss` with predictors suited to it.
    pub fn for_loss(loss: LossFunction) -> Self {
        let predictor = if loss.is_classification() {
            PredictorConfig::LogisticRegression(Default::default())
        } else {
            PredictorConfig::default()
        };
        Self { loss_function: loss, predictor, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        self.feature_learner.validate()?;
        self.predictor.validate(self.loss_function)?;
        if let Some(selector) = &self.feature_selector {
            selector.validate(self.loss_function)?;
        }
        if !(self.share_selected_features > 0.0 && self.share_selected_features <= 1.0) {
            return Err(EngineError::Config("share_selected_features must be in (0, 1]".into()));
        }
        Ok(())
    }

    pub fn param_kind(&self, target: ParamTarget, name: &str) -> Option<ParamKind> {
        match target {
            ParamTarget::FeatureLearner => self.feature_learner.param_kind(name),
            ParamTarget::Predictor => self.predictor.param_kind(name),
        }
    }

    pub fn set_param(&mut self, target: ParamTarget, name: &str, value: f64) -> Result<()> {
        match target {
            ParamTarget::FeatureLearner => self.feature_learner.set_param(name, value),
            ParamTarget::Predictor => self.predictor.set_param(name, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = ModelConfig::from_json(r#"{
            "feature_learner": {"type": "relboost", "num_features": 4},
            "loss_function": "cross_entropy_loss",
            "predictor": {"type": "logistic_regression"}
        }"#).unwrap();
        let FeatureLearnerConfig::Relboost(rb) = &cfg.feature_learner else { panic!("wrong learner") };
        assert_eq!(rb.num_features, 4);
        assert_eq!(rb.shrinkage, 0.1);
        assert_eq!(cfg.seed, 5543);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"share_selected_features": 0.5, "num_threads": 2}}"#).unwrap();
        let cfg = ModelConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.share_selected_features, 0.5);
        assert_eq!(cfg.num_threads, 2);
        assert_eq!(ModelConfig::from_json(&cfg.to_json().unwrap()).unwrap(), cfg);
    }

    #[test]
    fn test_unreadable_config_is_config_error() {
        let err = ModelConfig::from_path("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(matches!(ModelConfig::from_json("{"), Err(EngineError::Config(_))));
    }

    #[rstest]
    #[case(ParamTarget::FeatureLearner, "num_features", Some(ParamKind::Integer))]
    #[case(ParamTarget::FeatureLearner, "share_conditions", Some(ParamKind::Float))]
    #[case(ParamTarget::Predictor, "lambda", Some(ParamKind::Float))]
    #[case(ParamTarget::Predictor, "num_features", None)]
    fn test_param_kind(#[case] target: ParamTarget, #[case] name: &str, #[case] expected: Option<ParamKind>) {
        assert_eq!(ModelConfig::default().param_kind(target, name), expected);
    }

    #[test]
    fn test_invalid_share_is_rejected() {
        let cfg = ModelConfig { share_selected_features: 0.0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }
}

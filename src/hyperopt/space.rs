//! Parameter spaces and their routing onto a [`ModelConfig`].

use crate::error::{EngineError, Result};
use crate::model::{ModelConfig, ParamTarget};
use crate::predictors::ParamKind;
use std::collections::BTreeMap;

const PREDICTOR_PREFIX: &str = "predictor__";
const LEGACY_PREDICTOR_PREFIX: &str = "predictor_";

/// Inclusive ranges keyed by parameter name. Names prefixed with
/// `predictor__` tune the predictor; all others tune the feature learner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSpace {
    ranges: BTreeMap<String, (f64, f64)>,
}

/// One resolved axis of a parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    /// The key as written in the space.
    pub key: String,
    pub target: ParamTarget,
    /// The parameter name inside its config.
    pub name: String,
    pub kind: ParamKind,
    pub low: f64,
    pub high: f64,
}

impl ParamSpace {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: &str, low: f64, high: f64) -> Self {
        self.ranges.insert(name.to_string(), (low, high));
        self
    }

    pub fn from_map(ranges: BTreeMap<String, (f64, f64)>) -> Self {
        Self { ranges }
    }

    /// Reads `{"name": [low, high], ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let ranges: BTreeMap<String, [f64; 2]> = serde_json::from_str(json)
            .map_err(|e| EngineError::ParamSpace(format!("invalid parameter space: {}", e)))?;
        Ok(Self::from_map(ranges.into_iter().map(|(k, [lo, hi])| (k, (lo, hi))).collect()))
    }

    pub fn len(&self) -> usize { self.ranges.len() }
    pub fn is_empty(&self) -> bool { self.ranges.is_empty() }

    /// Checks every range against `config` and returns the axes in key order.
    /// All problems are reported together.
    pub fn resolve(&self, config: &ModelConfig) -> Result<Vec<Dimension>> {
        if self.ranges.is_empty() {
            return Err(EngineError::ParamSpace("parameter space is empty".into()));
        }
        let mut dims = Vec::with_capacity(self.ranges.len());
        let mut errors = Vec::new();

        for (key, &(low, high)) in &self.ranges {
            let (target, name) = route(key);
            let Some(kind) = config.param_kind(target, name) else {
                let owner = match target {
                    ParamTarget::Predictor => config.predictor.name(),
                    ParamTarget::FeatureLearner => config.feature_learner.name(),
                };
                errors.push(format!("'{}' is not a parameter of {}", key, owner));
                continue;
            };
            if !low.is_finite() || !high.is_finite() || low > high {
                errors.push(format!("'{}' has invalid range [{}, {}]", key, low, high));
                continue;
            }
            if kind == ParamKind::Integer && (low.fract() != 0.0 || high.fract() != 0.0 || low < 0.0) {
                errors.push(format!("'{}' needs non-negative integer bounds, got [{}, {}]", key, low, high));
                continue;
            }
            dims.push(Dimension { key: key.clone(), target, name: name.to_string(), kind, low, high });
        }

        if errors.is_empty() {
            Ok(dims)
        } else {
            Err(EngineError::ParamSpace(errors.join("; ")))
        }
    }
}

fn route(key: &str) -> (ParamTarget, &str) {
    if let Some(name) = key.strip_prefix(PREDICTOR_PREFIX) {
        (ParamTarget::Predictor, name)
    } else if let Some(name) = key.strip_prefix(LEGACY_PREDICTOR_PREFIX) {
        (ParamTarget::Predictor, name)
    } else {
        (ParamTarget::FeatureLearner, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("predictor__lambda", ParamTarget::Predictor, "lambda")]
    #[case("predictor_lambda", ParamTarget::Predictor, "lambda")]
    #[case("num_features", ParamTarget::FeatureLearner, "num_features")]
    fn test_route(#[case] key: &str, #[case] target: ParamTarget, #[case] name: &str) {
        assert_eq!(route(key), (target, name));
    }

    #[test]
    fn test_resolve_assigns_kinds() {
        let space = ParamSpace::from_json(r#"{"num_features": [2, 8], "predictor__lambda": [0.0, 1.0]}"#).unwrap();
        let dims = space.resolve(&ModelConfig::default()).unwrap();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].key, "num_features");
        assert_eq!(dims[0].kind, ParamKind::Integer);
        assert_eq!(dims[1].target, ParamTarget::Predictor);
        assert_eq!(dims[1].kind, ParamKind::Float);
    }

    #[test]
    fn test_resolve_collects_all_problems() {
        let space = ParamSpace::new()
            .with("no_such_param", 0.0, 1.0)
            .with("share_conditions", 1.0, 0.5)
            .with("num_features", 1.5, 3.0);
        let Err(EngineError::ParamSpace(msg)) = space.resolve(&ModelConfig::default()) else {
            panic!("expected a parameter space error");
        };
        assert!(msg.contains("no_such_param"));
        assert!(msg.contains("share_conditions"));
        assert!(msg.contains("num_features"));
    }

    #[test]
    fn test_empty_space_is_malformed() {
        assert!(matches!(ParamSpace::new().resolve(&ModelConfig::default()), Err(EngineError::ParamSpace(_))));
        assert!(matches!(ParamSpace::from_json("[1, 2]"), Err(EngineError::ParamSpace(_))));
    }
}

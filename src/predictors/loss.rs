use serde::{Serialize, Deserialize};

/// Objective shared by boosted feature growth and the boosting predictor.
/// Raw scores live on the link scale (identity or log-odds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    #[default]
    #[serde(alias = "SquareLoss")]
    SquareLoss,
    #[serde(alias = "CrossEntropyLoss")]
    CrossEntropyLoss,
}

const MIN_HESSIAN: f64 = 1e-6;

pub fn sigmoid(x: f64) -> f64 { 1.0 / (1.0 + (-x).exp()) }

impl LossFunction {
    pub fn is_classification(self) -> bool { self == LossFunction::CrossEntropyLoss }

    /// Best constant raw score for the targets.
    pub fn initial(self, y: &[f64]) -> f64 {
        if y.is_empty() { return 0.0; }
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        match self {
            LossFunction::SquareLoss => mean,
            LossFunction::CrossEntropyLoss => {
                let p = mean.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln()
            }
        }
    }

    /// Derivative of the loss with respect to the raw score.
    #[inline]
    pub fn gradient(self, y: f64, raw: f64) -> f64 {
        match self {
            LossFunction::SquareLoss => raw - y,
            LossFunction::CrossEntropyLoss => sigmoid(raw) - y,
        }
    }

    #[inline]
    pub fn hessian(self, raw: f64) -> f64 {
        match self {
            LossFunction::SquareLoss => 1.0,
            LossFunction::CrossEntropyLoss => {
                let p = sigmoid(raw);
                (p * (1.0 - p)).max(MIN_HESSIAN)
            }
        }
    }

    /// Maps a raw score to a prediction (identity or probability).
    #[inline]
    pub fn link(self, raw: f64) -> f64 {
        match self {
            LossFunction::SquareLoss => raw,
            LossFunction::CrossEntropyLoss => sigmoid(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_scores() {
        assert_eq!(LossFunction::SquareLoss.initial(&[1.0, 3.0]), 2.0);
        assert!(LossFunction::CrossEntropyLoss.initial(&[0.0, 1.0]).abs() < 1e-12);
    }

    #[test]
    fn test_gradients() {
        assert_eq!(LossFunction::SquareLoss.gradient(1.0, 3.0), 2.0);
        assert_eq!(LossFunction::CrossEntropyLoss.gradient(1.0, 0.0), -0.5);
        assert_eq!(LossFunction::CrossEntropyLoss.hessian(0.0), 0.25);
    }

    #[test]
    fn test_serde_accepts_both_spellings() {
        let a: LossFunction = serde_json::from_str("\"CrossEntropyLoss\"").unwrap();
        let b: LossFunction = serde_json::from_str("\"cross_entropy_loss\"").unwrap();
        assert_eq!(a, b);
    }
}

//! Model configuration, the fit/transform/predict/score pipeline and metrics.
pub mod config;
pub mod metrics;
pub mod pipeline;

pub use config::{FeatureLearnerConfig, ModelConfig, ParamTarget};
pub use pipeline::{Model, TargetModel};

//! Hyperparameter search over the feature learner and predictor configs.
pub mod sampler;
pub mod search;
pub mod space;

pub use sampler::{sample, Strategy};
pub use search::{search, HyperparameterSearch, SearchConfig, SearchState, Trial, TrialScore};
pub use space::{Dimension, ParamSpace};

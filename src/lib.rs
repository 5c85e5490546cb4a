//! Relational feature learning: typed tables joined through a leakage-checked
//! graph, feature learners that aggregate over the joins, predictors trained on
//! the learned features, SQL export and hyperparameter search.
//!
//! The Python extension module `_core` is built with the `python` feature.

pub mod analysis;
pub mod codegen;
pub mod compute;
pub mod error;
pub mod features;
pub mod graph;
pub mod hyperopt;
pub mod model;
pub mod predictors;
pub mod store;

pub mod display {
    pub mod trace;
}

#[cfg(feature = "python")]
mod bindings {
    pub mod python;
}

#[cfg(test)]
mod testing;

pub use error::{EngineError, Result};
pub use graph::{JoinGraph, JoinSpec};
pub use hyperopt::{search, HyperparameterSearch, ParamSpace, SearchConfig, Strategy};
pub use model::{FeatureLearnerConfig, Model, ModelConfig};
pub use predictors::{LossFunction, PredictorConfig};
pub use store::{Role, Roles, Table, Value};

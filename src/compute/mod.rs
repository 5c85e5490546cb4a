//! Evaluation machinery: temporal matching, aggregation kernels and feature storage.
pub mod aggregation;
pub mod context;
pub mod kernel;
pub mod ledger;
pub mod matcher;

pub use aggregation::Aggregation;
pub use context::{EdgeView, EvalContext};
pub use ledger::FeatureMatrix;
pub use matcher::{match_rows, Matches};

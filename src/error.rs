//! Error type shared by every stage of the engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A table, column, role or join path does not match what the graph declares.
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Missing target value in column '{column}' of table '{table}' at row {row}")]
    InvalidTarget { table: String, column: String, row: usize },
    /// The requested join would read rows from the future of the population row.
    #[error("Leakage violation: {0}")]
    LeakageViolation(String),
    #[error("Model has not been fitted")]
    NotFitted,
    #[error("Trial {trial} failed: {reason}")]
    TrialFailure { trial: usize, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Malformed parameter space: {0}")]
    ParamSpace(String),
    #[error("Computation error: {0}")]
    Computation(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

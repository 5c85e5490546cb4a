//! Code generation for fitted models.
pub mod sql;

pub use sql::{to_sql, FEATURE_TABLE, ROWNUM};

use crate::error::Result;
use crate::model::Model;

/// SQL computing every feature of a fitted model from the staged tables.
pub fn to_code(model: &Model) -> Result<String> {
    to_sql(model.graph(), model.features()?, model.feature_names()?)
}

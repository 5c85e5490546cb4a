//! Typed tables and the schema arena placeholders point into.
pub mod registry;
pub mod table;
pub mod types;

pub use registry::{SchemaId, SchemaRegistry, TableSchema};
pub use table::{Column, ColumnData, Roles, Table};
pub use types::{ColumnMeta, Role, Unit, Value};

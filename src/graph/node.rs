//! Defines the `Placeholder`, a named stand-in for a table in the join graph.

use crate::store::SchemaId;
use petgraph::graph::NodeIndex;

/// A unique, stable identifier for a placeholder within the join graph.
///
/// This is a type alias for `petgraph::graph::NodeIndex` to abstract the
/// underlying graph implementation.
pub type PlaceholderId = NodeIndex;

/// A table slot in the join graph.
///
/// Several placeholders may reference the same schema (self-joins); they are
/// told apart by their alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Entry in the schema arena describing the columns of this slot.
    pub schema: SchemaId,
    /// Unique name of this slot, used in messages and feature descriptions.
    pub alias: String,
}

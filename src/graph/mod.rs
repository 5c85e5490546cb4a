//! Defines the join graph: placeholders for tables and the temporal joins between them.
pub mod dag;
pub mod edge;
pub mod node;

// Re-export key types for convenient access
pub use dag::JoinGraph;
pub use edge::{EdgeId, JoinEdge, JoinSpec};
pub use node::{Placeholder, PlaceholderId};

//! Static checks over the join graph: traversal, unit rules and table binding.
pub mod topology;
pub mod units;
pub mod validation;

pub use validation::{bind, BoundTables};

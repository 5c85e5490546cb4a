//! Per-fit evaluation state: bound tables, cached matches per edge and
//! memoised subfeature values.

use super::matcher::{match_rows, Matches};
use crate::analysis::BoundTables;
use crate::error::{EngineError, Result};
use crate::graph::{EdgeId, JoinEdge, JoinGraph, PlaceholderId};
use crate::store::Table;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

pub struct EvalContext<'a> {
    graph: &'a JoinGraph,
    tables: BoundTables<'a>,
    matches: Vec<OnceLock<Arc<Matches>>>,
    memo: RwLock<HashMap<String, Arc<Vec<f64>>>>,
}

/// The two tables and the rule of one edge.
pub struct EdgeView<'a> {
    pub edge: &'a JoinEdge,
    pub from: &'a Table,
    pub to: &'a Table,
    pub from_id: PlaceholderId,
    pub to_id: PlaceholderId,
}

impl<'a> EvalContext<'a> {
    pub fn new(graph: &'a JoinGraph, tables: BoundTables<'a>) -> Self {
        let matches = (0..graph.edge_count()).map(|_| OnceLock::new()).collect();
        Self { graph, tables, matches, memo: RwLock::new(HashMap::new()) }
    }

    pub fn graph(&self) -> &'a JoinGraph { self.graph }
    pub fn table(&self, id: PlaceholderId) -> &'a Table { self.tables.get(id) }
    pub fn population(&self) -> &'a Table { self.tables.get(self.graph.population()) }

    pub fn edge_view(&self, id: EdgeId) -> Result<EdgeView<'a>> {
        let (from_id, to_id) = self.graph.endpoints(id)?;
        Ok(EdgeView {
            edge: self.graph.edge(id),
            from: self.tables.get(from_id),
            to: self.tables.get(to_id),
            from_id,
            to_id,
        })
    }

    /// Matches along an edge, computed on first use.
    pub fn matches(&self, id: EdgeId) -> Result<Arc<Matches>> {
        let cell = self.matches.get(id.index()).ok_or_else(|| EngineError::Computation(format!(
            "edge {} is not part of the join graph", id.index()
        )))?;
        if let Some(m) = cell.get() {
            return Ok(Arc::clone(m));
        }
        let view = self.edge_view(id)?;
        let computed = Arc::new(match_rows(view.edge, view.from, view.to)?);
        debug!(
            edge = id.index(),
            from = self.graph.alias(view.from_id),
            to = self.graph.alias(view.to_id),
            pairs = computed.n_pairs(),
            "matched rows"
        );
        // A concurrent caller may have filled the cell first; both results are identical.
        Ok(Arc::clone(cell.get_or_init(|| computed)))
    }

    /// Values memoised under `key`, computing them with `f` on first use.
    pub fn memoized(&self, key: &str, f: impl FnOnce() -> Result<Vec<f64>>) -> Result<Arc<Vec<f64>>> {
        if let Some(v) = self.memo.read().ok().and_then(|m| m.get(key).cloned()) {
            return Ok(v);
        }
        let values = Arc::new(f()?);
        if let Ok(mut memo) = self.memo.write() {
            memo.entry(key.to_string()).or_insert_with(|| Arc::clone(&values));
        }
        Ok(values)
    }
}

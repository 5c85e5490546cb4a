//! dag.rs
//! The placeholder model: an explicit edge list between table slots, rooted at
//! the population placeholder. Joins are validated against the schemas when
//! they are declared; no data is touched here.

use super::edge::{EdgeId, JoinEdge, JoinSpec};
use super::node::{Placeholder, PlaceholderId};
use crate::analysis::topology::{self, JoinPath};
use crate::error::{EngineError, Result};
use crate::store::{Role, SchemaRegistry, TableSchema};
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

#[derive(Debug, Clone)]
pub struct JoinGraph {
    pub(crate) registry: SchemaRegistry,
    pub(crate) graph: DiGraph<Placeholder, JoinEdge>,
    population: PlaceholderId,
}

impl JoinGraph {
    pub fn new(population: TableSchema) -> Result<Self> {
        let mut registry = SchemaRegistry::new();
        let alias = registry.unique_alias(&population.name);
        let schema = registry.intern(population)?;
        let mut graph = DiGraph::new();
        let population = graph.add_node(Placeholder { schema, alias });
        Ok(Self { registry, graph, population })
    }

    pub fn population(&self) -> PlaceholderId { self.population }

    /// Adds a table slot. Adding the same schema twice yields two aliases of
    /// one arena entry, which is how self-joins are declared.
    pub fn add_placeholder(&mut self, schema: TableSchema) -> Result<PlaceholderId> {
        let alias = self.registry.unique_alias(&schema.name);
        let schema = self.registry.intern(schema)?;
        Ok(self.graph.add_node(Placeholder { schema, alias }))
    }

    /// Declares that rows of `to` are aggregated onto rows of `from`.
    pub fn join(&mut self, from: PlaceholderId, to: PlaceholderId, spec: JoinSpec) -> Result<EdgeId> {
        if self.graph.node_weight(from).is_none() || self.graph.node_weight(to).is_none() {
            return Err(EngineError::Schema("join references an unknown placeholder".into()));
        }
        let edge = spec.into_edge();
        self.check_edge(from, to, &edge)?;
        Ok(self.graph.add_edge(from, to, edge))
    }

    fn check_edge(&self, from: PlaceholderId, to: PlaceholderId, edge: &JoinEdge) -> Result<()> {
        let left = self.schema(from);
        let right = self.schema(to);

        left.require(&edge.join_key, Role::JoinKey)?;
        right.require(&edge.other_join_key, Role::JoinKey)?;

        match (&edge.time_stamp, &edge.other_time_stamp) {
            (Some(ts), Some(other)) => {
                left.require(ts, Role::TimeStamp)?;
                right.require(other, Role::TimeStamp)?;
            }
            (None, None) => {}
            _ => return Err(EngineError::Schema(
                "a time stamp on one side of a join requires a time stamp on the other".into()
            )),
        }

        let temporal = edge.is_temporal();
        if let Some(upper) = &edge.upper_time_stamp {
            if !temporal {
                return Err(EngineError::Schema(format!(
                    "upper time stamp '{}' requires a time stamp on the join", upper
                )));
            }
            right.require(upper, Role::TimeStamp)?;
        }

        if !edge.horizon.is_finite() || edge.horizon < 0.0 {
            return Err(EngineError::LeakageViolation(format!(
                "horizon {} on join {} -> {} would read rows from the future",
                edge.horizon, self.alias(from), self.alias(to)
            )));
        }
        if edge.horizon > 0.0 && !temporal {
            return Err(EngineError::Schema("a horizon requires a time stamp on the join".into()));
        }

        if let Some(window) = edge.max_window {
            if !temporal {
                return Err(EngineError::Schema("a window requires a time stamp on the join".into()));
            }
            if !window.is_finite() || window <= 0.0 {
                return Err(EngineError::LeakageViolation(format!(
                    "window {} on join {} -> {} would reach past the population time stamp",
                    window, self.alias(from), self.alias(to)
                )));
            }
        }
        Ok(())
    }

    /// All join paths from the population placeholder up to `max_depth` hops.
    pub fn paths(&self, max_depth: usize) -> Result<Vec<JoinPath>> {
        topology::check_acyclic(self)?;
        Ok(topology::paths(self, max_depth))
    }

    /// Outgoing edges of a placeholder in declaration order.
    pub fn outgoing(&self, id: PlaceholderId) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self.graph.edges_directed(id, Direction::Outgoing).map(|e| e.id()).collect();
        edges.sort();
        edges
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ { self.graph.edge_indices() }
    pub fn placeholder_ids(&self) -> impl Iterator<Item = PlaceholderId> + '_ { self.graph.node_indices() }
    pub fn placeholder_count(&self) -> usize { self.graph.node_count() }
    pub fn edge_count(&self) -> usize { self.graph.edge_count() }

    pub fn placeholder(&self, id: PlaceholderId) -> &Placeholder { &self.graph[id] }
    pub fn schema(&self, id: PlaceholderId) -> &TableSchema { self.registry.get(self.graph[id].schema) }
    pub fn alias(&self, id: PlaceholderId) -> &str { &self.graph[id].alias }
    pub fn edge(&self, id: EdgeId) -> &JoinEdge { &self.graph[id] }

    /// `(from, to)` placeholders of an edge.
    pub fn endpoints(&self, id: EdgeId) -> Result<(PlaceholderId, PlaceholderId)> {
        self.graph.edge_endpoints(id).ok_or_else(|| EngineError::Computation(format!(
            "unknown edge {}", id.index()
        )))
    }
}

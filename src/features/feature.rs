//! The aggregate feature: an aggregation of a source over the rows matched
//! along one edge, optionally filtered by a condition. Sources may themselves
//! be features over the next hop, which is how deeper join paths are expressed.

use super::condition::{time_stamps, Condition};
use crate::compute::{Aggregation, EvalContext};
use crate::error::{EngineError, Result};
use crate::graph::{EdgeId, JoinGraph};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// The matched rows themselves (for `COUNT`).
    Rows,
    /// A numerical or discrete column of the joined table.
    Numerical(String),
    /// A categorical column of the joined table (distinct counts only).
    Categorical(String),
    /// Age of the joined row relative to the aggregating row.
    TimeDiff,
    /// `joined.column - row.other` for two columns sharing a unit.
    SameUnitDiff { column: String, other: String },
    /// A feature computed for every row of the joined table over the next hop.
    Subfeature(Box<AggregateFeature>),
}

impl Source {
    /// Whether `aggregation` may be applied to this source.
    pub fn admits(&self, aggregation: Aggregation) -> bool {
        match self {
            Source::Rows => aggregation == Aggregation::Count,
            Source::Categorical(_) => aggregation.is_counting(),
            _ => aggregation != Aggregation::Count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFeature {
    pub edge: EdgeId,
    pub aggregation: Aggregation,
    pub source: Source,
    pub condition: Option<Condition>,
}

enum Values<'a> {
    Ones,
    Column(&'a [f64]),
    Age(&'a [f64], &'a [f64]),
    Diff(&'a [f64], &'a [f64]),
    Computed(Arc<Vec<f64>>),
}

impl Values<'_> {
    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Values::Ones => 1.0,
            Values::Column(v) => v[j],
            Values::Age(stamps, other) => stamps[i] - other[j],
            Values::Diff(v, other) => v[j] - other[i],
            Values::Computed(v) => v[j],
        }
    }
}

impl AggregateFeature {
    pub fn new(edge: EdgeId, aggregation: Aggregation, source: Source) -> Self {
        Self { edge, aggregation, source, condition: None }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Number of edges between the aggregating table and the deepest table read.
    pub fn depth(&self) -> usize {
        1 + match &self.source {
            Source::Subfeature(f) => f.depth(),
            _ => 0,
        }
    }

    /// Identity used to memoise subfeature values within one evaluation.
    pub fn key(&self) -> String { format!("{:?}", self) }

    /// Values for every row of the table the edge starts from.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<f64>> {
        if !self.source.admits(self.aggregation) {
            return Err(EngineError::Computation(format!(
                "{} cannot aggregate {:?}", self.aggregation, self.source
            )));
        }
        let view = ctx.edge_view(self.edge)?;
        let matches = ctx.matches(self.edge)?;
        let condition = self.condition.as_ref().map(|c| c.bind(&view)).transpose()?;
        let keep = |i: usize, j: usize| condition.as_ref().map_or(true, |c| c.holds(i, j));
        let n = view.from.n_rows();

        if let Source::Categorical(column) = &self.source {
            let values = view.to.text(column)?;
            let mut buf: Vec<&str> = Vec::new();
            return Ok((0..n).map(|i| {
                buf.clear();
                buf.extend(matches.of(i).iter()
                    .map(|&j| j as usize)
                    .filter(|&j| keep(i, j))
                    .filter_map(|j| values[j].as_deref()));
                self.aggregation.apply_text(&buf)
            }).collect());
        }

        let values = match &self.source {
            Source::Rows | Source::Categorical(_) => Values::Ones,
            Source::Numerical(column) => Values::Column(view.to.numeric(column)?),
            Source::TimeDiff => {
                let (stamps, other) = time_stamps(&view)?;
                Values::Age(stamps, other)
            }
            Source::SameUnitDiff { column, other } => {
                Values::Diff(view.to.numeric(column)?, view.from.numeric(other)?)
            }
            Source::Subfeature(sub) => {
                if ctx.graph().endpoints(sub.edge)?.0 != view.to_id {
                    return Err(EngineError::Computation("subfeature does not continue the join path".into()));
                }
                Values::Computed(ctx.memoized(&sub.key(), || sub.evaluate(ctx))?)
            }
        };

        let mut buf = Vec::new();
        Ok((0..n).map(|i| {
            buf.clear();
            buf.extend(matches.of(i).iter()
                .map(|&j| j as usize)
                .filter(|&j| keep(i, j))
                .map(|j| values.get(i, j)));
            self.aggregation.apply(&mut buf)
        }).collect())
    }

    pub fn describe(&self, graph: &JoinGraph) -> String {
        let (parent, alias) = match graph.endpoints(self.edge) {
            Ok((from, to)) => (graph.alias(from), graph.alias(to)),
            Err(_) => ("?", "?"),
        };
        let source = match &self.source {
            Source::Rows => "*".to_string(),
            Source::Numerical(c) | Source::Categorical(c) => format!("{}.{}", alias, c),
            Source::TimeDiff => format!("age({} -> {})", parent, alias),
            Source::SameUnitDiff { column, other } => format!("{}.{} - {}.{}", alias, column, parent, other),
            Source::Subfeature(sub) => format!("[{}]", sub.describe(graph)),
        };
        match &self.condition {
            Some(c) => format!("{}({}) WHERE {}", self.aggregation, source, c.describe(alias, parent)),
            None => format!("{}({})", self.aggregation, source),
        }
    }
}

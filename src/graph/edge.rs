//! Defines the `JoinEdge`, the relational and temporal rule linking two placeholders.

use petgraph::graph::EdgeIndex;

pub type EdgeId = EdgeIndex;

/// How rows of the joined (`to`) placeholder match a row of the `from` placeholder.
///
/// A joined row matches when the join keys are equal and, for temporal edges,
/// its time stamp lies in `[ts - horizon - max_window, ts - horizon]`. If an
/// upper time stamp is set the joined row must also still be valid at `ts`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    /// Join key column of the `from` table.
    pub join_key: String,
    /// Join key column of the `to` table.
    pub other_join_key: String,
    /// Time stamp column of the `from` table.
    pub time_stamp: Option<String>,
    /// Time stamp column of the `to` table.
    pub other_time_stamp: Option<String>,
    /// Column of the `to` table after which a row is no longer valid.
    pub upper_time_stamp: Option<String>,
    /// Minimum age a joined row must have.
    pub horizon: f64,
    /// Maximum age beyond the horizon; unbounded when absent.
    pub max_window: Option<f64>,
}

impl JoinEdge {
    pub fn is_temporal(&self) -> bool {
        self.time_stamp.is_some() && self.other_time_stamp.is_some()
    }
}

/// Builder for a join. Unset counterparts default to the same column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSpec {
    pub join_key: String,
    pub other_join_key: Option<String>,
    pub time_stamp: Option<String>,
    pub other_time_stamp: Option<String>,
    pub upper_time_stamp: Option<String>,
    pub horizon: Option<f64>,
    pub max_window: Option<f64>,
}

impl JoinSpec {
    pub fn new(join_key: &str) -> Self {
        Self { join_key: join_key.to_string(), ..Default::default() }
    }

    pub fn other_join_key(mut self, column: &str) -> Self {
        self.other_join_key = Some(column.to_string());
        self
    }

    pub fn time_stamp(mut self, column: &str) -> Self {
        self.time_stamp = Some(column.to_string());
        self
    }

    pub fn other_time_stamp(mut self, column: &str) -> Self {
        self.other_time_stamp = Some(column.to_string());
        self
    }

    pub fn upper_time_stamp(mut self, column: &str) -> Self {
        self.upper_time_stamp = Some(column.to_string());
        self
    }

    pub fn horizon(mut self, horizon: f64) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn max_window(mut self, window: f64) -> Self {
        self.max_window = Some(window);
        self
    }

    pub(crate) fn into_edge(self) -> JoinEdge {
        let other_time_stamp = self.other_time_stamp.or_else(|| self.time_stamp.clone());
        JoinEdge {
            other_join_key: self.other_join_key.unwrap_or_else(|| self.join_key.clone()),
            join_key: self.join_key,
            time_stamp: self.time_stamp,
            other_time_stamp,
            upper_time_stamp: self.upper_time_stamp,
            horizon: self.horizon.unwrap_or(0.0),
            max_window: self.max_window,
        }
    }
}

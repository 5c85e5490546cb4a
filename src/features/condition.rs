//! Conditions restricting which matched rows enter an aggregation, and the
//! grid of candidate conditions the learners search over.

use crate::analysis::units;
use crate::compute::kernel::split_points;
use crate::compute::EdgeView;
use crate::error::Result;
use crate::store::{ColumnMeta, Role};
use std::collections::HashMap;
use std::fmt;

/// A predicate over a matched pair (aggregating row `i`, joined row `j`).
/// Missing values never satisfy a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The joined row's category equals `category`.
    Equals { column: String, category: String },
    /// The joined row's value is above (`greater`) or at most `threshold`.
    Threshold { column: String, greater: bool, threshold: f64 },
    /// `joined.column - row.other` is above (`greater`) or at most `threshold`.
    SameUnit { column: String, other: String, greater: bool, threshold: f64 },
    /// The joined row is at most `max_age` older than the aggregating row.
    Lag { max_age: f64 },
}

impl Condition {
    pub fn bind<'a>(&'a self, view: &EdgeView<'a>) -> Result<BoundCondition<'a>> {
        Ok(match self {
            Condition::Equals { column, category } => BoundCondition::Equals {
                values: view.to.text(column)?,
                category,
            },
            Condition::Threshold { column, greater, threshold } => BoundCondition::Threshold {
                values: view.to.numeric(column)?,
                greater: *greater,
                threshold: *threshold,
            },
            Condition::SameUnit { column, other, greater, threshold } => BoundCondition::SameUnit {
                values: view.to.numeric(column)?,
                other: view.from.numeric(other)?,
                greater: *greater,
                threshold: *threshold,
            },
            Condition::Lag { max_age } => {
                let (stamps, other_stamps) = time_stamps(view)?;
                BoundCondition::Lag { stamps, other_stamps, max_age: *max_age }
            }
        })
    }

    /// Readable form with `alias` naming the joined table and `parent` the aggregating one.
    pub fn describe(&self, alias: &str, parent: &str) -> String {
        match self {
            Condition::Equals { column, category } => format!("{}.{} = '{}'", alias, column, category),
            Condition::Threshold { column, greater, threshold } => {
                format!("{}.{} {} {}", alias, column, if *greater { ">" } else { "<=" }, threshold)
            }
            Condition::SameUnit { column, other, greater, threshold } => format!(
                "{}.{} - {}.{} {} {}", alias, column, parent, other, if *greater { ">" } else { "<=" }, threshold
            ),
            Condition::Lag { max_age } => format!("age({} -> {}) <= {}", parent, alias, max_age),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe("t2", "t1"))
    }
}

pub(crate) fn time_stamps<'a>(view: &EdgeView<'a>) -> Result<(&'a [f64], &'a [f64])> {
    match (&view.edge.time_stamp, &view.edge.other_time_stamp) {
        (Some(ts), Some(other)) => Ok((view.from.numeric(ts)?, view.to.numeric(other)?)),
        _ => Err(crate::error::EngineError::Schema(
            "time-based condition on a join without time stamps".into()
        )),
    }
}

/// A condition resolved against concrete columns.
pub enum BoundCondition<'a> {
    Equals { values: &'a [Option<String>], category: &'a str },
    Threshold { values: &'a [f64], greater: bool, threshold: f64 },
    SameUnit { values: &'a [f64], other: &'a [f64], greater: bool, threshold: f64 },
    Lag { stamps: &'a [f64], other_stamps: &'a [f64], max_age: f64 },
}

impl BoundCondition<'_> {
    #[inline]
    pub fn holds(&self, i: usize, j: usize) -> bool {
        // NaN comparisons are false, which keeps missing values out.
        match self {
            BoundCondition::Equals { values, category } => values[j].as_deref() == Some(*category),
            BoundCondition::Threshold { values, greater, threshold } => {
                if *greater { values[j] > *threshold } else { values[j] <= *threshold }
            }
            BoundCondition::SameUnit { values, other, greater, threshold } => {
                let d = values[j] - other[i];
                if *greater { d > *threshold } else { d <= *threshold }
            }
            BoundCondition::Lag { stamps, other_stamps, max_age } => stamps[i] - other_stamps[j] <= *max_age,
        }
    }
}

/// Parameters shaping the candidate condition grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionGrid {
    /// Thresholds or categories per column.
    pub size: usize,
    pub allow_sets: bool,
    /// Step of lag windows; quantiles of observed ages when zero.
    pub delta_t: f64,
}

impl ConditionGrid {
    pub fn from_factor(grid_factor: f64, allow_sets: bool, delta_t: f64) -> Self {
        Self { size: ((4.0 * grid_factor).round() as usize).max(1), allow_sets, delta_t }
    }

    /// Candidate conditions for an edge given matched pairs `(i, j)`.
    /// Order is deterministic: categories, thresholds, same-unit, lags.
    pub fn enumerate(&self, view: &EdgeView<'_>, pairs: &[(u32, u32)]) -> Result<Vec<Condition>> {
        let mut out = Vec::new();
        if pairs.is_empty() { return Ok(out); }

        if self.allow_sets {
            for meta in view.to.columns().iter().map(|c| c.meta()).filter(|m| m.role == Role::Categorical) {
                let values = view.to.text(&meta.name)?;
                let mut freq: HashMap<&str, usize> = HashMap::new();
                for &(_, j) in pairs {
                    if let Some(v) = values[j as usize].as_deref() {
                        *freq.entry(v).or_insert(0) += 1;
                    }
                }
                let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
                out.extend(ranked.into_iter().take(self.size).map(|(v, _)| Condition::Equals {
                    column: meta.name.clone(),
                    category: v.to_string(),
                }));
            }
        }

        for meta in comparable_columns(view, false) {
            let values = view.to.numeric(&meta.name)?;
            for t in split_points(pairs.iter().map(|&(_, j)| values[j as usize]), self.size) {
                for greater in [true, false] {
                    out.push(Condition::Threshold { column: meta.name.clone(), greater, threshold: t });
                }
            }
        }

        for (column, other) in same_unit_pairs(view) {
            let values = view.to.numeric(&column.name)?;
            let others = view.from.numeric(&other.name)?;
            let diffs = pairs.iter().map(|&(i, j)| values[j as usize] - others[i as usize]);
            for t in split_points(diffs, self.size) {
                for greater in [true, false] {
                    out.push(Condition::SameUnit {
                        column: column.name.clone(),
                        other: other.name.clone(),
                        greater,
                        threshold: t,
                    });
                }
            }
        }

        if view.edge.is_temporal() {
            if self.delta_t > 0.0 {
                out.extend((1..=self.size).map(|k| Condition::Lag { max_age: k as f64 * self.delta_t }));
            } else {
                let (stamps, other_stamps) = time_stamps(view)?;
                let ages = pairs.iter().map(|&(i, j)| stamps[i as usize] - other_stamps[j as usize]);
                out.extend(split_points(ages, self.size).into_iter().map(|max_age| Condition::Lag { max_age }));
            }
        }
        Ok(out)
    }
}

/// Numeric columns of the joined table usable in thresholds (`comparison_only`
/// allowed) or as aggregation sources (`aggregatable_only`).
pub(crate) fn comparable_columns<'a>(view: &EdgeView<'a>, aggregatable_only: bool) -> Vec<&'a ColumnMeta> {
    view.to.columns().iter()
        .map(|c| c.meta())
        .filter(|m| m.role.is_feature_input())
        .filter(|m| !aggregatable_only || units::aggregatable(m.unit.as_ref()))
        .collect()
}

/// Pairs (joined column, aggregating-row column) that both carry a unit and
/// whose units agree, excluding the join's own time stamps.
pub(crate) fn same_unit_pairs<'a>(view: &EdgeView<'a>) -> Vec<(&'a ColumnMeta, &'a ColumnMeta)> {
    let usable = |m: &&ColumnMeta| {
        (m.role.is_feature_input() || m.role == Role::TimeStamp) && m.unit.is_some()
    };
    let own_ts = |name: &str, side: &Option<String>| side.as_deref() == Some(name);

    let mut out = Vec::new();
    for column in view.to.columns().iter().map(|c| c.meta()).filter(usable) {
        if own_ts(&column.name, &view.edge.other_time_stamp) { continue; }
        for other in view.from.columns().iter().map(|c| c.meta()).filter(usable) {
            if own_ts(&other.name, &view.edge.time_stamp) { continue; }
            if units::compatible(column.unit.as_ref(), other.unit.as_ref()) {
                out.push((column, other));
            }
        }
    }
    out
}

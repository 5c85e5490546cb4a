use serde::{Serialize, Deserialize};
use std::collections::HashSet;
use std::fmt;

/// Reductions applied to the matched rows of one population row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Count,
    CountDistinct,
    CountMinusCountDistinct,
    Max,
    Median,
    Min,
    Sum,
    Var,
}

impl Aggregation {
    pub const ALL: [Aggregation; 9] = [
        Aggregation::Avg,
        Aggregation::Count,
        Aggregation::CountDistinct,
        Aggregation::CountMinusCountDistinct,
        Aggregation::Max,
        Aggregation::Median,
        Aggregation::Min,
        Aggregation::Sum,
        Aggregation::Var,
    ];

    /// Value reported when no (non-missing) value was matched.
    pub fn empty_value(self) -> f64 {
        match self {
            Aggregation::Count
            | Aggregation::CountDistinct
            | Aggregation::CountMinusCountDistinct
            | Aggregation::Sum => 0.0,
            _ => f64::NAN,
        }
    }

    /// Whether the aggregation only counts values and so also accepts categories.
    pub fn is_counting(self) -> bool {
        matches!(self, Aggregation::CountDistinct | Aggregation::CountMinusCountDistinct)
    }

    /// Reduces numeric values. Missing values (`NaN`) are ignored.
    /// `values` is reordered in place.
    pub fn apply(self, values: &mut Vec<f64>) -> f64 {
        if self == Aggregation::Count {
            return values.len() as f64;
        }
        values.retain(|v| !v.is_nan());
        if values.is_empty() {
            return self.empty_value();
        }
        let n = values.len() as f64;
        match self {
            Aggregation::Count => n,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / n,
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Var => {
                let mean = values.iter().sum::<f64>() / n;
                values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
            }
            Aggregation::Median => {
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 1 { values[mid] } else { 0.5 * (values[mid - 1] + values[mid]) }
            }
            Aggregation::CountDistinct => distinct_bits(values) as f64,
            Aggregation::CountMinusCountDistinct => n - distinct_bits(values) as f64,
        }
    }

    /// Reduces categories. Only counting aggregations are meaningful here;
    /// anything else yields the missing marker.
    pub fn apply_text(self, values: &[&str]) -> f64 {
        let distinct = || values.iter().collect::<HashSet<_>>().len() as f64;
        match self {
            Aggregation::Count => values.len() as f64,
            Aggregation::CountDistinct => distinct(),
            Aggregation::CountMinusCountDistinct => values.len() as f64 - distinct(),
            _ => f64::NAN,
        }
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::CountDistinct => "COUNT DISTINCT",
            Aggregation::CountMinusCountDistinct => "COUNT MINUS COUNT DISTINCT",
            Aggregation::Max => "MAX",
            Aggregation::Median => "MEDIAN",
            Aggregation::Min => "MIN",
            Aggregation::Sum => "SUM",
            Aggregation::Var => "VAR",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

fn distinct_bits(values: &[f64]) -> usize {
    // -0.0 and 0.0 are the same value for counting purposes.
    values.iter().map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() }).collect::<HashSet<_>>().len()
}

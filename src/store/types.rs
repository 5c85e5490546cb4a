use serde::{Serialize, Deserialize};
use std::fmt;

/// The role a column plays during feature learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    JoinKey,
    TimeStamp,
    Categorical,
    Numerical,
    Discrete,
    Target,
    Unused,
}

impl Role {
    /// Roles stored as `f64` with `NaN` marking missing values.
    pub fn is_numeric(self) -> bool {
        matches!(self, Role::TimeStamp | Role::Numerical | Role::Discrete | Role::Target)
    }

    /// Roles the generator may aggregate or threshold.
    pub fn is_feature_input(self) -> bool {
        matches!(self, Role::Numerical | Role::Discrete)
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join_key" => Some(Role::JoinKey),
            "time_stamp" => Some(Role::TimeStamp),
            "categorical" => Some(Role::Categorical),
            "numerical" => Some(Role::Numerical),
            "discrete" => Some(Role::Discrete),
            "target" => Some(Role::Target),
            "unused" => Some(Role::Unused),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::JoinKey => "join_key",
            Role::TimeStamp => "time_stamp",
            Role::Categorical => "categorical",
            Role::Numerical => "numerical",
            Role::Discrete => "discrete",
            Role::Target => "target",
            Role::Unused => "unused",
        };
        f.write_str(s)
    }
}

const COMPARISON_ONLY: &str = "comparison only";

/// Unit tag of a column.
///
/// Written as `"<name>"` or `"<name>, comparison only"`. Comparison-only
/// columns may appear in conditions and differences but are never aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub comparison_only: bool,
}

impl Unit {
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once(',') {
            Some((name, suffix)) if suffix.trim().eq_ignore_ascii_case(COMPARISON_ONLY) => Self {
                name: name.trim().to_string(),
                comparison_only: true,
            },
            _ => Self { name: s.trim().to_string(), comparison_only: false },
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparison_only {
            write!(f, "{}, {}", self.name, COMPARISON_ONLY)
        } else {
            f.write_str(&self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub role: Role,
    pub unit: Option<Unit>,
}

/// A raw cell used when constructing tables row by row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric reading of the cell; `NaN` for missing values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => Some(f64::NAN),
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            Value::Text(s) if s.trim().is_empty() => Some(f64::NAN),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Textual reading of the cell; `None` for missing values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(i.to_string()),
            Value::Float(x) if x.is_nan() => None,
            Value::Float(x) => Some(x.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self { Value::Float(x) }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i as i64) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map_or(Value::Null, Into::into) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("USD", "USD", false)]
    #[case("year, comparison only", "year", true)]
    #[case("day,Comparison Only", "day", true)]
    #[case("a, b", "a, b", false)]
    fn test_unit_parse(#[case] input: &str, #[case] name: &str, #[case] comparison_only: bool) {
        let unit = Unit::parse(input);
        assert_eq!(unit.name, name);
        assert_eq!(unit.comparison_only, comparison_only);
    }

    #[test]
    fn test_value_readings() {
        assert!(Value::Null.as_f64().unwrap().is_nan());
        assert_eq!(Value::from("2.5").as_f64(), Some(2.5));
        assert_eq!(Value::from("abc").as_f64(), None);
        assert_eq!(Value::from(7).as_text().as_deref(), Some("7"));
        assert_eq!(Value::from(None::<&str>).as_text(), None);
    }
}

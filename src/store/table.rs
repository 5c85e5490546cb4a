//! table.rs
//! Column-major typed tables. Join keys and categoricals are kept as optional
//! strings, every other role as `f64` with `NaN` as the missing marker.

use super::registry::TableSchema;
use super::types::{ColumnMeta, Role, Unit, Value};
use crate::error::{EngineError, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    meta: ColumnMeta,
    data: ColumnData,
}

impl Column {
    /// Builds a numeric column. Fails if the role is stored as text.
    pub fn numeric(name: impl Into<String>, role: Role, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if !role.is_numeric() && role != Role::Unused {
            return Err(EngineError::Schema(format!(
                "column '{}' has role '{}' which cannot hold numeric data", name, role
            )));
        }
        Ok(Self { meta: ColumnMeta { name, role, unit: None }, data: ColumnData::Numeric(values) })
    }

    /// Builds a text column. Fails if the role is stored as numbers.
    pub fn text(name: impl Into<String>, role: Role, values: Vec<Option<String>>) -> Result<Self> {
        let name = name.into();
        if role.is_numeric() {
            return Err(EngineError::Schema(format!(
                "column '{}' has role '{}' which cannot hold text data", name, role
            )));
        }
        Ok(Self { meta: ColumnMeta { name, role, unit: None }, data: ColumnData::Text(values) })
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.meta.unit = Some(Unit::parse(unit));
        self
    }

    pub fn name(&self) -> &str { &self.meta.name }
    pub fn role(&self) -> Role { self.meta.role }
    pub fn unit(&self) -> Option<&Unit> { self.meta.unit.as_ref() }
    pub fn meta(&self) -> &ColumnMeta { &self.meta }
    pub fn data(&self) -> &ColumnData { &self.data }
    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data { ColumnData::Numeric(v) => Some(v), ColumnData::Text(_) => None }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match &self.data { ColumnData::Text(v) => Some(v), ColumnData::Numeric(_) => None }
    }
}

/// Explicit role and unit mapping used when loading raw rows.
#[derive(Debug, Clone, Default)]
pub struct Roles {
    roles: HashMap<String, Role>,
    units: HashMap<String, Unit>,
}

impl Roles {
    pub fn new() -> Self { Self::default() }

    pub fn set(mut self, column: &str, role: Role) -> Self {
        self.roles.insert(column.to_string(), role);
        self
    }

    pub fn join_key(self, column: &str) -> Self { self.set(column, Role::JoinKey) }
    pub fn time_stamp(self, column: &str) -> Self { self.set(column, Role::TimeStamp) }
    pub fn categorical(self, column: &str) -> Self { self.set(column, Role::Categorical) }
    pub fn numerical(self, column: &str) -> Self { self.set(column, Role::Numerical) }
    pub fn discrete(self, column: &str) -> Self { self.set(column, Role::Discrete) }
    pub fn target(self, column: &str) -> Self { self.set(column, Role::Target) }
    pub fn unused(self, column: &str) -> Self { self.set(column, Role::Unused) }

    pub fn unit(mut self, column: &str, unit: &str) -> Self {
        self.units.insert(column.to_string(), Unit::parse(unit));
        self
    }

    pub fn role_of(&self, column: &str) -> Role {
        self.roles.get(column).copied().unwrap_or(Role::Unused)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Assembles a table from finished columns.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        let n_rows = columns.first().map_or(0, Column::len);
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name()) {
                return Err(EngineError::Schema(format!(
                    "duplicate column '{}' in table '{}'", col.name(), name
                )));
            }
            if col.len() != n_rows {
                return Err(EngineError::Schema(format!(
                    "column '{}' of table '{}' has {} rows, expected {}", col.name(), name, col.len(), n_rows
                )));
            }
            check_target(&name, col)?;
        }
        Ok(Self { name, columns, n_rows })
    }

    /// Loads raw rows using an explicit role mapping. Columns without a role
    /// become `unused`.
    pub fn from_rows(name: impl Into<String>, roles: &Roles, header: &[&str], rows: &[Vec<Value>]) -> Result<Self> {
        let name = name.into();
        let mut columns = Vec::with_capacity(header.len());

        for (j, &col_name) in header.iter().enumerate() {
            let role = roles.role_of(col_name);
            let cells = rows.iter().enumerate().map(|(i, row)| {
                row.get(j).ok_or_else(|| EngineError::Schema(format!(
                    "row {} of table '{}' has {} cells, expected {}", i, name, row.len(), header.len()
                )))
            });

            let mut col = if role.is_numeric() {
                let mut values = Vec::with_capacity(rows.len());
                for (i, cell) in cells.enumerate() {
                    let cell = cell?;
                    values.push(cell.as_f64().ok_or_else(|| EngineError::Schema(format!(
                        "cannot read {:?} in column '{}' row {} of table '{}' as a number", cell, col_name, i, name
                    )))?);
                }
                Column::numeric(col_name, role, values)?
            } else {
                let values = cells.map(|c| c.map(Value::as_text)).collect::<Result<Vec<_>>>()?;
                Column::text(col_name, role, values)?
            };
            col.meta.unit = roles.units.get(col_name).cloned();
            columns.push(col);
        }

        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != header.len()) {
            return Err(EngineError::Schema(format!(
                "row {} of table '{}' has {} cells, expected {}", i, name, row.len(), header.len()
            )));
        }

        let mut table = Self::from_columns(name, columns)?;
        table.n_rows = rows.len();
        Ok(table)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn n_rows(&self) -> usize { self.n_rows }
    pub fn columns(&self) -> &[Column] { &self.columns }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn columns_with_role(&self, role: Role) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(move |c| c.role() == role)
    }

    /// Numeric values of a column, or a schema error naming the table.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        self.column(name).and_then(Column::as_numeric).ok_or_else(|| EngineError::Schema(format!(
            "table '{}' has no numeric column '{}'", self.name, name
        )))
    }

    pub fn text(&self, name: &str) -> Result<&[Option<String>]> {
        self.column(name).and_then(Column::as_text).ok_or_else(|| EngineError::Schema(format!(
            "table '{}' has no text column '{}'", self.name, name
        )))
    }

    /// Rows for which `predicate(row)` holds, in order.
    pub fn filter(&self, predicate: impl Fn(usize) -> bool) -> Table {
        let rows: Vec<usize> = (0..self.n_rows).filter(|&i| predicate(i)).collect();
        self.take(&rows)
    }

    pub fn mask(&self, keep: &[bool]) -> Result<Table> {
        if keep.len() != self.n_rows {
            return Err(EngineError::Schema(format!(
                "mask has {} entries but table '{}' has {} rows", keep.len(), self.name, self.n_rows
            )));
        }
        Ok(self.filter(|i| keep[i]))
    }

    fn take(&self, rows: &[usize]) -> Table {
        let columns = self.columns.iter()
            .map(|c| Column { meta: c.meta.clone(), data: c.data.take(rows) })
            .collect();
        Table { name: self.name.clone(), columns, n_rows: rows.len() }
    }

    /// Appends a column. The first column of an empty table fixes the row count.
    pub fn with_column(mut self, column: Column) -> Result<Table> {
        if self.column(column.name()).is_some() {
            return Err(EngineError::Schema(format!(
                "table '{}' already has a column '{}'", self.name, column.name()
            )));
        }
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(EngineError::Schema(format!(
                "column '{}' has {} rows but table '{}' has {}", column.name(), column.len(), self.name, self.n_rows
            )));
        }
        check_target(&self.name, &column)?;
        self.n_rows = column.len();
        self.columns.push(column);
        Ok(self)
    }

    /// Appends the rows of a table with identical column names and roles.
    pub fn append_rows(&mut self, other: &Table) -> Result<()> {
        if self.columns.len() != other.columns.len() {
            return Err(EngineError::Schema(format!(
                "cannot append '{}' to '{}': column counts differ", other.name, self.name
            )));
        }
        for col in &self.columns {
            match other.column(col.name()) {
                Some(o) if o.role() == col.role() => {}
                _ => return Err(EngineError::Schema(format!(
                    "cannot append '{}' to '{}': column '{}' missing or has another role",
                    other.name, self.name, col.name()
                ))),
            }
        }
        for col in &mut self.columns {
            let Some(src) = other.columns.iter().find(|o| o.name() == col.name()) else { continue };
            match (&mut col.data, &src.data) {
                (ColumnData::Numeric(a), ColumnData::Numeric(b)) => a.extend_from_slice(b),
                (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b.iter().cloned()),
                _ => return Err(EngineError::Computation(format!(
                    "column '{}' changed storage type", col.name()
                ))),
            }
        }
        self.n_rows += other.n_rows;
        Ok(())
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| c.meta.clone()).collect(),
        }
    }
}

fn check_target(table: &str, col: &Column) -> Result<()> {
    if col.role() != Role::Target { return Ok(()); }
    if let Some(values) = col.as_numeric() {
        if let Some(row) = values.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::InvalidTarget {
                table: table.to_string(),
                column: col.name().to_string(),
                row,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peripheral() -> Table {
        let roles = Roles::new().join_key("jk").time_stamp("ts").numerical("x").unit("x", "USD");
        Table::from_rows("PERIPHERAL", &roles, &["jk", "ts", "x", "note"], &[
            vec![1.into(), 9.0.into(), 1.5.into(), "a".into()],
            vec!["1".into(), 11.0.into(), Value::Null, "b".into()],
            vec![Value::Null, 15.0.into(), 2.0.into(), "c".into()],
        ]).unwrap()
    }

    #[test]
    fn test_from_rows_applies_roles_and_units() {
        let t = peripheral();
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.column("note").unwrap().role(), Role::Unused);
        assert_eq!(t.text("jk").unwrap(), &[Some("1".to_string()), Some("1".to_string()), None]);
        assert!(t.numeric("x").unwrap()[1].is_nan());
        assert_eq!(t.column("x").unwrap().unit().unwrap().name, "USD");
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let roles = Roles::new().join_key("jk").target("y");
        let err = Table::from_rows("POPULATION", &roles, &["jk", "y"], &[
            vec!["a".into(), 1.0.into()],
            vec!["b".into(), Value::Null],
        ]).unwrap_err();
        assert_eq!(err, EngineError::InvalidTarget { table: "POPULATION".into(), column: "y".into(), row: 1 });
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let roles = Roles::new().join_key("jk");
        let res = Table::from_rows("T", &roles, &["jk", "x"], &[vec!["a".into()]]);
        assert!(matches!(res, Err(EngineError::Schema(_))));
    }

    #[test]
    fn test_filter_and_mask() {
        let t = peripheral();
        let late = t.filter(|i| t.numeric("ts").unwrap()[i] > 10.0);
        assert_eq!(late.n_rows(), 2);
        assert_eq!(late.numeric("ts").unwrap(), &[11.0, 15.0]);
        assert!(t.mask(&[true]).is_err());
        assert_eq!(t.mask(&[true, false, false]).unwrap().n_rows(), 1);
    }

    #[test]
    fn test_with_column_checks_length() {
        let t = peripheral();
        let ok = t.clone().with_column(Column::numeric("z", Role::Numerical, vec![0.0; 3]).unwrap()).unwrap();
        assert_eq!(ok.columns().len(), 5);
        let bad = t.with_column(Column::numeric("z", Role::Numerical, vec![0.0; 2]).unwrap());
        assert!(matches!(bad, Err(EngineError::Schema(_))));
    }

    #[test]
    fn test_append_rows() {
        let mut t = peripheral();
        let other = peripheral();
        t.append_rows(&other).unwrap();
        assert_eq!(t.n_rows(), 6);
        assert_eq!(t.numeric("ts").unwrap()[3], 9.0);
    }

    #[test]
    fn test_role_storage_mismatch() {
        assert!(Column::numeric("jk", Role::JoinKey, vec![1.0]).is_err());
        assert!(Column::text("y", Role::Target, vec![None]).is_err());
    }
}

//! ledger.rs
//! Column-major storage for feature values.

use crate::error::{EngineError, Result};

/// A dense feature table: `n_cols` named columns of `n_rows` values each,
/// laid out column after column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    n_rows: usize,
    names: Vec<String>,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(n_rows: usize) -> Self {
        Self { n_rows, names: Vec::new(), data: Vec::new() }
    }

    pub fn from_columns(n_rows: usize, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut m = Self::new(n_rows);
        m.data.reserve(n_rows * columns.len());
        for (name, values) in columns {
            m.push_column(name, &values)?;
        }
        Ok(m)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: &[f64]) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_rows {
            return Err(EngineError::Computation(format!(
                "feature '{}' has {} values, expected {}", name, values.len(), self.n_rows
            )));
        }
        self.names.push(name);
        self.data.extend_from_slice(values);
        Ok(())
    }

    pub fn n_rows(&self) -> usize { self.n_rows }
    pub fn n_cols(&self) -> usize { self.names.len() }
    pub fn names(&self) -> &[String] { &self.names }

    #[inline(always)]
    pub fn column(&self, j: usize) -> &[f64] {
        &self.data[j * self.n_rows..(j + 1) * self.n_rows]
    }

    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        self.names.iter().position(|n| n == name).map(|j| self.column(j))
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> f64 { self.data[col * self.n_rows + row] }

    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.n_cols()).map(|j| self.get(i, j)).collect()
    }

    /// A new matrix holding the given columns, in the given order.
    pub fn select(&self, cols: &[usize]) -> FeatureMatrix {
        let mut out = FeatureMatrix::new(self.n_rows);
        out.data.reserve(cols.len() * self.n_rows);
        for &j in cols {
            out.names.push(self.names[j].clone());
            out.data.extend_from_slice(self.column(j));
        }
        out
    }

    /// Copy with missing values replaced by `0`, as predictors expect.
    pub fn imputed(&self) -> FeatureMatrix {
        let mut out = self.clone();
        for v in out.data.iter_mut().filter(|v| !v.is_finite()) {
            *v = 0.0;
        }
        out
    }
}

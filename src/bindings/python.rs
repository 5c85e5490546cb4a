use crate::error::EngineError;
use crate::graph::{JoinGraph, JoinSpec, PlaceholderId};
use crate::hyperopt::{self, ParamSpace, SearchConfig, Strategy};
use crate::model::{Model, ModelConfig};
use crate::store::{Role, Roles, Table, Value};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::{BTreeMap, HashMap};

fn to_py(e: EngineError) -> PyErr {
    match e {
        EngineError::NotFitted | EngineError::Computation(_) | EngineError::TrialFailure { .. } => {
            PyRuntimeError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn to_value(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    if let Ok(v) = obj.extract::<i64>() {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = obj.extract::<f64>() {
        return Ok(Value::Float(v));
    }
    Ok(Value::Text(obj.str()?.to_string()))
}

#[pyclass(name = "_Table")]
#[derive(Debug, Clone)]
pub struct PyTable {
    pub inner: Table,
}

#[pymethods]
impl PyTable {
    #[new]
    #[pyo3(signature = (name, roles, header, rows, units=None))]
    pub fn new(
        name: String,
        roles: HashMap<String, String>,
        header: Vec<String>,
        rows: Vec<Vec<Bound<'_, PyAny>>>,
        units: Option<HashMap<String, String>>,
    ) -> PyResult<Self> {
        let mut mapping = Roles::new();
        for (column, role) in &roles {
            let role = Role::parse(role).ok_or_else(|| PyValueError::new_err(format!("Unknown role '{}'", role)))?;
            mapping = mapping.set(column, role);
        }
        for (column, unit) in units.iter().flatten() {
            mapping = mapping.unit(column, unit);
        }
        let rows = rows.iter()
            .map(|row| row.iter().map(to_value).collect::<PyResult<Vec<_>>>())
            .collect::<PyResult<Vec<_>>>()?;
        let header: Vec<&str> = header.iter().map(String::as_str).collect();
        let inner = Table::from_rows(name, &mapping, &header, &rows).map_err(to_py)?;
        Ok(Self { inner })
    }

    #[getter]
    pub fn name(&self) -> String { self.inner.name().to_string() }

    pub fn n_rows(&self) -> usize { self.inner.n_rows() }

    pub fn column_names(&self) -> Vec<String> {
        self.inner.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

#[pyclass(name = "_JoinGraph")]
#[derive(Debug, Clone)]
pub struct PyJoinGraph {
    inner: JoinGraph,
}

impl PyJoinGraph {
    fn placeholder(&self, id: usize) -> PyResult<PlaceholderId> {
        if id < self.inner.placeholder_count() {
            Ok(PlaceholderId::new(id))
        } else {
            Err(PyValueError::new_err(format!("Invalid placeholder id {}", id)))
        }
    }
}

#[pymethods]
impl PyJoinGraph {
    #[new]
    pub fn new(population: &PyTable) -> PyResult<Self> {
        let inner = JoinGraph::new(population.inner.schema()).map_err(to_py)?;
        Ok(Self { inner })
    }

    pub fn population(&self) -> usize { self.inner.population().index() }

    pub fn add_placeholder(&mut self, table: &PyTable) -> PyResult<usize> {
        self.inner.add_placeholder(table.inner.schema()).map(|id| id.index()).map_err(to_py)
    }

    #[pyo3(signature = (
        from, to, join_key, other_join_key=None, time_stamp=None, other_time_stamp=None,
        upper_time_stamp=None, horizon=None, max_window=None
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        &mut self,
        from: usize,
        to: usize,
        join_key: &str,
        other_join_key: Option<&str>,
        time_stamp: Option<&str>,
        other_time_stamp: Option<&str>,
        upper_time_stamp: Option<&str>,
        horizon: Option<f64>,
        max_window: Option<f64>,
    ) -> PyResult<usize> {
        let (from, to) = (self.placeholder(from)?, self.placeholder(to)?);
        let mut spec = JoinSpec::new(join_key);
        if let Some(c) = other_join_key { spec = spec.other_join_key(c); }
        if let Some(c) = time_stamp { spec = spec.time_stamp(c); }
        if let Some(c) = other_time_stamp { spec = spec.other_time_stamp(c); }
        if let Some(c) = upper_time_stamp { spec = spec.upper_time_stamp(c); }
        if let Some(h) = horizon { spec = spec.horizon(h); }
        if let Some(w) = max_window { spec = spec.max_window(w); }
        self.inner.join(from, to, spec).map(|e| e.index()).map_err(to_py)
    }

    pub fn alias(&self, id: usize) -> PyResult<String> {
        Ok(self.inner.alias(self.placeholder(id)?).to_string())
    }
}

#[pyclass(name = "_Model")]
#[derive(Debug, Clone)]
pub struct PyModel {
    inner: Model,
}

fn tables<'a>(peripherals: &'a [PyRef<'_, PyTable>]) -> Vec<&'a Table> {
    peripherals.iter().map(|p| &p.inner).collect()
}

#[pymethods]
impl PyModel {
    #[new]
    #[pyo3(signature = (graph, config_json=None))]
    pub fn new(graph: &PyJoinGraph, config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => ModelConfig::from_json(json).map_err(to_py)?,
            None => ModelConfig::default(),
        };
        Ok(Self { inner: Model::new(graph.inner.clone(), config) })
    }

    pub fn fit(&mut self, population: &PyTable, peripherals: Vec<PyRef<'_, PyTable>>) -> PyResult<()> {
        self.inner.fit(&population.inner, &tables(&peripherals)).map_err(to_py)
    }

    /// Returns `(names, columns)` of the feature matrix.
    pub fn transform(&self, population: &PyTable, peripherals: Vec<PyRef<'_, PyTable>>) -> PyResult<(Vec<String>, Vec<Vec<f64>>)> {
        let m = self.inner.transform(&population.inner, &tables(&peripherals)).map_err(to_py)?;
        let columns = (0..m.n_cols()).map(|j| m.column(j).to_vec()).collect();
        Ok((m.names().to_vec(), columns))
    }

    pub fn predict(&self, population: &PyTable, peripherals: Vec<PyRef<'_, PyTable>>) -> PyResult<Vec<Vec<f64>>> {
        self.inner.predict(&population.inner, &tables(&peripherals)).map_err(to_py)
    }

    pub fn score(
        &self,
        population: &PyTable,
        peripherals: Vec<PyRef<'_, PyTable>>,
    ) -> PyResult<BTreeMap<String, BTreeMap<String, f64>>> {
        self.inner.score(&population.inner, &tables(&peripherals)).map_err(to_py)
    }

    pub fn to_sql(&self) -> PyResult<String> { self.inner.to_sql().map_err(to_py) }

    pub fn describe(&self) -> PyResult<String> { self.inner.describe().map_err(to_py) }

    pub fn config_json(&self) -> PyResult<String> { self.inner.config().to_json().map_err(to_py) }

    pub fn is_fitted(&self) -> bool { self.inner.is_fitted() }
}

/// Runs a hyperparameter search; each trial is `(params, objective, error)`.
#[pyfunction]
#[pyo3(signature = (model, space_json, train, validation, peripherals, n_iter=10, strategy="random", seed=5543))]
#[allow(clippy::too_many_arguments)]
fn search(
    model: &PyModel,
    space_json: &str,
    train: &PyTable,
    validation: &PyTable,
    peripherals: Vec<PyRef<'_, PyTable>>,
    n_iter: usize,
    strategy: &str,
    seed: u64,
) -> PyResult<Vec<(BTreeMap<String, f64>, Option<f64>, Option<String>)>> {
    let strategy = match strategy {
        "random" => Strategy::Random,
        "latin_hypercube" => Strategy::LatinHypercube,
        other => return Err(PyValueError::new_err(format!("Unknown strategy '{}'", other))),
    };
    let space = ParamSpace::from_json(space_json).map_err(to_py)?;
    let config = SearchConfig { n_iter, strategy, seed, ..Default::default() };
    let driver = hyperopt::search(&model.inner, &space, config, &train.inner, &validation.inner, &tables(&peripherals))
        .map_err(to_py)?;
    Ok(driver.trials().iter()
        .map(|t| (t.params.clone(), t.objective(), t.outcome.as_ref().err().map(|e| e.to_string())))
        .collect())
}

/// The `_core` extension module.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTable>()?;
    m.add_class::<PyJoinGraph>()?;
    m.add_class::<PyModel>()?;
    m.add_function(wrap_pyfunction!(search, m)?)?;
    Ok(())
}

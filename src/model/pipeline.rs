//! The trained model: join graph, learned features and one predictor per
//! target. A fit either commits all three or leaves the model unfitted.

use super::config::{FeatureLearnerConfig, ModelConfig};
use super::metrics;
use crate::analysis::topology::check_acyclic;
use crate::analysis::validation::targets;
use crate::analysis::{bind, BoundTables};
use crate::compute::{EvalContext, FeatureMatrix};
use crate::error::{EngineError, Result};
use crate::features::selection::select;
use crate::features::{Feature, Multirel, Relboost};
use crate::graph::JoinGraph;
use crate::predictors::Predictor;
use crate::store::{Role, Table};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Predictor and feature columns used for one target.
#[derive(Debug, Clone)]
pub struct TargetModel {
    pub name: String,
    /// Indices into the model's feature list.
    pub columns: Vec<usize>,
    predictor: Box<dyn Predictor>,
}

#[derive(Debug, Clone)]
struct Fitted {
    features: Vec<Feature>,
    names: Vec<String>,
    targets: Vec<TargetModel>,
}

#[derive(Debug, Clone)]
pub struct Model {
    graph: JoinGraph,
    config: ModelConfig,
    fitted: Option<Fitted>,
}

/// Runs `f` on a dedicated pool of `threads` workers, or on the current pool when zero.
pub(crate) fn run_in_pool<T: Send>(threads: usize, f: impl FnOnce() -> T + Send) -> Result<T> {
    if threads == 0 {
        return Ok(f());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| EngineError::Computation(format!("cannot start worker pool: {}", e)))?;
    Ok(pool.install(f))
}

impl Model {
    pub fn new(graph: JoinGraph, config: ModelConfig) -> Self {
        Self { graph, config, fitted: None }
    }

    pub fn graph(&self) -> &JoinGraph { &self.graph }
    pub fn config(&self) -> &ModelConfig { &self.config }
    pub fn is_fitted(&self) -> bool { self.fitted.is_some() }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(EngineError::NotFitted)
    }

    pub fn features(&self) -> Result<&[Feature]> { Ok(&self.fitted()?.features) }
    pub fn feature_names(&self) -> Result<&[String]> { Ok(&self.fitted()?.names) }
    pub fn target_models(&self) -> Result<&[TargetModel]> { Ok(&self.fitted()?.targets) }

    pub fn target_names(&self) -> Result<Vec<&str>> {
        Ok(self.fitted()?.targets.iter().map(|t| t.name.as_str()).collect())
    }

    /// Learns features on `population` and trains one predictor per target.
    /// Any previous fit is discarded first.
    pub fn fit(&mut self, population: &Table, peripherals: &[&Table]) -> Result<()> {
        self.fitted = None;
        self.config.validate()?;
        check_acyclic(&self.graph)?;

        let all = targets(population);
        if all.is_empty() {
            return Err(EngineError::Schema(format!("population table '{}' has no target column", population.name())));
        }
        let chosen = match self.config.target_num {
            Some(t) => vec![*all.get(t).ok_or_else(|| EngineError::Config(format!(
                "target_num {} out of range; table has {} targets", t, all.len()
            )))?],
            None => all,
        };
        if self.config.loss_function.is_classification() {
            if let Some((name, _)) = chosen.iter().find(|(_, y)| y.iter().any(|&v| v != 0.0 && v != 1.0)) {
                return Err(EngineError::Config(format!("cross entropy loss requires target '{}' in {{0, 1}}", name)));
            }
        }

        let tables = bind(&self.graph, population, peripherals)?;
        info!(
            rows = population.n_rows(),
            targets = chosen.len(),
            learner = self.config.feature_learner.name(),
            "fitting model"
        );
        let fitted = run_in_pool(self.config.num_threads, || self.learn(tables, &chosen))??;
        info!(features = fitted.features.len(), "model fitted");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn learn(&self, tables: BoundTables<'_>, chosen: &[(&str, &[f64])]) -> Result<Fitted> {
        let ctx = EvalContext::new(&self.graph, tables);
        let ys: Vec<&[f64]> = chosen.iter().map(|(_, y)| *y).collect();
        let loss = self.config.loss_function;

        let mut features = Vec::new();
        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); ys.len()];

        match &self.config.feature_learner {
            FeatureLearnerConfig::Multirel(cfg) => {
                let mut rng = StdRng::seed_from_u64(self.config.seed);
                let learned = Multirel::new(cfg, &ctx).fit(&ys, &mut rng)?;
                for (k, (feature, v)) in learned.features.into_iter().zip(learned.values).enumerate() {
                    features.push(Feature::from(feature));
                    names.push(format!("feature_{}", k + 1));
                    values.push(v);
                    groups.iter_mut().for_each(|g| g.push(k));
                }
            }
            FeatureLearnerConfig::Relboost(cfg) => {
                let grown = Relboost::new(cfg, &ctx, loss).fit(&ys)?;
                for (t, ensemble) in grown.into_iter().enumerate() {
                    for (k, (feature, v)) in ensemble.into_iter().enumerate() {
                        groups[t].push(features.len());
                        features.push(Feature::from(feature));
                        names.push(format!("feature_{}_{}", t + 1, k + 1));
                        values.push(v);
                    }
                }
            }
        }
        if let Some(t) = groups.iter().position(Vec::is_empty) {
            return Err(EngineError::Computation(format!("no features were learned for target '{}'", chosen[t].0)));
        }

        let matrix = FeatureMatrix::from_columns(ctx.population().n_rows(), names.iter().cloned().zip(values).collect())?;
        let trained = chosen.par_iter().zip(groups.par_iter())
            .map(|(&(name, y), group)| {
                let kept = select(
                    &matrix.select(group),
                    y,
                    self.config.feature_selector.as_ref(),
                    loss,
                    self.config.share_selected_features,
                )?;
                let columns: Vec<usize> = kept.iter().map(|&k| group[k]).collect();
                let mut predictor = self.config.predictor.build(loss);
                predictor.fit(&matrix.select(&columns), y)?;
                debug!(target_name = name, columns = columns.len(), "trained predictor");
                Ok(TargetModel { name: name.to_string(), columns, predictor })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Fitted { features, names, targets: trained })
    }

    /// Feature values for every row of `population`.
    pub fn transform(&self, population: &Table, peripherals: &[&Table]) -> Result<FeatureMatrix> {
        let fitted = self.fitted()?;
        let tables = bind(&self.graph, population, peripherals)?;
        let matrix = run_in_pool(self.config.num_threads, || {
            let ctx = EvalContext::new(&self.graph, tables);
            let columns = fitted.features.par_iter()
                .map(|f| f.evaluate(&ctx))
                .collect::<Result<Vec<_>>>()?;
            FeatureMatrix::from_columns(population.n_rows(), fitted.names.iter().cloned().zip(columns).collect())
        })??;
        info!(rows = matrix.n_rows(), features = matrix.n_cols(), "transformed");
        Ok(matrix)
    }

    /// Predictions per target, in target order.
    pub fn predict(&self, population: &Table, peripherals: &[&Table]) -> Result<Vec<Vec<f64>>> {
        let fitted = self.fitted()?;
        let matrix = self.transform(population, peripherals)?;
        fitted.targets.iter().map(|t| t.predictor.predict(&matrix.select(&t.columns))).collect()
    }

    /// Metrics per target against the targets stored in `population`.
    pub fn score(&self, population: &Table, peripherals: &[&Table]) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
        let fitted = self.fitted()?;
        let predictions = self.predict(population, peripherals)?;
        let mut out = BTreeMap::new();
        for (t, yhat) in fitted.targets.iter().zip(&predictions) {
            let y = match population.column(&t.name) {
                Some(c) if c.role() == Role::Target => population.numeric(&t.name)?,
                _ => return Err(EngineError::Schema(format!(
                    "population table '{}' lacks target column '{}'", population.name(), t.name
                ))),
            };
            out.insert(t.name.clone(), metrics::evaluate(self.config.loss_function, y, yhat));
        }
        Ok(out)
    }

    /// Importance of each feature used by a target's predictor, by feature name.
    pub fn feature_importances(&self) -> Result<BTreeMap<String, Vec<(String, f64)>>> {
        let fitted = self.fitted()?;
        Ok(fitted.targets.iter().map(|t| {
            let importances = t.predictor.feature_importances();
            let named = t.columns.iter().zip(importances)
                .map(|(&c, v)| (fitted.names[c].clone(), v))
                .collect();
            (t.name.clone(), named)
        }).collect())
    }

    pub fn to_code(&self) -> Result<String> { crate::codegen::to_code(self) }

    pub fn to_sql(&self) -> Result<String> { self.to_code() }

    /// Tree view of the join graph and every feature.
    pub fn describe(&self) -> Result<String> {
        let fitted = self.fitted()?;
        Ok(crate::display::trace::format_model(&self.graph, &fitted.features, &fitted.names))
    }
}

//! The search driver: samples configurations, fits and scores one model per
//! trial and keeps the full history.

use super::sampler::{sample, Strategy};
use super::space::{Dimension, ParamSpace};
use crate::error::{EngineError, Result};
use crate::model::metrics::{self, default_objective};
use crate::model::pipeline::run_in_pool;
use crate::model::{Model, ModelConfig};
use crate::store::Table;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Idle,
    Sampling,
    Fitting,
    Scoring,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub n_iter: usize,
    pub strategy: Strategy,
    pub seed: u64,
    /// Metric to optimise, averaged over targets. Defaults by loss function.
    pub objective: Option<String>,
    /// Run trials concurrently on the search's worker pool.
    pub parallel_trials: bool,
    pub num_threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            strategy: Strategy::Random,
            seed: 5543,
            objective: None,
            parallel_trials: false,
            num_threads: 0,
        }
    }
}

pub type Scores = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TrialScore {
    pub scores: Scores,
    pub objective: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub index: usize,
    /// Sampled values by parameter-space key.
    pub params: BTreeMap<String, f64>,
    pub config: ModelConfig,
    /// `Err(TrialFailure)` if fitting or scoring failed.
    pub outcome: Result<TrialScore>,
}

impl Trial {
    pub fn is_success(&self) -> bool { self.outcome.is_ok() }

    pub fn objective(&self) -> Option<f64> {
        self.outcome.as_ref().ok().map(|s| s.objective).filter(|v| !v.is_nan())
    }
}

pub struct HyperparameterSearch {
    reference: Model,
    dims: Vec<Dimension>,
    config: SearchConfig,
    metric: String,
    maximize: bool,
    state: SearchState,
    trials: Vec<Trial>,
    best: Option<usize>,
}

fn maximizes(metric: &str) -> Option<bool> {
    match metric {
        "auc" | "accuracy" | "rsquared" => Some(true),
        "mae" | "rmse" | "cross_entropy" => Some(false),
        _ => None,
    }
}

impl HyperparameterSearch {
    /// Validates the space and reference model; nothing is fitted yet.
    pub fn new(reference: &Model, space: &ParamSpace, config: SearchConfig) -> Result<Self> {
        reference.config().validate()?;
        let dims = space.resolve(reference.config())?;
        if config.n_iter == 0 {
            return Err(EngineError::ParamSpace("n_iter must be positive".into()));
        }
        let (metric, maximize) = match &config.objective {
            Some(name) => {
                let maximize = maximizes(name).ok_or_else(|| EngineError::Config(format!("unknown objective '{}'", name)))?;
                (name.clone(), maximize)
            }
            None => {
                let (name, maximize) = default_objective(reference.config().loss_function);
                (name.to_string(), maximize)
            }
        };
        let loss = reference.config().loss_function;
        if !metrics::names(loss).contains(&metric.as_str()) {
            return Err(EngineError::Config(format!("objective '{}' is not reported for {:?}", metric, loss)));
        }

        Ok(Self {
            reference: Model::new(reference.graph().clone(), reference.config().clone()),
            dims,
            config,
            metric,
            maximize,
            state: SearchState::Idle,
            trials: Vec::new(),
            best: None,
        })
    }

    pub fn state(&self) -> SearchState { self.state }
    pub fn trials(&self) -> &[Trial] { &self.trials }
    pub fn metric(&self) -> &str { &self.metric }

    pub fn best_trial(&self) -> Option<&Trial> { self.best.map(|i| &self.trials[i]) }

    pub fn best_config(&self) -> Option<&ModelConfig> { self.best_trial().map(|t| &t.config) }

    fn transition(&mut self, next: SearchState) {
        debug!(from = ?self.state, to = ?next, "search state");
        self.state = next;
    }

    /// Runs all trials. Earlier history is discarded.
    pub fn run(&mut self, train: &Table, validation: &Table, peripherals: &[&Table]) -> Result<&[Trial]> {
        self.trials.clear();
        self.best = None;
        self.transition(SearchState::Idle);

        info!(
            n_iter = self.config.n_iter,
            strategy = ?self.config.strategy,
            parameters = self.dims.len(),
            objective = %self.metric,
            "starting hyperparameter search"
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.transition(SearchState::Sampling);
        let draws = sample(self.config.strategy, &self.dims, self.config.n_iter, &mut rng);

        if self.config.parallel_trials {
            self.transition(SearchState::Fitting);
            let this = &*self;
            let trials = run_in_pool(self.config.num_threads, || {
                draws.par_iter().enumerate()
                    .map(|(k, params)| {
                        let (config, named, fitted) = this.fit_trial(k, params, train, peripherals);
                        let outcome = fitted.and_then(|m| this.score_trial(&m, validation, peripherals));
                        this.finish(k, named, config, outcome)
                    })
                    .collect::<Vec<_>>()
            })?;
            self.transition(SearchState::Scoring);
            self.trials = trials;
        } else {
            for (k, params) in draws.iter().enumerate() {
                if k > 0 { self.transition(SearchState::Sampling); }
                self.transition(SearchState::Fitting);
                let (config, named, fitted) = run_in_pool(self.config.num_threads, || {
                    self.fit_trial(k, params, train, peripherals)
                })?;
                self.transition(SearchState::Scoring);
                let outcome = fitted.and_then(|m| self.score_trial(&m, validation, peripherals));
                let trial = self.finish(k, named, config, outcome);
                self.trials.push(trial);
            }
        }

        self.best = self.select_best();
        self.transition(SearchState::Done);
        match self.best_trial() {
            Some(best) => info!(trial = best.index, objective = ?best.objective(), "search finished"),
            None => warn!("search finished without a successful trial"),
        }
        Ok(&self.trials)
    }

    fn fit_trial(
        &self,
        k: usize,
        params: &[f64],
        train: &Table,
        peripherals: &[&Table],
    ) -> (ModelConfig, BTreeMap<String, f64>, Result<Model>) {
        let mut config = self.reference.config().clone();
        let named: BTreeMap<String, f64> = self.dims.iter().zip(params).map(|(d, &v)| (d.key.clone(), v)).collect();

        let fitted = (|| -> Result<Model> {
            for (dim, &value) in self.dims.iter().zip(params) {
                config.set_param(dim.target, &dim.name, value)?;
            }
            let mut model = Model::new(self.reference.graph().clone(), config.clone());
            model.fit(train, peripherals)?;
            debug!(trial = k, "trial fitted");
            Ok(model)
        })();
        (config, named, fitted)
    }

    fn score_trial(&self, model: &Model, validation: &Table, peripherals: &[&Table]) -> Result<TrialScore> {
        let scores = model.score(validation, peripherals)?;
        let values: Vec<f64> = scores.values().filter_map(|m| m.get(&self.metric).copied()).collect();
        if values.is_empty() {
            return Err(EngineError::Computation(format!("metric '{}' was not reported", self.metric)));
        }
        let objective = values.iter().sum::<f64>() / values.len() as f64;
        Ok(TrialScore { scores, objective })
    }

    fn finish(&self, k: usize, params: BTreeMap<String, f64>, config: ModelConfig, outcome: Result<TrialScore>) -> Trial {
        let outcome = outcome.map_err(|e| EngineError::TrialFailure { trial: k, reason: e.to_string() });
        match &outcome {
            Ok(score) => info!(trial = k, objective = score.objective, "trial finished"),
            Err(e) => warn!(trial = k, error = %e, "trial failed"),
        }
        Trial { index: k, params, config, outcome }
    }

    /// Best successful trial; ties go to the earlier trial.
    fn select_best(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for trial in &self.trials {
            let Some(v) = trial.objective() else { continue };
            let better = match best {
                None => true,
                Some((_, b)) => if self.maximize { v > b } else { v < b },
            };
            if better { best = Some((trial.index, v)); }
        }
        best.map(|(i, _)| i)
    }
}

/// Runs a complete search and returns the finished driver.
pub fn search(
    reference: &Model,
    space: &ParamSpace,
    config: SearchConfig,
    train: &Table,
    validation: &Table,
    peripherals: &[&Table],
) -> Result<HyperparameterSearch> {
    let mut driver = HyperparameterSearch::new(reference, space, config)?;
    driver.run(train, validation, peripherals)?;
    Ok(driver)
}

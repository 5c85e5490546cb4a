//! Breadth search over aggregation x source x condition combinations
//! ("Multirel"). Every admissible candidate is materialised over the training
//! population, scored against the targets, and the best are kept.

use super::condition::{comparable_columns, same_unit_pairs, Condition, ConditionGrid};
use super::feature::{AggregateFeature, Source};
use super::selection::{usefulness, Scored};
use crate::compute::{Aggregation, EvalContext, Matches};
use crate::error::{EngineError, Result};
use crate::graph::EdgeId;
use crate::predictors::{to_count, ParamKind};
use crate::store::Role;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultirelConfig {
    pub aggregations: Vec<Aggregation>,
    pub num_features: usize,
    /// Maximum number of edges a feature may traverse.
    pub max_length: usize,
    /// Subfeatures sampled per hop when `max_length > 1`.
    pub num_subfeatures: usize,
    /// Share of `aggregations` sampled per edge before crossing with sources.
    pub share_aggregations: f64,
    pub share_conditions: f64,
    pub grid_factor: f64,
    /// Minimum matched pairs a condition must retain in training.
    pub min_num_samples: usize,
    /// Minimum usefulness for a candidate to be kept.
    pub regularization: f64,
    pub delta_t: f64,
    pub allow_sets: bool,
}

impl Default for MultirelConfig {
    fn default() -> Self {
        Self {
            aggregations: Aggregation::ALL.to_vec(),
            num_features: 10,
            max_length: 1,
            num_subfeatures: 5,
            share_aggregations: 1.0,
            share_conditions: 1.0,
            grid_factor: 1.0,
            min_num_samples: 1,
            regularization: 0.0,
            delta_t: 0.0,
            allow_sets: true,
        }
    }
}

impl MultirelConfig {
    pub fn param_kind(name: &str) -> Option<ParamKind> {
        match name {
            "num_features" | "max_length" | "num_subfeatures" | "min_num_samples" => Some(ParamKind::Integer),
            "share_aggregations" | "share_conditions" | "grid_factor" | "regularization" | "delta_t" => Some(ParamKind::Float),
            _ => None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "num_features" => self.num_features = to_count(name, value)?,
            "max_length" => self.max_length = to_count(name, value)?,
            "num_subfeatures" => self.num_subfeatures = to_count(name, value)?,
            "min_num_samples" => self.min_num_samples = to_count(name, value)?,
            "share_aggregations" => self.share_aggregations = value,
            "share_conditions" => self.share_conditions = value,
            "grid_factor" => self.grid_factor = value,
            "regularization" => self.regularization = value,
            "delta_t" => self.delta_t = value,
            _ => return Err(EngineError::Config(format!("multirel has no parameter '{}'", name))),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let share = |v: f64| v > 0.0 && v <= 1.0;
        let problem = if self.aggregations.is_empty() {
            Some("at least one aggregation is required")
        } else if self.num_features == 0 {
            Some("num_features must be positive")
        } else if self.max_length == 0 {
            Some("max_length must be positive")
        } else if !share(self.share_aggregations) || !share(self.share_conditions) {
            Some("share_aggregations and share_conditions must be in (0, 1]")
        } else if !(self.grid_factor > 0.0 && self.grid_factor.is_finite()) {
            Some("grid_factor must be positive")
        } else if !(self.regularization >= 0.0) {
            Some("regularization must be non-negative")
        } else if !(self.delta_t >= 0.0 && self.delta_t.is_finite()) {
            Some("delta_t must be non-negative")
        } else {
            None
        };
        match problem {
            Some(msg) => Err(EngineError::Config(format!("multirel: {}", msg))),
            None => Ok(()),
        }
    }
}

/// Features kept by a learner, with their training values and usefulness.
#[derive(Debug, Clone, Default)]
pub struct LearnedFeatures {
    pub features: Vec<AggregateFeature>,
    pub values: Vec<Vec<f64>>,
    pub scores: Vec<f64>,
}

pub struct Multirel<'a, 'c> {
    config: &'a MultirelConfig,
    ctx: &'a EvalContext<'c>,
    grid: ConditionGrid,
}

impl<'a, 'c> Multirel<'a, 'c> {
    pub fn new(config: &'a MultirelConfig, ctx: &'a EvalContext<'c>) -> Self {
        let grid = ConditionGrid::from_factor(config.grid_factor, config.allow_sets, config.delta_t);
        Self { config, ctx, grid }
    }

    pub fn fit(&self, targets: &[&[f64]], rng: &mut StdRng) -> Result<LearnedFeatures> {
        let candidates = self.candidates(rng)?;
        info!(candidates = candidates.len(), "evaluating multirel candidates");

        let scored: Vec<(f64, u64)> = candidates.par_iter()
            .map(|f| {
                let values = f.evaluate(self.ctx)?;
                Ok((usefulness(&values, targets), fingerprint(&values)))
            })
            .collect::<Result<_>>()?;

        let mut ranked: Vec<Scored> = scored.iter().enumerate()
            .map(|(order, &(score, _))| Scored { index: order, score, depth: candidates[order].depth() })
            .collect();
        Scored::rank(&mut ranked);

        let mut seen = HashSet::new();
        let mut out = LearnedFeatures::default();
        for s in ranked {
            if out.features.len() >= self.config.num_features { break; }
            if s.score < self.config.regularization { break; }
            if !seen.insert(scored[s.index].1) { continue; }
            let feature = candidates[s.index].clone();
            out.values.push(feature.evaluate(self.ctx)?);
            out.scores.push(s.score);
            out.features.push(feature);
        }
        debug!(kept = out.features.len(), "multirel selection finished");
        Ok(out)
    }

    /// All candidates for edges leaving the population placeholder, in a
    /// deterministic order given the random state.
    pub fn candidates(&self, rng: &mut StdRng) -> Result<Vec<AggregateFeature>> {
        let graph = self.ctx.graph();
        let mut out = Vec::new();

        for edge in graph.outgoing(graph.population()) {
            let view = self.ctx.edge_view(edge)?;
            let matches = self.ctx.matches(edge)?;
            let pairs = pair_list(&matches);

            let aggregations = sample(self.config.aggregations.clone(), self.config.share_aggregations, rng);
            let combos = self.combinations(edge, &aggregations, 1, rng)?;

            let mut conditions = Vec::new();
            for c in self.grid.enumerate(&view, &pairs)? {
                let bound = c.bind(&view)?;
                let support = pairs.iter().filter(|&&(i, j)| bound.holds(i as usize, j as usize)).count();
                if support >= self.config.min_num_samples.max(1) {
                    conditions.push(c);
                }
            }
            let mut conditions: Vec<Option<Condition>> = sample(conditions, self.config.share_conditions, rng)
                .into_iter().map(Some).collect();
            conditions.insert(0, None);

            debug!(
                edge = edge.index(),
                combinations = combos.len(),
                conditions = conditions.len(),
                "enumerated candidates"
            );
            for (aggregation, source) in combos {
                for condition in &conditions {
                    let mut f = AggregateFeature::new(edge, aggregation, source.clone());
                    f.condition = condition.clone();
                    out.push(f);
                }
            }
        }
        Ok(out)
    }

    /// Every admissible `(aggregation, source)` pair for an edge, subfeature
    /// sources included.
    fn combinations(
        &self,
        edge: EdgeId,
        aggregations: &[Aggregation],
        depth: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<(Aggregation, Source)>> {
        let sources = self.sources(edge, aggregations, depth, rng)?;
        let mut out = Vec::new();
        for &aggregation in aggregations {
            for source in sources.iter().filter(|s| s.admits(aggregation)) {
                out.push((aggregation, source.clone()));
            }
        }
        Ok(out)
    }

    fn sources(&self, edge: EdgeId, aggregations: &[Aggregation], depth: usize, rng: &mut StdRng) -> Result<Vec<Source>> {
        let view = self.ctx.edge_view(edge)?;
        let mut out = vec![Source::Rows];
        out.extend(comparable_columns(&view, true).into_iter().map(|m| Source::Numerical(m.name.clone())));
        out.extend(view.to.columns_with_role(Role::Categorical).map(|c| Source::Categorical(c.name().to_string())));
        if view.edge.is_temporal() {
            out.push(Source::TimeDiff);
        }
        out.extend(same_unit_pairs(&view).into_iter().map(|(column, other)| Source::SameUnitDiff {
            column: column.name.clone(),
            other: other.name.clone(),
        }));

        if depth < self.config.max_length {
            for next in self.ctx.graph().outgoing(view.to_id) {
                let mut subs: Vec<AggregateFeature> = self.combinations(next, aggregations, depth + 1, rng)?
                    .into_iter()
                    .map(|(aggregation, source)| AggregateFeature::new(next, aggregation, source))
                    .collect();
                subs.shuffle(rng);
                subs.truncate(self.config.num_subfeatures);
                out.extend(subs.into_iter().map(|f| Source::Subfeature(Box::new(f))));
            }
        }
        Ok(out)
    }
}

/// Flat `(aggregating row, joined row)` list of all matches.
pub(crate) fn pair_list(matches: &Matches) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(matches.n_pairs());
    for i in 0..matches.len() {
        pairs.extend(matches.of(i).iter().map(|&j| (i as u32, j)));
    }
    pairs
}

/// Keeps each item with probability `share`, but never returns an empty
/// list for non-empty input.
fn sample<T>(items: Vec<T>, share: f64, rng: &mut StdRng) -> Vec<T> {
    if share >= 1.0 { return items; }
    let keep: Vec<bool> = items.iter().map(|_| rng.gen::<f64>() < share).collect();
    if !keep.iter().any(|&k| k) {
        return items.into_iter().take(1).collect();
    }
    items.into_iter().zip(keep).filter_map(|(x, k)| k.then_some(x)).collect()
}

fn fingerprint(values: &[f64]) -> u64 {
    let mut h = DefaultHasher::new();
    for v in values {
        // All missing values hash alike.
        let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
        bits.hash(&mut h);
    }
    h.finish()
}

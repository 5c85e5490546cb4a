//! Boosted feature growth ("Relboost").
//!
//! Each round fits one feature to the gradients of the current ensemble: a
//! weight tree over matched peripheral rows whose leaf weights are summed or
//! averaged per population row. Leaf weights come from a joint ridge solve of
//! the second-order loss approximation, so a feature's value directly
//! advances the prediction.
//!
//! Trees may sit at the end of a join path of up to `max_length` edges; the
//! weights of every row reached through the path are aggregated into the
//! population row the path started from.

use super::condition::{BoundCondition, Condition, ConditionGrid};
use super::multirel::pair_list;
use crate::compute::{Aggregation, EvalContext};
use crate::error::{EngineError, Result};
use crate::analysis::topology::JoinPath;
use crate::graph::{EdgeId, JoinGraph};
use crate::predictors::{solve_normal, to_count, LossFunction, ParamKind};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelboostConfig {
    pub num_features: usize,
    pub max_depth: usize,
    /// Maximum number of edges between the population and the weighted rows.
    pub max_length: usize,
    /// Minimum matched pairs on each side of a split.
    pub min_num_samples: usize,
    pub reg_lambda: f64,
    /// Minimum loss reduction for a split to be accepted.
    pub gamma: f64,
    pub shrinkage: f64,
    /// `sum` or `avg` of leaf weights over the matched rows.
    pub aggregation: Aggregation,
    pub grid_factor: f64,
    pub allow_sets: bool,
    pub delta_t: f64,
}

impl Default for RelboostConfig {
    fn default() -> Self {
        Self {
            num_features: 10,
            max_depth: 1,
            max_length: 2,
            min_num_samples: 1,
            reg_lambda: 0.0,
            gamma: 0.0,
            shrinkage: 0.1,
            aggregation: Aggregation::Avg,
            grid_factor: 1.0,
            allow_sets: true,
            delta_t: 0.0,
        }
    }
}

impl RelboostConfig {
    pub fn param_kind(name: &str) -> Option<ParamKind> {
        match name {
            "num_features" | "max_depth" | "max_length" | "min_num_samples" => Some(ParamKind::Integer),
            "reg_lambda" | "gamma" | "shrinkage" | "grid_factor" | "delta_t" => Some(ParamKind::Float),
            _ => None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "num_features" => self.num_features = to_count(name, value)?,
            "max_depth" => self.max_depth = to_count(name, value)?,
            "max_length" => self.max_length = to_count(name, value)?,
            "min_num_samples" => self.min_num_samples = to_count(name, value)?,
            "reg_lambda" => self.reg_lambda = value,
            "gamma" => self.gamma = value,
            "shrinkage" => self.shrinkage = value,
            "grid_factor" => self.grid_factor = value,
            "delta_t" => self.delta_t = value,
            _ => return Err(EngineError::Config(format!("relboost has no parameter '{}'", name))),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let problem = if self.num_features == 0 {
            Some("num_features must be positive")
        } else if self.max_length == 0 {
            Some("max_length must be positive")
        } else if !(self.shrinkage > 0.0 && self.shrinkage <= 1.0) {
            Some("shrinkage must be in (0, 1]")
        } else if !(self.reg_lambda >= 0.0) || !(self.gamma >= 0.0) {
            Some("reg_lambda and gamma must be non-negative")
        } else if !matches!(self.aggregation, Aggregation::Avg | Aggregation::Sum) {
            Some("aggregation must be avg or sum")
        } else if !(self.grid_factor > 0.0 && self.grid_factor.is_finite()) {
            Some("grid_factor must be positive")
        } else if !(self.delta_t >= 0.0 && self.delta_t.is_finite()) {
            Some("delta_t must be non-negative")
        } else {
            None
        };
        match problem {
            Some(msg) => Err(EngineError::Config(format!("relboost: {}", msg))),
            None => Ok(()),
        }
    }
}

/// Routes a matched pair to a leaf weight.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightTree {
    Leaf(f64),
    Split { condition: Condition, yes: Box<WeightTree>, no: Box<WeightTree> },
}

enum BoundTree<'a> {
    Leaf(f64),
    Split { condition: BoundCondition<'a>, yes: Box<BoundTree<'a>>, no: Box<BoundTree<'a>> },
}

impl WeightTree {
    fn bind<'a>(&'a self, view: &crate::compute::EdgeView<'a>) -> Result<BoundTree<'a>> {
        Ok(match self {
            WeightTree::Leaf(w) => BoundTree::Leaf(*w),
            WeightTree::Split { condition, yes, no } => BoundTree::Split {
                condition: condition.bind(view)?,
                yes: Box::new(yes.bind(view)?),
                no: Box::new(no.bind(view)?),
            },
        })
    }

    pub fn leaves(&self) -> usize {
        match self {
            WeightTree::Leaf(_) => 1,
            WeightTree::Split { yes, no, .. } => yes.leaves() + no.leaves(),
        }
    }
}

impl BoundTree<'_> {
    fn weight(&self, i: usize, j: usize) -> f64 {
        match self {
            BoundTree::Leaf(w) => *w,
            BoundTree::Split { condition, yes, no } => {
                if condition.holds(i, j) { yes.weight(i, j) } else { no.weight(i, j) }
            }
        }
    }
}

/// A grown feature: `aggregation` of leaf weights over the rows reached by
/// walking `edge` and then `hops`. The tree reads the last edge walked.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedFeature {
    pub edge: EdgeId,
    pub hops: JoinPath,
    pub aggregation: Aggregation,
    pub tree: WeightTree,
    /// Index of the target this feature was grown for.
    pub target: usize,
}

impl BoostedFeature {
    /// The edge whose `(from, to)` rows the weight tree is evaluated on.
    pub fn last_edge(&self) -> EdgeId {
        self.hops.last().copied().unwrap_or(self.edge)
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<f64>> {
        let n = ctx.edge_view(self.edge)?.from.n_rows();
        let view = ctx.edge_view(self.last_edge())?;
        let tree = self.tree.bind(&view)?;
        let walk = Walk::new(ctx, self.edge, &self.hops)?;

        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); n];
        for (&owner, &(i, j)) in walk.owners.iter().zip(&walk.pairs) {
            buckets[owner as usize].push(tree.weight(i as usize, j as usize));
        }
        Ok(buckets.into_iter().map(|mut b| self.aggregation.apply(&mut b)).collect())
    }

    pub fn describe(&self, graph: &JoinGraph) -> String {
        let alias = |edge: EdgeId| graph.endpoints(edge).map(|(_, to)| graph.alias(to)).unwrap_or("?");
        let mut over = alias(self.last_edge()).to_string();
        if !self.hops.is_empty() {
            let via: Vec<&str> = std::iter::once(self.edge).chain(self.hops.iter().copied())
                .take(self.hops.len())
                .map(alias)
                .collect();
            over = format!("{} via {}", over, via.join(" -> "));
        }
        format!("{}(weights over {}, {} leaves)", self.aggregation, over, self.tree.leaves())
    }
}

/// Rows reached by walking a join path: for every matched pair of the last
/// edge, the population row it aggregates into.
pub(crate) struct Walk {
    pub owners: Vec<u32>,
    pub pairs: Vec<(u32, u32)>,
}

impl Walk {
    pub fn new(ctx: &EvalContext<'_>, first: EdgeId, hops: &[EdgeId]) -> Result<Self> {
        let graph = ctx.graph();
        let pairs = pair_list(&*ctx.matches(first)?);
        let mut walk = Walk { owners: pairs.iter().map(|&(i, _)| i).collect(), pairs };
        let mut at = graph.endpoints(first)?.1;
        for &edge in hops {
            let (from, to) = graph.endpoints(edge)?;
            if from != at {
                return Err(EngineError::Computation("boosted feature path is not connected".into()));
            }
            let matches = ctx.matches(edge)?;
            let mut next = Walk { owners: Vec::new(), pairs: Vec::new() };
            for (&owner, &(_, a)) in walk.owners.iter().zip(&walk.pairs) {
                for &b in matches.of(a as usize) {
                    next.owners.push(owner);
                    next.pairs.push((a, b));
                }
            }
            walk = next;
            at = to;
        }
        Ok(walk)
    }

    /// Pairs per population row.
    fn counts(&self, n: usize) -> Vec<usize> {
        let mut counts = vec![0; n];
        for &o in &self.owners {
            counts[o as usize] += 1;
        }
        counts
    }
}

/// Loss reduction and leaf weights of the ridge system built from leaf
/// membership columns `a` (one value per population row and leaf).
fn solve_leaves(a: &[Vec<f64>], grad: &[f64], hess: &[f64], lambda: f64) -> (f64, Vec<f64>) {
    let k = a.len();
    let g = DVector::from_iterator(k, a.iter().map(|col| col.iter().zip(grad).map(|(x, gi)| x * gi).sum::<f64>()));
    let mut gram = DMatrix::<f64>::zeros(k, k);
    for l in 0..k {
        for m in l..k {
            let v: f64 = a[l].iter().zip(&a[m]).zip(hess).map(|((x, y), hi)| x * y * hi).sum();
            gram[(l, m)] = v;
            gram[(m, l)] = v;
        }
        gram[(l, l)] += lambda;
    }
    let w = solve_normal(gram, -&g);
    let reduction = -0.5 * g.dot(&w);
    (reduction, w.iter().copied().collect())
}

enum ArenaNode {
    Leaf(usize),
    Split { condition: Condition, yes: usize, no: usize },
}

struct Grown {
    gain: f64,
    tree: WeightTree,
}

pub struct Relboost<'a, 'c> {
    config: &'a RelboostConfig,
    ctx: &'a EvalContext<'c>,
    loss: LossFunction,
    grid: ConditionGrid,
}

impl<'a, 'c> Relboost<'a, 'c> {
    pub fn new(config: &'a RelboostConfig, ctx: &'a EvalContext<'c>, loss: LossFunction) -> Self {
        let grid = ConditionGrid::from_factor(config.grid_factor, config.allow_sets, config.delta_t);
        Self { config, ctx, loss, grid }
    }

    /// One independent ensemble per target, with training values.
    pub fn fit(&self, targets: &[&[f64]]) -> Result<Vec<Vec<(BoostedFeature, Vec<f64>)>>> {
        targets.par_iter().enumerate().map(|(t, y)| self.fit_target(t, y)).collect()
    }

    fn fit_target(&self, target: usize, y: &[f64]) -> Result<Vec<(BoostedFeature, Vec<f64>)>> {
        let paths = self.ctx.graph().paths(self.config.max_length)?;
        let mut raw = vec![self.loss.initial(y); y.len()];
        let mut out = Vec::new();

        for round in 0..self.config.num_features {
            let grad: Vec<f64> = y.iter().zip(&raw).map(|(&yi, &ri)| self.loss.gradient(yi, ri)).collect();
            let hess: Vec<f64> = raw.iter().map(|&ri| self.loss.hessian(ri)).collect();

            let mut best: Option<(&JoinPath, Grown)> = None;
            for path in &paths {
                if let Some(grown) = self.grow(path, &grad, &hess)? {
                    if best.as_ref().map_or(true, |(_, b)| grown.gain > b.gain) {
                        best = Some((path, grown));
                    }
                }
            }
            let Some((path, grown)) = best.filter(|(_, g)| g.gain > 0.0) else {
                debug!(target_index = target, round, "no join path improves the loss; stopping");
                break;
            };
            let Some((&edge, hops)) = path.split_first() else { break };
            debug!(target_index = target, round, edge = edge.index(), hops = hops.len(), gain = grown.gain, "grew feature");

            let feature = BoostedFeature {
                edge,
                hops: JoinPath::from_slice(hops),
                aggregation: self.config.aggregation,
                tree: grown.tree,
                target,
            };
            let values = feature.evaluate(self.ctx)?;
            for (r, v) in raw.iter_mut().zip(&values) {
                if v.is_finite() { *r += self.config.shrinkage * v; }
            }
            out.push((feature, values));
        }
        info!(target_index = target, features = out.len(), "relboost ensemble grown");
        Ok(out)
    }

    fn grow(&self, path: &[EdgeId], grad: &[f64], hess: &[f64]) -> Result<Option<Grown>> {
        let Some((&first, hops)) = path.split_first() else { return Ok(None) };
        let view = self.ctx.edge_view(hops.last().copied().unwrap_or(first))?;
        let walk = Walk::new(self.ctx, first, hops)?;
        let pairs = &walk.pairs;
        let min = self.config.min_num_samples.max(1);
        if pairs.len() < min { return Ok(None); }

        let n = grad.len();
        let counts = walk.counts(n);
        let scale: Vec<f64> = counts.iter().map(|&m| match self.config.aggregation {
            Aggregation::Sum => 1.0,
            _ => if m == 0 { 0.0 } else { 1.0 / m as f64 },
        }).collect();
        let membership = |members: &[u32]| -> Vec<f64> {
            let mut a = vec![0.0; n];
            for &p in members {
                let i = walk.owners[p as usize] as usize;
                a[i] += scale[i];
            }
            a
        };
        let mut leaves: Vec<Vec<u32>> = vec![(0..pairs.len() as u32).collect()];
        let mut leaf_node = vec![0usize];
        let mut arena = vec![ArenaNode::Leaf(0)];
        let mut a = vec![membership(&leaves[0])];
        let (mut current, mut weights) = solve_leaves(&a, grad, hess, self.config.reg_lambda);

        for _level in 0..self.config.max_depth {
            for l in 0..leaves.len() {
                if leaves[l].len() < 2 * min { continue; }
                let leaf_pairs: Vec<(u32, u32)> = leaves[l].iter().map(|&p| pairs[p as usize]).collect();
                let conditions = self.grid.enumerate(&view, &leaf_pairs)?;

                let evaluated: Vec<Option<(f64, Vec<u32>, Vec<u32>)>> = conditions.par_iter().map(|c| {
                    let bound = c.bind(&view)?;
                    let (yes, no): (Vec<u32>, Vec<u32>) = leaves[l].iter()
                        .partition(|&&p| {
                            let (i, j) = pairs[p as usize];
                            bound.holds(i as usize, j as usize)
                        });
                    if yes.len() < min || no.len() < min { return Ok(None); }
                    let mut trial = a.clone();
                    trial[l] = membership(&no);
                    trial.push(membership(&yes));
                    let (reduction, _) = solve_leaves(&trial, grad, hess, self.config.reg_lambda);
                    Ok(Some((reduction - current, yes, no)))
                }).collect::<Result<_>>()?;

                let mut best: Option<(usize, f64)> = None;
                for (idx, e) in evaluated.iter().enumerate() {
                    if let Some((gain, _, _)) = e {
                        if best.map_or(true, |(_, g)| *gain > g) { best = Some((idx, *gain)); }
                    }
                }
                let Some((idx, gain)) = best.filter(|&(_, g)| g > self.config.gamma) else { continue };
                let Some((_, yes, no)) = evaluated.into_iter().nth(idx).flatten() else { continue };

                a[l] = membership(&no);
                a.push(membership(&yes));
                leaves[l] = no;
                leaves.push(yes);

                let yes_node = arena.len();
                arena.push(ArenaNode::Leaf(leaves.len() - 1));
                let no_node = arena.len();
                arena.push(ArenaNode::Leaf(l));
                arena[leaf_node[l]] = ArenaNode::Split { condition: conditions[idx].clone(), yes: yes_node, no: no_node };
                leaf_node[l] = no_node;
                leaf_node.push(yes_node);

                debug!(leaf = l, gain, "split leaf");
                (current, weights) = solve_leaves(&a, grad, hess, self.config.reg_lambda);
            }
        }

        let tree = build_tree(&mut arena, 0, &weights);
        Ok(Some(Grown { gain: current, tree }))
    }
}

fn build_tree(arena: &mut Vec<ArenaNode>, idx: usize, weights: &[f64]) -> WeightTree {
    match std::mem::replace(&mut arena[idx], ArenaNode::Leaf(usize::MAX)) {
        ArenaNode::Leaf(l) => WeightTree::Leaf(weights.get(l).copied().unwrap_or(0.0)),
        ArenaNode::Split { condition, yes, no } => WeightTree::Split {
            condition,
            yes: Box::new(build_tree(arena, yes, weights)),
            no: Box::new(build_tree(arena, no, weights)),
        },
    }
}

//! Draws parameter vectors from a resolved space.

use super::space::Dimension;
use crate::predictors::ParamKind;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Random,
    /// Each range is cut into `n_iter` equal strata and every stratum is
    /// sampled exactly once; strata are permuted independently per parameter.
    LatinHypercube,
}

/// `n_iter` parameter vectors, one value per dimension in dimension order.
pub fn sample(strategy: Strategy, dims: &[Dimension], n_iter: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut out = vec![Vec::with_capacity(dims.len()); n_iter];
    if n_iter == 0 { return out; }

    for dim in dims {
        let strata: Vec<usize> = match strategy {
            Strategy::Random => Vec::new(),
            Strategy::LatinHypercube => {
                let mut s: Vec<usize> = (0..n_iter).collect();
                s.shuffle(rng);
                s
            }
        };
        for (k, params) in out.iter_mut().enumerate() {
            let u: f64 = rng.gen();
            let u = match strategy {
                Strategy::Random => u,
                Strategy::LatinHypercube => (strata[k] as f64 + u) / n_iter as f64,
            };
            params.push(scale(dim, u));
        }
    }
    out
}

/// Maps `u` in `[0, 1)` onto a dimension. Integers cover `[low, high + 1)` and are floored.
fn scale(dim: &Dimension, u: f64) -> f64 {
    match dim.kind {
        ParamKind::Float => (dim.low + u * (dim.high - dim.low)).min(dim.high),
        ParamKind::Integer => (dim.low + u * (dim.high + 1.0 - dim.low)).floor().min(dim.high),
    }
}

//! Feature learners. Both produce features that aggregate onto the population
//! placeholder over join paths starting there; they differ in how candidates
//! are found.
pub mod condition;
pub mod feature;
pub mod multirel;
pub mod relboost;
pub mod selection;

pub use condition::{Condition, ConditionGrid};
pub use feature::{AggregateFeature, Source};
pub use multirel::{LearnedFeatures, Multirel, MultirelConfig};
pub use relboost::{BoostedFeature, Relboost, RelboostConfig, WeightTree};

use crate::compute::EvalContext;
use crate::error::Result;
use crate::graph::{EdgeId, JoinGraph};

/// A learned feature of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Aggregate(AggregateFeature),
    Boosted(BoostedFeature),
}

impl Feature {
    /// One value per population row.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<f64>> {
        match self {
            Feature::Aggregate(f) => f.evaluate(ctx),
            Feature::Boosted(f) => f.evaluate(ctx),
        }
    }

    pub fn describe(&self, graph: &JoinGraph) -> String {
        match self {
            Feature::Aggregate(f) => f.describe(graph),
            Feature::Boosted(f) => f.describe(graph),
        }
    }

    pub fn edge(&self) -> EdgeId {
        match self {
            Feature::Aggregate(f) => f.edge,
            Feature::Boosted(f) => f.edge,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Feature::Aggregate(f) => f.depth(),
            Feature::Boosted(_) => 1,
        }
    }
}

impl From<AggregateFeature> for Feature {
    fn from(f: AggregateFeature) -> Self { Feature::Aggregate(f) }
}

impl From<BoostedFeature> for Feature {
    fn from(f: BoostedFeature) -> Self { Feature::Boosted(f) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{bind, validation::targets};
    use crate::compute::{kernel, Aggregation};
    use crate::predictors::LossFunction;
    use crate::testing::{sales, three_rows};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn first_edge(graph: &JoinGraph) -> EdgeId {
        graph.outgoing(graph.population())[0]
    }

    #[test]
    fn test_count_ignores_future_rows() {
        let fx = three_rows();
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let count = AggregateFeature::new(first_edge(&fx.graph), Aggregation::Count, Source::Rows);
        assert_eq!(count.evaluate(&ctx).unwrap(), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rows_without_matches_get_empty_values() {
        let fx = three_rows();
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let edge = first_edge(&fx.graph);
        let sum = AggregateFeature::new(edge, Aggregation::Sum, Source::Numerical("x".into()));
        assert_eq!(sum.evaluate(&ctx).unwrap(), vec![2.0, 4.0, 0.0]);
        let avg = AggregateFeature::new(edge, Aggregation::Avg, Source::Numerical("x".into()));
        let values = avg.evaluate(&ctx).unwrap();
        assert_eq!(&values[..2], &[2.0, 4.0]);
        assert!(values[2].is_nan());
    }

    #[test]
    fn test_condition_filters_matches() {
        let fx = three_rows();
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let f = AggregateFeature::new(first_edge(&fx.graph), Aggregation::Count, Source::Rows)
            .with_condition(Condition::Threshold { column: "x".into(), greater: true, threshold: 3.0 });
        assert_eq!(f.evaluate(&ctx).unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_multirel_is_deterministic_and_finds_count() {
        let fx = sales(20);
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let y = targets(&fx.population);
        let ys: Vec<&[f64]> = y.iter().map(|(_, v)| *v).collect();
        let config = MultirelConfig { num_features: 3, share_conditions: 0.5, ..Default::default() };

        let a = Multirel::new(&config, &ctx).fit(&ys, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Multirel::new(&config, &ctx).fit(&ys, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.features.len(), 3);
        // The target is exactly the number of past transactions.
        assert!((a.scores[0] - 1.0).abs() < 1e-9);
        assert!(a.scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_share_aggregations_keeps_whole_aggregations() {
        let fx = sales(20);
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let aggregations = vec![Aggregation::Avg, Aggregation::Max, Aggregation::Min, Aggregation::Sum, Aggregation::Var];
        let full = MultirelConfig { aggregations: aggregations.clone(), ..Default::default() };
        let half = MultirelConfig { share_aggregations: 0.5, ..full.clone() };

        let all = Multirel::new(&full, &ctx).candidates(&mut StdRng::seed_from_u64(3)).unwrap();
        let some = Multirel::new(&half, &ctx).candidates(&mut StdRng::seed_from_u64(3)).unwrap();
        let sources = |fs: &[AggregateFeature], a: Aggregation| -> Vec<Source> {
            fs.iter().filter(|f| f.aggregation == a && f.condition.is_none()).map(|f| f.source.clone()).collect()
        };
        let kept: Vec<Aggregation> = aggregations.iter().copied()
            .filter(|&a| some.iter().any(|f| f.aggregation == a))
            .collect();
        assert!(!kept.is_empty());
        for a in kept {
            // A sampled aggregation is crossed with every source.
            assert_eq!(sources(&some, a), sources(&all, a), "{}", a);
        }
    }

    #[test]
    fn test_relboost_sum_recovers_count() {
        let fx = sales(20);
        let ctx = EvalContext::new(&fx.graph, bind(&fx.graph, &fx.population, &[&fx.peripheral]).unwrap());
        let y = targets(&fx.population);
        let ys: Vec<&[f64]> = y.iter().map(|(_, v)| *v).collect();
        let config = RelboostConfig { num_features: 2, max_depth: 0, aggregation: Aggregation::Sum, ..Default::default() };

        let grown = Relboost::new(&config, &ctx, LossFunction::SquareLoss).fit(&ys).unwrap();
        assert_eq!(grown.len(), 1);
        let (feature, values) = &grown[0][0];
        assert_eq!(feature.target, 0);
        assert_eq!(&Feature::from(feature.clone()).evaluate(&ctx).unwrap(), values);
        assert!(kernel::correlation(values, ys[0]).abs() > 0.99);
    }
}

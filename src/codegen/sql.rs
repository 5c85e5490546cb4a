//! Renders learned features as portable SQL.
//!
//! Every feature becomes a correlated scalar subquery over the staged tables.
//! The population table is aliased `t1`, each hop deeper gets the next
//! number; extra bindings of the same rows, used by medians and variances,
//! add a letter suffix. Rows are keyed by the population's `rownum` column, which the
//! consumer stages as the 0-based row index.

use crate::compute::Aggregation;
use crate::error::{EngineError, Result};
use crate::features::{AggregateFeature, BoostedFeature, Condition, Feature, Source, WeightTree};
use crate::graph::{EdgeId, JoinGraph};
use std::fmt::Write;

pub const ROWNUM: &str = "rownum";
pub const FEATURE_TABLE: &str = "FEATURES";

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn number(v: f64) -> Result<String> {
    if !v.is_finite() {
        return Err(EngineError::Computation(format!("cannot render non-finite constant {} as SQL", v)));
    }
    Ok(format!("{:?}", v))
}

/// Outer (aggregating) and inner (joined) aliases at one nesting level.
/// Tags tell apart several bindings of the same join inside one expression.
#[derive(Clone, Copy)]
struct Scope {
    level: usize,
    outer_tag: &'static str,
    inner_tag: &'static str,
}

impl Scope {
    const TOP: Scope = Scope { level: 1, outer_tag: "", inner_tag: "" };

    fn outer(self) -> String { format!("t{}{}", self.level, self.outer_tag) }
    fn inner(self) -> String { format!("t{}{}", self.level + 1, self.inner_tag) }
    fn deeper(self) -> Scope { Scope { level: self.level + 1, outer_tag: self.inner_tag, inner_tag: "" } }
    fn rebound(self, inner_tag: &'static str) -> Scope { Scope { inner_tag, ..self } }
}

struct Renderer<'a> {
    graph: &'a JoinGraph,
}

impl Renderer<'_> {
    fn col(alias: &str, column: &str) -> String {
        format!("{}.{}", alias, quote(column))
    }

    /// Joined table with its alias, and the predicates matching it to the outer row.
    fn join(&self, edge: EdgeId, scope: Scope) -> Result<(String, Vec<String>)> {
        let (_, to) = self.graph.endpoints(edge)?;
        let e = self.graph.edge(edge);
        let (o, i) = (scope.outer(), scope.inner());

        let mut predicates = vec![format!(
            "{} = {}", Self::col(&i, &e.other_join_key), Self::col(&o, &e.join_key)
        )];
        if let (Some(ts), Some(other)) = (&e.time_stamp, &e.other_time_stamp) {
            let (ts, other) = (Self::col(&o, ts), Self::col(&i, other));
            if e.horizon > 0.0 {
                predicates.push(format!("{} <= {} - {}", other, ts, number(e.horizon)?));
            } else {
                predicates.push(format!("{} <= {}", other, ts));
            }
            if let Some(window) = e.max_window {
                predicates.push(format!("{} >= {} - {}", other, ts, number(e.horizon + window)?));
            }
            if let Some(upper) = &e.upper_time_stamp {
                let upper = Self::col(&i, upper);
                predicates.push(format!("({} > {} OR {} IS NULL)", upper, ts, upper));
            }
        }
        Ok((format!("{} {}", quote(&self.graph.schema(to).name), i), predicates))
    }

    /// `FROM ... WHERE ...` of the rows matched along `edge`, plus extra predicates.
    fn matched_rows(&self, edge: EdgeId, scope: Scope, extra: &[String]) -> Result<String> {
        let (table, mut predicates) = self.join(edge, scope)?;
        predicates.extend(extra.iter().cloned());
        Ok(format!("FROM {} WHERE {}", table, predicates.join(" AND ")))
    }

    fn time_diff(&self, edge: EdgeId, scope: Scope) -> Result<String> {
        let e = self.graph.edge(edge);
        match (&e.time_stamp, &e.other_time_stamp) {
            (Some(ts), Some(other)) => Ok(format!(
                "({} - {})", Self::col(&scope.outer(), ts), Self::col(&scope.inner(), other)
            )),
            _ => Err(EngineError::Schema("time-based expression on a join without time stamps".into())),
        }
    }

    fn condition(&self, condition: &Condition, edge: EdgeId, scope: Scope) -> Result<String> {
        let (o, i) = (scope.outer(), scope.inner());
        let cmp = |greater: bool| if greater { ">" } else { "<=" };
        Ok(match condition {
            Condition::Equals { column, category } => format!("{} = {}", Self::col(&i, column), literal(category)),
            Condition::Threshold { column, greater, threshold } => {
                format!("{} {} {}", Self::col(&i, column), cmp(*greater), number(*threshold)?)
            }
            Condition::SameUnit { column, other, greater, threshold } => format!(
                "({} - {}) {} {}", Self::col(&i, column), Self::col(&o, other), cmp(*greater), number(*threshold)?
            ),
            Condition::Lag { max_age } => format!("{} <= {}", self.time_diff(edge, scope)?, number(*max_age)?),
        })
    }

    fn value(&self, feature: &AggregateFeature, scope: Scope) -> Result<String> {
        let i = scope.inner();
        Ok(match &feature.source {
            Source::Rows => "*".to_string(),
            Source::Numerical(c) | Source::Categorical(c) => Self::col(&i, c),
            Source::TimeDiff => self.time_diff(feature.edge, scope)?,
            Source::SameUnitDiff { column, other } => {
                format!("({} - {})", Self::col(&i, column), Self::col(&scope.outer(), other))
            }
            Source::Subfeature(sub) => {
                if self.graph.endpoints(sub.edge)?.0 != self.graph.endpoints(feature.edge)?.1 {
                    return Err(EngineError::Computation("subfeature does not continue the join path".into()));
                }
                self.aggregate(sub, scope.deeper())?
            }
        })
    }

    fn filters(&self, feature: &AggregateFeature, scope: Scope) -> Result<Vec<String>> {
        match &feature.condition {
            Some(c) => Ok(vec![self.condition(c, feature.edge, scope)?]),
            None => Ok(Vec::new()),
        }
    }

    /// Mean of the non-missing values, as a subquery over a second binding
    /// of the matched rows.
    fn mean(&self, feature: &AggregateFeature, scope: Scope) -> Result<String> {
        let y = scope.rebound("y");
        Ok(format!(
            "(SELECT AVG({}) {})",
            self.value(feature, y)?,
            self.matched_rows(feature.edge, y, &self.filters(feature, y)?)?
        ))
    }

    /// Median without ORDER BY/LIMIT: a value qualifies when at most half the
    /// values lie below it and at least half lie at or below it. Averaging the
    /// distinct qualifying values yields the middle pair's mean for even counts.
    fn median(&self, feature: &AggregateFeature, scope: Scope) -> Result<String> {
        let (x, y) = (scope.rebound("x"), scope.rebound("y"));
        let (vx, vy) = (self.value(feature, x)?, self.value(feature, y)?);
        let count = |bound: Option<String>| -> Result<String> {
            let mut predicates = self.filters(feature, y)?;
            predicates.push(format!("{} IS NOT NULL", vy));
            predicates.extend(bound);
            Ok(format!("(SELECT COUNT(*) {})", self.matched_rows(feature.edge, y, &predicates)?))
        };
        let n = count(None)?;
        let below = count(Some(format!("{} < {}", vy, vx)))?;
        let at_or_below = count(Some(format!("{} <= {}", vy, vx)))?;

        let mut predicates = self.filters(feature, x)?;
        predicates.push(format!("{} IS NOT NULL", vx));
        predicates.push(format!("{} * 2 <= {}", below, n));
        predicates.push(format!("{} * 2 >= {}", at_or_below, n));
        Ok(format!("(SELECT AVG(DISTINCT {}) {})", vx, self.matched_rows(feature.edge, x, &predicates)?))
    }

    fn aggregate(&self, feature: &AggregateFeature, scope: Scope) -> Result<String> {
        let rows = self.matched_rows(feature.edge, scope, &self.filters(feature, scope)?)?;
        let v = self.value(feature, scope)?;

        let expr = match feature.aggregation {
            Aggregation::Count => "COUNT(*)".to_string(),
            Aggregation::Sum => format!("COALESCE(SUM({}), 0)", v),
            Aggregation::Avg => format!("AVG({})", v),
            Aggregation::Min => format!("MIN({})", v),
            Aggregation::Max => format!("MAX({})", v),
            Aggregation::Var => format!("AVG(({v} - {m}) * ({v} - {m}))", v = v, m = self.mean(feature, scope)?),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {})", v),
            Aggregation::CountMinusCountDistinct => format!("COUNT({v}) - COUNT(DISTINCT {v})", v = v),
            Aggregation::Median => return self.median(feature, scope),
        };
        Ok(format!("(SELECT {} {})", expr, rows))
    }

    fn weights(&self, tree: &WeightTree, edge: EdgeId, scope: Scope) -> Result<String> {
        Ok(match tree {
            WeightTree::Leaf(w) => number(*w)?,
            WeightTree::Split { condition, yes, no } => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.condition(condition, edge, scope)?,
                self.weights(yes, edge, scope)?,
                self.weights(no, edge, scope)?
            ),
        })
    }

    /// Boosted features walk their whole path in one flat join, one alias per hop.
    fn boosted(&self, feature: &BoostedFeature, scope: Scope) -> Result<String> {
        let (table, mut predicates) = self.join(feature.edge, scope)?;
        let mut tables = vec![table];
        let (mut at, mut last) = (self.graph.endpoints(feature.edge)?.1, scope);
        for &edge in &feature.hops {
            let (from, to) = self.graph.endpoints(edge)?;
            if from != at {
                return Err(EngineError::Computation("boosted feature path is not connected".into()));
            }
            last = last.deeper();
            let (table, more) = self.join(edge, last)?;
            tables.push(table);
            predicates.extend(more);
            at = to;
        }

        let w = self.weights(&feature.tree, feature.last_edge(), last)?;
        let expr = match feature.aggregation {
            Aggregation::Sum => format!("COALESCE(SUM({}), 0)", w),
            Aggregation::Avg => format!("AVG({})", w),
            other => return Err(EngineError::Computation(format!("boosted features cannot use {}", other))),
        };
        Ok(format!("(SELECT {} FROM {} WHERE {})", expr, tables.join(", "), predicates.join(" AND ")))
    }
}

/// One script that (re)creates the `FEATURES` table: the population's
/// `rownum` followed by one column per feature.
pub fn to_sql(graph: &JoinGraph, features: &[Feature], names: &[String]) -> Result<String> {
    if features.len() != names.len() {
        return Err(EngineError::Computation("feature and name counts differ".into()));
    }
    let renderer = Renderer { graph };
    let top = Scope::TOP;
    let population = graph.population();

    let mut out = String::new();
    for (feature, name) in features.iter().zip(names) {
        let _ = writeln!(out, "-- {}: {}", name, feature.describe(graph));
    }
    let _ = writeln!(out, "DROP TABLE IF EXISTS {};", quote(FEATURE_TABLE));
    let _ = writeln!(out);
    let _ = writeln!(out, "CREATE TABLE {} AS", quote(FEATURE_TABLE));
    let _ = write!(out, "SELECT {} AS {}", Renderer::col(&top.outer(), ROWNUM), quote(ROWNUM));

    for (feature, name) in features.iter().zip(names) {
        if graph.endpoints(feature.edge())?.0 != population {
            return Err(EngineError::Computation(format!("feature '{}' does not start at the population", name)));
        }
        let expr = match feature {
            Feature::Aggregate(f) => renderer.aggregate(f, top)?,
            Feature::Boosted(f) => renderer.boosted(f, top)?,
        };
        let _ = write!(out, ",\n       {} AS {}", expr, quote(name));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "FROM {} {}", quote(&graph.schema(population).name), top.outer());
    let _ = writeln!(out, "ORDER BY {};", Renderer::col(&top.outer(), ROWNUM));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::three_rows;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(literal("it's"), "'it''s'");
    }

    #[test]
    fn test_count_feature_renders_leakage_predicate() {
        let fx = three_rows();
        let edge = fx.graph.outgoing(fx.graph.population())[0];
        let feature = Feature::from(AggregateFeature::new(edge, Aggregation::Count, Source::Rows));
        let sql = to_sql(&fx.graph, &[feature], &["feature_1".to_string()]).unwrap();
        assert!(sql.contains(
            r#"(SELECT COUNT(*) FROM "PERIPHERAL" t2 WHERE t2."jk" = t1."jk" AND t2."ts" <= t1."ts") AS "feature_1""#
        ));
        assert!(sql.contains(r#"FROM "POPULATION" t1"#));
    }

    #[test]
    fn test_median_and_var_render_without_limit() {
        let fx = three_rows();
        let edge = fx.graph.outgoing(fx.graph.population())[0];
        let features: Vec<Feature> = [Aggregation::Median, Aggregation::Var].into_iter()
            .map(|a| Feature::from(AggregateFeature::new(edge, a, Source::Numerical("x".into()))))
            .collect();
        let names = vec!["feature_1".to_string(), "feature_2".to_string()];
        let sql = to_sql(&fx.graph, &features, &names).unwrap();
        assert!(!sql.contains("LIMIT") && !sql.contains("OFFSET"));
        assert!(sql.contains(r#"(SELECT AVG(DISTINCT t2x."x") FROM "PERIPHERAL" t2x WHERE t2x."jk" = t1."jk""#));
        assert!(sql.contains(r#"AVG((t2."x" - (SELECT AVG(t2y."x") FROM "PERIPHERAL" t2y"#));
    }

    #[test]
    fn test_boosted_feature_renders_case_tree() {
        let fx = three_rows();
        let edge = fx.graph.outgoing(fx.graph.population())[0];
        let feature = Feature::from(BoostedFeature {
            edge,
            hops: Default::default(),
            aggregation: Aggregation::Sum,
            tree: WeightTree::Split {
                condition: Condition::Threshold { column: "x".into(), greater: true, threshold: 3.0 },
                yes: Box::new(WeightTree::Leaf(0.5)),
                no: Box::new(WeightTree::Leaf(-0.25)),
            },
            target: 0,
        });
        let sql = to_sql(&fx.graph, &[feature], &["feature_1_1".to_string()]).unwrap();
        assert!(sql.contains(r#"COALESCE(SUM(CASE WHEN t2."x" > 3.0 THEN 0.5 ELSE -0.25 END), 0)"#));
    }
}

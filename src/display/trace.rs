use crate::features::{Feature, WeightTree};
use crate::graph::{EdgeId, JoinGraph, PlaceholderId};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the join graph as a tree rooted at the population placeholder,
/// listing every learned feature under the edge it aggregates over.
pub fn format_model(graph: &JoinGraph, features: &[Feature], names: &[String]) -> String {
    let mut tracer = Tracer {
        graph,
        features,
        names,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    let population = graph.population();
    let _ = writeln!(tracer.output, "FEATURE TRACE for population '{}':", graph.alias(population));
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_placeholder(population, 1, "");
    tracer.output
}

struct Tracer<'a> {
    graph: &'a JoinGraph,
    features: &'a [Feature],
    names: &'a [String],
    visited_at_level: HashMap<PlaceholderId, usize>,
    output: String,
}

enum Item {
    Feature(usize),
    Placeholder(PlaceholderId),
}

impl<'a> Tracer<'a> {
    fn trace_placeholder(&mut self, id: PlaceholderId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(id, level);
        let _ = writeln!(self.output, "{}[L{}] {}", prefix, level, self.graph.alias(id));

        let stem = build_child_stem(prefix);
        let edges = self.graph.outgoing(id);
        for (i, &edge) in edges.iter().enumerate() {
            let connector = if i == edges.len() - 1 { "`-- " } else { "|-- " };
            self.trace_edge(edge, level, &format!("{}{}", stem, connector));
        }
    }

    fn trace_edge(&mut self, edge: EdgeId, level: usize, prefix: &str) {
        let Ok((_, to)) = self.graph.endpoints(edge) else { return };
        let _ = writeln!(self.output, "{}JOIN {}", prefix, self.join_rule(edge));

        let mut items: Vec<Item> = (0..self.features.len())
            .filter(|&k| self.features[k].edge() == edge)
            .map(Item::Feature)
            .collect();
        items.push(Item::Placeholder(to));

        let stem = build_child_stem(prefix);
        for (i, item) in items.iter().enumerate() {
            let connector = if i == items.len() - 1 { "`-- " } else { "|-- " };
            let full_prefix = format!("{}{}", stem, connector);
            match *item {
                Item::Feature(k) => self.trace_feature(k, &full_prefix),
                Item::Placeholder(p) => self.trace_placeholder(p, level + 1, &full_prefix),
            }
        }
    }

    fn trace_feature(&mut self, k: usize, prefix: &str) {
        let feature = &self.features[k];
        let name = self.names.get(k).map_or("?", String::as_str);
        let _ = writeln!(self.output, "{}{} = {}", prefix, name, feature.describe(self.graph));

        if let Feature::Boosted(f) = feature {
            let (parent, alias) = match self.graph.endpoints(f.last_edge()) {
                Ok((from, to)) => (self.graph.alias(from), self.graph.alias(to)),
                Err(_) => ("?", "?"),
            };
            let stem = build_child_stem(prefix);
            self.trace_tree(&f.tree, alias, parent, "", &format!("{}`-- ", stem));
        }
    }

    fn trace_tree(&mut self, tree: &WeightTree, alias: &str, parent: &str, label: &str, prefix: &str) {
        match tree {
            WeightTree::Leaf(w) => {
                let _ = writeln!(self.output, "{}{}weight {:.4}", prefix, label, w);
            }
            WeightTree::Split { condition, yes, no } => {
                let _ = writeln!(self.output, "{}{}{}?", prefix, label, condition.describe(alias, parent));
                let stem = build_child_stem(prefix);
                self.trace_tree(yes, alias, parent, "yes: ", &format!("{}|-- ", stem));
                self.trace_tree(no, alias, parent, "no: ", &format!("{}`-- ", stem));
            }
        }
    }

    fn join_rule(&self, edge: EdgeId) -> String {
        let Ok((from, to)) = self.graph.endpoints(edge) else { return "?".into() };
        let e = self.graph.edge(edge);
        let (from, to) = (self.graph.alias(from), self.graph.alias(to));

        let mut rule = format!("{} ON {}.{} = {}.{}", to, from, e.join_key, to, e.other_join_key);
        if let (Some(ts), Some(other)) = (&e.time_stamp, &e.other_time_stamp) {
            let _ = write!(rule, ", {}.{} <= {}.{}", to, other, from, ts);
            if e.horizon > 0.0 {
                let _ = write!(rule, " - {}", e.horizon);
            }
            if let Some(window) = e.max_window {
                let _ = write!(rule, ", window {}", window);
            }
        }
        if let Some(upper) = &e.upper_time_stamp {
            let _ = write!(rule, ", valid until {}.{}", to, upper);
        }
        rule
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`-- ", "    ").replace("|-- ", "|   ")
}

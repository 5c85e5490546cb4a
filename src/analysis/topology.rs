use crate::error::{EngineError, Result};
use crate::graph::{EdgeId, JoinGraph, PlaceholderId};
use smallvec::SmallVec;

/// A chain of edges starting at the population placeholder.
pub type JoinPath = SmallVec<[EdgeId; 4]>;

/// Fails if a cycle is reachable from the population placeholder.
///
/// Uses DFS with a three-colour marking; placeholders that the population
/// cannot reach are ignored since they never contribute features.
pub fn check_acyclic(graph: &JoinGraph) -> Result<()> {
    let mut state = vec![VisitState::None; graph.placeholder_count()];
    visit(graph, graph.population(), &mut state)
}

#[derive(Clone, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting, // Used for cycle detection
    Visited,
}

fn visit(graph: &JoinGraph, node: PlaceholderId, state: &mut Vec<VisitState>) -> Result<()> {
    let idx = node.index();

    match state[idx] {
        VisitState::Visited => return Ok(()),
        VisitState::Visiting => return Err(EngineError::Schema(format!(
            "cycle detected in join graph involving placeholder '{}'", graph.alias(node)
        ))),
        VisitState::None => state[idx] = VisitState::Visiting,
    }

    for edge in graph.outgoing(node) {
        let (_, to) = graph.endpoints(edge)?;
        visit(graph, to, state)?;
    }

    state[idx] = VisitState::Visited;
    Ok(())
}

/// Enumerates every path of at most `max_depth` edges from the population,
/// shorter paths first within each branch. Assumes the graph is acyclic.
pub fn paths(graph: &JoinGraph, max_depth: usize) -> Vec<JoinPath> {
    let mut out = Vec::new();
    let mut stack = JoinPath::new();
    extend(graph, graph.population(), max_depth, &mut stack, &mut out);
    out
}

fn extend(graph: &JoinGraph, node: PlaceholderId, budget: usize, stack: &mut JoinPath, out: &mut Vec<JoinPath>) {
    if budget == 0 { return; }
    for edge in graph.outgoing(node) {
        let Ok((_, to)) = graph.endpoints(edge) else { continue };
        stack.push(edge);
        out.push(stack.clone());
        extend(graph, to, budget - 1, stack, out);
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dag::tests::schema;
    use crate::graph::JoinSpec;
    use crate::store::Role;

    fn cols() -> Vec<(&'static str, Role)> {
        vec![("jk", Role::JoinKey), ("ts", Role::TimeStamp)]
    }

    #[test]
    fn test_snowflake_paths() {
        // Shape: POP -> A -> B, POP -> C
        let mut g = JoinGraph::new(schema("POP", &cols())).unwrap();
        let a = g.add_placeholder(schema("A", &cols())).unwrap();
        let b = g.add_placeholder(schema("B", &cols())).unwrap();
        let c = g.add_placeholder(schema("C", &cols())).unwrap();
        let pa = g.join(g.population(), a, JoinSpec::new("jk")).unwrap();
        let ab = g.join(a, b, JoinSpec::new("jk")).unwrap();
        let pc = g.join(g.population(), c, JoinSpec::new("jk")).unwrap();

        let depth1 = g.paths(1).unwrap();
        assert_eq!(depth1.len(), 2);

        let depth2 = g.paths(2).unwrap();
        assert_eq!(depth2.len(), 3);
        assert!(depth2.iter().any(|p| p.as_slice() == [pa, ab]));
        assert!(depth2.iter().any(|p| p.as_slice() == [pc]));
    }

    #[test]
    fn test_cycle_detection_explicit() {
        let mut g = JoinGraph::new(schema("POP", &cols())).unwrap();
        let a = g.add_placeholder(schema("A", &cols())).unwrap();
        let b = g.add_placeholder(schema("B", &cols())).unwrap();
        g.join(g.population(), a, JoinSpec::new("jk")).unwrap();
        g.join(a, b, JoinSpec::new("jk")).unwrap();
        g.join(b, a, JoinSpec::new("jk")).unwrap();

        let err = g.paths(1).unwrap_err();
        assert!(matches!(&err, EngineError::Schema(msg) if msg.contains("cycle")), "Msg: {}", err);
    }

    #[test]
    fn test_unreachable_cycle_is_ignored() {
        let mut g = JoinGraph::new(schema("POP", &cols())).unwrap();
        let a = g.add_placeholder(schema("A", &cols())).unwrap();
        let b = g.add_placeholder(schema("B", &cols())).unwrap();
        g.join(a, b, JoinSpec::new("jk")).unwrap();
        g.join(b, a, JoinSpec::new("jk")).unwrap();
        assert!(g.paths(3).unwrap().is_empty());
    }
}

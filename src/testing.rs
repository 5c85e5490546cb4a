//! Shared in-crate test fixtures.

use crate::graph::{JoinGraph, JoinSpec};
use crate::store::{Roles, Table, Value};

pub(crate) struct Fixture {
    pub population: Table,
    pub peripheral: Table,
    pub graph: JoinGraph,
}

/// Customers observed at `ts = 10` with their transactions every three time
/// units. Customer `k` has `k % 5 + 1` transactions, so its target (the number
/// of transactions not in the future) is `min(k % 5 + 1, 4)`.
pub(crate) fn sales(n: usize) -> Fixture {
    let pop_rows: Vec<Vec<Value>> = (0..n)
        .map(|k| vec![format!("c{}", k).into(), 10.0.into(), (((k % 5) + 1).min(4) as f64).into()])
        .collect();
    let population = Table::from_rows(
        "CUSTOMERS",
        &Roles::new().join_key("customer").time_stamp("ts").target("y"),
        &["customer", "ts", "y"],
        &pop_rows,
    ).unwrap();

    let mut per_rows = Vec::new();
    for k in 0..n {
        for t in 0..(k % 5) + 1 {
            per_rows.push(vec![
                format!("c{}", k).into(),
                (3.0 * t as f64).into(),
                (((k * 7 + t * 3) % 11) as f64).into(),
                (if t % 2 == 0 { "card" } else { "cash" }).into(),
            ]);
        }
    }
    let peripheral = Table::from_rows(
        "TRANSACTIONS",
        &Roles::new().join_key("customer").time_stamp("ts").numerical("amount").categorical("kind"),
        &["customer", "ts", "amount", "kind"],
        &per_rows,
    ).unwrap();

    let graph = star(&population, &peripheral, JoinSpec::new("customer").time_stamp("ts"));
    Fixture { population, peripheral, graph }
}

/// Three population rows at `ts = 10` keyed `a`, `b`, `c`; the peripheral has
/// one past row for `a`, one past and one future row for `b`.
pub(crate) fn three_rows() -> Fixture {
    let population = Table::from_rows(
        "POPULATION",
        &Roles::new().join_key("jk").time_stamp("ts").target("y"),
        &["jk", "ts", "y"],
        &[
            vec!["a".into(), 10.0.into(), 1.0.into()],
            vec!["b".into(), 10.0.into(), 1.0.into()],
            vec!["c".into(), 10.0.into(), 0.0.into()],
        ],
    ).unwrap();
    let peripheral = Table::from_rows(
        "PERIPHERAL",
        &Roles::new().join_key("jk").time_stamp("ts").numerical("x"),
        &["jk", "ts", "x"],
        &[
            vec!["a".into(), 5.0.into(), 2.0.into()],
            vec!["b".into(), 5.0.into(), 4.0.into()],
            vec!["b".into(), 20.0.into(), 8.0.into()],
        ],
    ).unwrap();
    let graph = star(&population, &peripheral, JoinSpec::new("jk").time_stamp("ts"));
    Fixture { population, peripheral, graph }
}

fn star(population: &Table, peripheral: &Table, spec: JoinSpec) -> JoinGraph {
    let mut graph = JoinGraph::new(population.schema()).unwrap();
    let p = graph.add_placeholder(peripheral.schema()).unwrap();
    graph.join(graph.population(), p, spec).unwrap();
    graph
}

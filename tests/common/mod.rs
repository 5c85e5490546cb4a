#![allow(dead_code)]

use joinery_core::compute::FeatureMatrix;
use joinery_core::{JoinGraph, JoinSpec, Roles, Table, Value};

pub struct Sales {
    pub population: Table,
    pub transactions: Table,
    pub graph: JoinGraph,
}

fn transaction(k: usize, t: usize) -> Vec<Value> {
    vec![
        format!("c{}", k).into(),
        (3.0 * t as f64).into(),
        (((k * 7 + t * 3) % 11) as f64).into(),
        (if t % 2 == 0 { "card" } else { "cash" }).into(),
    ]
}

/// Customer `k` is observed at `ts = 10` and has `k % 5 + 1` transactions
/// at `ts = 0, 3, 6, ...`. `y` counts the transactions visible at `ts = 10`,
/// `spend` sums their amounts.
pub fn sales(n: usize) -> Sales {
    sales_with_future(n, 0)
}

/// Like [`sales`], with `extra` additional transactions per customer dated
/// after the population time stamp.
pub fn sales_with_future(n: usize, extra: usize) -> Sales {
    let mut pop_rows = Vec::new();
    let mut per_rows = Vec::new();
    for k in 0..n {
        let visible: Vec<usize> = (0..(k % 5) + 1).filter(|t| 3 * t <= 10).collect();
        let spend: usize = visible.iter().map(|t| (k * 7 + t * 3) % 11).sum();
        pop_rows.push(vec![
            format!("c{}", k).into(),
            10.0.into(),
            (visible.len() as f64).into(),
            (spend as f64).into(),
        ]);
        for t in 0..(k % 5) + 1 {
            per_rows.push(transaction(k, t));
        }
        for e in 0..extra {
            per_rows.push(vec![
                format!("c{}", k).into(),
                (50.0 + e as f64).into(),
                1000.0.into(),
                "card".into(),
            ]);
        }
    }

    let population = Table::from_rows(
        "CUSTOMERS",
        &Roles::new().join_key("customer").time_stamp("ts").target("y").target("spend"),
        &["customer", "ts", "y", "spend"],
        &pop_rows,
    ).unwrap();
    let transactions = Table::from_rows(
        "TRANSACTIONS",
        &Roles::new().join_key("customer").time_stamp("ts").numerical("amount").categorical("kind"),
        &["customer", "ts", "amount", "kind"],
        &per_rows,
    ).unwrap();

    let mut graph = JoinGraph::new(population.schema()).unwrap();
    let p = graph.add_placeholder(transactions.schema()).unwrap();
    graph.join(graph.population(), p, JoinSpec::new("customer").time_stamp("ts")).unwrap();
    Sales { population, transactions, graph }
}

/// Equality that treats missing values as equal to each other.
pub fn assert_same_matrix(a: &FeatureMatrix, b: &FeatureMatrix) {
    assert_eq!(a.names(), b.names());
    assert_eq!(a.n_rows(), b.n_rows());
    for j in 0..a.n_cols() {
        let bits = |m: &FeatureMatrix| m.column(j).iter()
            .map(|v| if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() })
            .collect::<Vec<_>>();
        assert_eq!(bits(a), bits(b), "column {} differs", a.names()[j]);
    }
}

pub struct Shop {
    pub population: Table,
    pub orders: Table,
    pub items: Table,
    pub graph: JoinGraph,
}

fn items_in(k: usize, t: usize) -> usize {
    (k + 2 * t) % 4 + 1
}

/// Snowflake: CUSTOMERS -> ORDERS -> ITEMS. Customer `k` placed orders at
/// `ts = 2` and `ts = 6` plus one at `ts = 20` that is in the future; order
/// `t` holds `items_in(k, t)` items. `items` counts the items of the visible
/// orders, so it is only reachable through the second hop.
pub fn shop(n: usize) -> Shop {
    let mut pop_rows = Vec::new();
    let mut order_rows = Vec::new();
    let mut item_rows = Vec::new();
    for k in 0..n {
        let customer = format!("c{}", k);
        let visible: usize = (0..2).map(|t| items_in(k, t)).sum();
        pop_rows.push(vec![customer.clone().into(), 10.0.into(), (visible as f64).into()]);
        for (t, ts) in [2.0, 6.0, 20.0].into_iter().enumerate() {
            let order = format!("o{}_{}", k, t);
            order_rows.push(vec![customer.clone().into(), ts.into(), order.clone().into()]);
            for i in 0..items_in(k, t) {
                item_rows.push(vec![order.clone().into(), (((k + i) % 5) as f64).into()]);
            }
        }
    }

    let population = Table::from_rows(
        "CUSTOMERS",
        &Roles::new().join_key("customer").time_stamp("ts").target("items"),
        &["customer", "ts", "items"],
        &pop_rows,
    ).unwrap();
    let orders = Table::from_rows(
        "ORDERS",
        &Roles::new().join_key("customer").time_stamp("ts").join_key("order"),
        &["customer", "ts", "order"],
        &order_rows,
    ).unwrap();
    let items = Table::from_rows(
        "ITEMS",
        &Roles::new().join_key("order").numerical("price"),
        &["order", "price"],
        &item_rows,
    ).unwrap();

    let mut graph = JoinGraph::new(population.schema()).unwrap();
    let o = graph.add_placeholder(orders.schema()).unwrap();
    let i = graph.add_placeholder(items.schema()).unwrap();
    graph.join(graph.population(), o, JoinSpec::new("customer").time_stamp("ts")).unwrap();
    graph.join(o, i, JoinSpec::new("order")).unwrap();
    Shop { population, orders, items, graph }
}

/// People in three teams joining at `ts = k`. `earlier` counts the team
/// members (self included) who joined no later, which a self-join of the
/// population recovers.
pub fn team_self_join(n: usize) -> (Table, JoinGraph) {
    let rows: Vec<Vec<Value>> = (0..n)
        .map(|k| vec![
            format!("g{}", k % 3).into(),
            (k as f64).into(),
            (((k * 5) % 7) as f64).into(),
            ((k / 3 + 1) as f64).into(),
        ])
        .collect();
    let people = Table::from_rows(
        "PEOPLE",
        &Roles::new().join_key("team").time_stamp("ts").numerical("score").target("earlier"),
        &["team", "ts", "score", "earlier"],
        &rows,
    ).unwrap();
    let mut graph = JoinGraph::new(people.schema()).unwrap();
    let p = graph.add_placeholder(people.schema()).unwrap();
    graph.join(graph.population(), p, JoinSpec::new("team").time_stamp("ts")).unwrap();
    (people, graph)
}

/// Accounts with a credit line and payments in the same currency. `excess`
/// sums `amount - credit` over the visible payments.
pub fn accounts(n: usize) -> (Table, Table, JoinGraph) {
    let mut acc_rows = Vec::new();
    let mut pay_rows = Vec::new();
    for k in 0..n {
        let credit = ((k % 4) * 10) as f64;
        let mut excess = 0.0;
        for t in 0..(k % 3) + 1 {
            let amount = ((k * 13 + t * 7) % 50) as f64;
            excess += amount - credit;
            pay_rows.push(vec![format!("a{}", k).into(), (t as f64).into(), amount.into()]);
        }
        acc_rows.push(vec![format!("a{}", k).into(), 10.0.into(), credit.into(), excess.into()]);
    }
    let population = Table::from_rows(
        "ACCOUNTS",
        &Roles::new().join_key("account").time_stamp("ts").numerical("credit").unit("credit", "USD").target("excess"),
        &["account", "ts", "credit", "excess"],
        &acc_rows,
    ).unwrap();
    let payments = Table::from_rows(
        "PAYMENTS",
        &Roles::new().join_key("account").time_stamp("ts").numerical("amount").unit("amount", "USD"),
        &["account", "ts", "amount"],
        &pay_rows,
    ).unwrap();
    let mut graph = JoinGraph::new(population.schema()).unwrap();
    let p = graph.add_placeholder(payments.schema()).unwrap();
    graph.join(graph.population(), p, JoinSpec::new("account").time_stamp("ts")).unwrap();
    (population, payments, graph)
}

fn valid_to(t: usize) -> f64 {
    if t == 2 { f64::NAN } else { 3.0 * t as f64 + 5.0 }
}

/// Like [`sales`], with a `valid_to` upper time stamp on the transactions
/// (missing for the third one) and a join that skips the last time unit
/// (`horizon = 1`) and looks back six units (`max_window = 6`). At `ts = 10`
/// that admits transactions stamped in `[3, 9]` still valid after `10`.
pub fn windowed_sales(n: usize) -> (Sales, Vec<f64>) {
    let mut pop_rows = Vec::new();
    let mut per_rows = Vec::new();
    let mut admitted = Vec::new();
    for k in 0..n {
        let mut count = 0;
        for t in 0..(k % 5) + 1 {
            let ts = 3.0 * t as f64;
            let v = valid_to(t);
            if (3.0..=9.0).contains(&ts) && (v.is_nan() || v > 10.0) {
                count += 1;
            }
            let mut row = transaction(k, t);
            row.push(v.into());
            per_rows.push(row);
        }
        admitted.push(count as f64);
        pop_rows.push(vec![format!("c{}", k).into(), 10.0.into(), (count as f64).into()]);
    }

    let population = Table::from_rows(
        "CUSTOMERS",
        &Roles::new().join_key("customer").time_stamp("ts").target("y"),
        &["customer", "ts", "y"],
        &pop_rows,
    ).unwrap();
    let transactions = Table::from_rows(
        "TRANSACTIONS",
        &Roles::new().join_key("customer").time_stamp("ts").numerical("amount").categorical("kind").time_stamp("valid_to"),
        &["customer", "ts", "amount", "kind", "valid_to"],
        &per_rows,
    ).unwrap();

    let mut graph = JoinGraph::new(population.schema()).unwrap();
    let p = graph.add_placeholder(transactions.schema()).unwrap();
    let spec = JoinSpec::new("customer").time_stamp("ts").horizon(1.0).max_window(6.0).upper_time_stamp("valid_to");
    graph.join(graph.population(), p, spec).unwrap();
    (Sales { population, transactions, graph }, admitted)
}

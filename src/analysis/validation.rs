//! Binds concrete tables to the placeholders of a join graph.
//!
//! Like a linter, binding collects every mismatch before reporting, so a
//! caller sees all missing columns at once.

use crate::error::{EngineError, Result};
use crate::graph::{JoinGraph, PlaceholderId};
use crate::store::{Role, Table, TableSchema};

/// Tables indexed by placeholder.
#[derive(Debug, Clone)]
pub struct BoundTables<'a> {
    tables: Vec<&'a Table>,
}

impl<'a> BoundTables<'a> {
    pub fn get(&self, id: PlaceholderId) -> &'a Table { self.tables[id.index()] }
}

/// Resolves the table of every placeholder and checks it against the
/// placeholder's schema.
///
/// The population placeholder always binds to `population`. Every other
/// placeholder binds to the peripheral table carrying its schema name, or
/// to `population` for a self-join whose peripheral was not supplied.
pub fn bind<'a>(graph: &JoinGraph, population: &'a Table, peripherals: &[&'a Table]) -> Result<BoundTables<'a>> {
    let population_schema = &graph.schema(graph.population()).name;
    let mut tables = Vec::with_capacity(graph.placeholder_count());
    let mut errors = Vec::new();

    for id in graph.placeholder_ids() {
        let schema = graph.schema(id);
        let table = if id == graph.population() {
            Some(population)
        } else {
            peripherals.iter().copied().find(|t| t.name() == schema.name)
                .or_else(|| (schema.name == *population_schema).then_some(population))
        };

        match table {
            Some(table) => {
                check_schema(graph.alias(id), schema, table, &mut errors);
                tables.push(table);
            }
            None => {
                errors.push(format!("no table supplied for placeholder '{}'", graph.alias(id)));
                tables.push(population);
            }
        }
    }

    if errors.is_empty() {
        Ok(BoundTables { tables })
    } else {
        Err(EngineError::Schema(errors.join("; ")))
    }
}

fn check_schema(alias: &str, schema: &TableSchema, table: &Table, errors: &mut Vec<String>) {
    for meta in schema.columns.iter().filter(|c| c.role != Role::Unused) {
        // Targets are only needed while fitting and scoring; serving tables may omit them.
        if meta.role == Role::Target {
            continue;
        }
        match table.column(&meta.name) {
            Some(col) if col.role() == meta.role => {}
            Some(col) => errors.push(format!(
                "column '{}' of '{}' has role '{}' but placeholder '{}' expects '{}'",
                meta.name, table.name(), col.role(), alias, meta.role
            )),
            None => errors.push(format!(
                "table '{}' lacks column '{}' required by placeholder '{}'", table.name(), meta.name, alias
            )),
        }
    }
}

/// Target columns of the population table, in column order.
pub fn targets(table: &Table) -> Vec<(&str, &[f64])> {
    table.columns_with_role(Role::Target)
        .filter_map(|c| c.as_numeric().map(|v| (c.name(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::JoinSpec;
    use crate::store::{Roles, Value};

    fn table(name: &str, roles: &Roles, header: &[&str]) -> Table {
        let row: Vec<Value> = header.iter().map(|_| Value::from(1.0)).collect();
        Table::from_rows(name, roles, header, &[row]).unwrap()
    }

    #[test]
    fn test_bind_collects_all_errors() {
        let roles = Roles::new().join_key("jk").time_stamp("ts").numerical("x");
        let pop = table("POPULATION", &roles, &["jk", "ts"]);
        let per = table("PERIPHERAL", &roles, &["jk", "ts", "x"]);

        let mut g = JoinGraph::new(pop.schema()).unwrap();
        let p = g.add_placeholder(per.schema()).unwrap();
        g.join(g.population(), p, JoinSpec::new("jk").time_stamp("ts")).unwrap();

        assert!(bind(&g, &pop, &[&per]).is_ok());
        let err = bind(&g, &pop, &[]).unwrap_err();
        assert!(matches!(&err, EngineError::Schema(m) if m.contains("no table supplied")));

        let wrong = table("PERIPHERAL", &Roles::new().join_key("jk").numerical("ts"), &["jk", "ts"]);
        let err = bind(&g, &pop, &[&wrong]).unwrap_err();
        let EngineError::Schema(msg) = err else { panic!("expected schema error") };
        assert!(msg.contains("role 'numerical'"));
        assert!(msg.contains("lacks column 'x'"));
    }

    #[test]
    fn test_self_join_falls_back_to_population() {
        let roles = Roles::new().join_key("jk").time_stamp("ts");
        let pop = table("PERIPHERAL", &roles, &["jk", "ts"]);
        let mut g = JoinGraph::new(pop.schema()).unwrap();
        let p = g.add_placeholder(pop.schema()).unwrap();
        let bound = bind(&g, &pop, &[]).unwrap();
        assert_eq!(bound.get(p).n_rows(), 1);
    }
}

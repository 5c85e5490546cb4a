use super::types::*;
use crate::error::{EngineError, Result};
use serde::{Serialize, Deserialize};
use std::collections::{HashMap, HashSet};

/// Column layout of a table, used as the shape of a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column and checks that it carries the expected role.
    pub fn require(&self, name: &str, role: Role) -> Result<&ColumnMeta> {
        match self.column(name) {
            Some(meta) if meta.role == role => Ok(meta),
            Some(meta) => Err(EngineError::Schema(format!(
                "column '{}' of '{}' has role '{}', expected '{}'", name, self.name, meta.role, role
            ))),
            None => Err(EngineError::Schema(format!(
                "'{}' has no column '{}'", self.name, name
            ))),
        }
    }

    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(move |c| c.role == role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

impl SchemaId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
}

/// Arena of table schemas keyed by table name, plus the alias namespace of
/// the placeholders referencing them. A self-join interns one schema and
/// hands out two aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: Vec<TableSchema>,
    by_name: HashMap<String, SchemaId>,

    // Ephemeral state for uniqueness checks (Not serialized, rebuilt on load)
    #[serde(skip)]
    used_aliases: HashSet<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.schemas.len() }

    /// Returns the id of the schema with this name, registering it first if
    /// needed. Re-registering a name with a different layout is a schema error.
    pub fn intern(&mut self, schema: TableSchema) -> Result<SchemaId> {
        if let Some(&id) = self.by_name.get(&schema.name) {
            let known = &self.schemas[id.index()];
            for col in &schema.columns {
                if let Some(existing) = known.column(&col.name) {
                    if existing.role != col.role {
                        return Err(EngineError::Schema(format!(
                            "table '{}' registered twice with conflicting roles for column '{}'",
                            schema.name, col.name
                        )));
                    }
                }
            }
            return Ok(id);
        }
        let id = SchemaId(self.schemas.len() as u32);
        self.by_name.insert(schema.name.clone(), id);
        self.schemas.push(schema);
        Ok(id)
    }

    pub fn get(&self, id: SchemaId) -> &TableSchema { &self.schemas[id.index()] }

    /// Reserves a unique alias derived from `base` (`base`, `base_1`, ...).
    pub fn unique_alias(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 1;
        while self.used_aliases.contains(&candidate) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }
        self.used_aliases.insert(candidate.clone());
        candidate
    }

    /// Rebuilds the alias set after deserialization.
    pub fn rebuild_alias_cache<'a>(&mut self, aliases: impl IntoIterator<Item = &'a str>) {
        self.used_aliases = aliases.into_iter().map(str::to_string).collect();
    }
}

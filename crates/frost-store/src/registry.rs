//! Typed lookup of live tables by name.
//!
//! Block headers name the tables whose tuples they carry; uneviction resolves
//! those names here. The lookup returns the concrete table handle or a typed
//! error — a name that does not resolve to an anti-cache table is a caller
//! bug, not a cast to attempt.

use std::collections::HashMap;

use frost_error::{FrostError, Result};

use crate::table::Table;

/// The set of live tables on one partition.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: HashMap<String, Table>,
}

impl TableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name, replacing any previous entry.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name().to_owned(), table);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Typed lookup used by the uneviction path.
    pub fn live_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| FrostError::NoSuchTable {
                name: name.to_owned(),
            })
    }

    /// Borrow two distinct tables mutably, e.g. parent and child during
    /// co-eviction.
    pub fn pair_mut(&mut self, first: &str, second: &str) -> Result<(&mut Table, &mut Table)> {
        if first == second {
            return Err(FrostError::internal(
                "parent and child tables must be distinct",
            ));
        }
        let [a, b] = self.tables.get_disjoint_mut([first, second]);
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(FrostError::NoSuchTable {
                name: first.to_owned(),
            }),
            (_, None) => Err(FrostError::NoSuchTable {
                name: second.to_owned(),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use frost_types::{Column, ColumnType, Schema};

    use super::*;
    use crate::index::IndexSpec;
    use crate::table::TableOptions;

    fn make(name: &str) -> Table {
        Table::new(
            name,
            0,
            Schema::new(vec![Column::new("id", ColumnType::Integer)]),
            8,
            vec![IndexSpec::unique(format!("{name}_pk"), 0)],
            TableOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn lookup_by_name() {
        let mut registry = TableRegistry::new();
        registry.insert(make("orders"));
        assert!(registry.get("orders").is_some());
        assert!(registry.live_table_mut("orders").is_ok());
        assert!(matches!(
            registry.live_table_mut("ghosts").unwrap_err(),
            FrostError::NoSuchTable { .. }
        ));
    }

    #[test]
    fn pair_mut_borrows_two_tables() {
        let mut registry = TableRegistry::new();
        registry.insert(make("parent"));
        registry.insert(make("child"));
        let (p, c) = registry.pair_mut("parent", "child").unwrap();
        assert_eq!(p.name(), "parent");
        assert_eq!(c.name(), "child");
        assert!(registry.pair_mut("parent", "parent").is_err());
        assert!(registry.pair_mut("parent", "ghost").is_err());
    }
}

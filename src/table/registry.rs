//! Registry of live tables keyed by id.

use chrono::{DateTime, Duration, Utc};
use log::info;
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::errors::TableError;

use super::config::TableSettings;
use super::table::Table;

/// All live tables. The owning service drives every table through
/// [`TableRegistry::tick_all`] and reaps idle ones with
/// [`TableRegistry::prune_idle`].
#[derive(Default)]
pub struct TableRegistry {
    tables: HashMap<String, Table>,
}

impl TableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with a fresh id and return the id.
    pub fn create(
        &mut self,
        owner_id: &str,
        settings: TableSettings,
        now: DateTime<Utc>,
    ) -> Result<String, TableError> {
        let id = Uuid::new_v4().to_string();
        let table = Table::new(&id, owner_id, settings, now)?;
        info!("table {id}: created by {owner_id}");
        self.tables.insert(id.clone(), table);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Table> {
        self.tables.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Table> {
        self.tables.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Table> {
        self.tables.remove(id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tick_all(&mut self, now: DateTime<Utc>) {
        for table in self.tables.values_mut() {
            table.tick(now);
        }
    }

    /// Drop tables idle for longer than `max_idle`. A table with a live
    /// hand is never pruned, however old its last activity.
    pub fn prune_idle(&mut self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let before = self.tables.len();
        self.tables.retain(|id, table| {
            let keep = table.hand().is_some() || now - table.last_active <= max_idle;
            if !keep {
                info!("table {id}: pruned after being idle");
            }
            keep
        });
        before - self.tables.len()
    }
}

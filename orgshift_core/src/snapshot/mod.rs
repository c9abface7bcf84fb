//! Snapshot persistence: one flat table per object type, plus the durable
//! old-id to new-id maps that make reconciliation re-runnable.

pub mod csv_store;

use crate::models::{IdMap, IdMaps, ObjectType, Record};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A raw snapshot table: ordered columns plus one field map per row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotTable {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Durable storage for snapshot tables, field listings, and id maps.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the raw table for an object type. `SnapshotMissing` when no
    /// table exists.
    async fn load_table(&self, object: &ObjectType) -> Result<SnapshotTable>;

    async fn save_table(&self, object: &ObjectType, table: &SnapshotTable) -> Result<()>;

    /// Persist the field listing (`api_name`, `type`) captured at export.
    async fn save_metadata(&self, object: &ObjectType, fields: &[(String, String)]) -> Result<()>;

    async fn save_id_map(&self, object: &ObjectType, map: &IdMap) -> Result<()>;

    /// Load one id map; `SnapshotMissing` when the object was never
    /// imported.
    async fn load_id_map(&self, object: &ObjectType) -> Result<IdMap>;

    /// Load the table as records keyed by the `Id` column.
    ///
    /// A missing `Id` column is `SnapshotMalformed` (the caller skips the
    /// object type with a warning); rows with a blank id are dropped.
    async fn load_records(&self, object: &ObjectType) -> Result<Vec<Record>> {
        let table = self.load_table(object).await?;
        if !table.columns.iter().any(|c| c == "Id") {
            return Err(Error::snapshot_malformed(
                object.as_str(),
                "no Id column in snapshot",
            ));
        }
        let mut records = Vec::with_capacity(table.rows.len());
        for row in table.rows {
            let id = row
                .get("Id")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                tracing::warn!(object = %object, "dropping snapshot row with blank Id");
                continue;
            }
            records.push(Record::new(id, row));
        }
        Ok(records)
    }

    /// Load every available id map for the given object types, skipping the
    /// ones that were never produced.
    async fn load_id_maps(&self, objects: &[ObjectType]) -> Result<IdMaps> {
        let mut maps = IdMaps::new();
        for object in objects {
            match self.load_id_map(object).await {
                Ok(map) => maps.insert(object.clone(), map),
                Err(Error::SnapshotMissing(_)) => {
                    tracing::warn!(object = %object, "no id map on disk; references to it will be skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(maps)
    }
}

/// Rewrite every cell across the given snapshot tables whose value is one of
/// `old_ids`, e.g. to collapse source-org user references onto a single
/// destination user before import. Returns the number of cells changed.
pub async fn rewrite_ids(
    store: &dyn SnapshotStore,
    objects: &[ObjectType],
    old_ids: &HashSet<String>,
    new_id: &str,
) -> Result<usize> {
    let mut changed = 0usize;
    for object in objects {
        let mut table = match store.load_table(object).await {
            Ok(t) => t,
            Err(Error::SnapshotMissing(_)) => continue,
            Err(e) => return Err(e),
        };
        let mut touched = false;
        for row in &mut table.rows {
            for value in row.values_mut() {
                if let Value::String(s) = value {
                    if old_ids.contains(s.as_str()) {
                        *value = Value::String(new_id.to_string());
                        changed += 1;
                        touched = true;
                    }
                }
            }
        }
        if touched {
            store.save_table(object, &table).await?;
            tracing::info!(object = %object, "rewrote ids in snapshot table");
        }
    }
    Ok(changed)
}

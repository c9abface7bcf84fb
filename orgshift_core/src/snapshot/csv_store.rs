//! CSV-backed SnapshotStore.
//!
//! Layout under one root directory:
//! - `exported_data/<Object>.csv`      snapshot tables (header row = fields)
//! - `exported_metadata/<Object>.csv`  field listings (`api_name,type`)
//! - `id_maps/<Object>.csv`            two columns, original id and new id
//!
//! All cells are strings; empty cells load as empty strings, which the
//! pipeline treats as blank.

use crate::models::{IdMap, ObjectType};
use crate::snapshot::{SnapshotStore, SnapshotTable};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    data_dir: PathBuf,
    metadata_dir: PathBuf,
    maps_dir: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("exported_data"),
            metadata_dir: root.join("exported_metadata"),
            maps_dir: root.join("id_maps"),
        }
    }

    fn table_path(&self, object: &ObjectType) -> PathBuf {
        self.data_dir.join(format!("{object}.csv"))
    }

    fn metadata_path(&self, object: &ObjectType) -> PathBuf {
        self.metadata_dir.join(format!("{object}.csv"))
    }

    fn map_path(&self, object: &ObjectType) -> PathBuf {
        self.maps_dir.join(format!("{object}.csv"))
    }

    async fn ensure_dir(dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::backend("create snapshot dir", e))
    }
}

#[async_trait]
impl SnapshotStore for CsvSnapshotStore {
    async fn load_table(&self, object: &ObjectType) -> Result<SnapshotTable> {
        let path = self.table_path(object);
        if !path.exists() {
            return Err(Error::SnapshotMissing(object.to_string()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| Error::backend("open snapshot table", e))?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| Error::snapshot_malformed(object.as_str(), e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record =
                result.map_err(|e| Error::snapshot_malformed(object.as_str(), e.to_string()))?;
            let mut row = Map::new();
            for (col, cell) in columns.iter().zip(record.iter()) {
                row.insert(col.clone(), Value::String(cell.to_string()));
            }
            rows.push(row);
        }
        Ok(SnapshotTable { columns, rows })
    }

    async fn save_table(&self, object: &ObjectType, table: &SnapshotTable) -> Result<()> {
        Self::ensure_dir(&self.data_dir).await?;
        let mut writer = csv::Writer::from_path(self.table_path(object))
            .map_err(|e| Error::backend("write snapshot table", e))?;
        writer
            .write_record(&table.columns)
            .map_err(|e| Error::backend("write snapshot header", e))?;
        for row in &table.rows {
            let cells: Vec<String> = table
                .columns
                .iter()
                .map(|col| match row.get(col) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect();
            writer
                .write_record(&cells)
                .map_err(|e| Error::backend("write snapshot row", e))?;
        }
        writer
            .flush()
            .map_err(|e| Error::backend("flush snapshot table", e))?;
        Ok(())
    }

    async fn save_metadata(&self, object: &ObjectType, fields: &[(String, String)]) -> Result<()> {
        Self::ensure_dir(&self.metadata_dir).await?;
        let mut writer = csv::Writer::from_path(self.metadata_path(object))
            .map_err(|e| Error::backend("write metadata listing", e))?;
        writer
            .write_record(["api_name", "type"])
            .map_err(|e| Error::backend("write metadata header", e))?;
        for (name, kind) in fields {
            writer
                .write_record([name, kind])
                .map_err(|e| Error::backend("write metadata row", e))?;
        }
        writer
            .flush()
            .map_err(|e| Error::backend("flush metadata listing", e))?;
        Ok(())
    }

    async fn save_id_map(&self, object: &ObjectType, map: &IdMap) -> Result<()> {
        Self::ensure_dir(&self.maps_dir).await?;
        let mut writer = csv::Writer::from_path(self.map_path(object))
            .map_err(|e| Error::backend("write id map", e))?;
        writer
            .write_record(["original_id", "new_id"])
            .map_err(|e| Error::backend("write id map header", e))?;
        // Deterministic order keeps the files diffable between runs.
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort();
        for (original, new) in entries {
            writer
                .write_record([original, new])
                .map_err(|e| Error::backend("write id map row", e))?;
        }
        writer
            .flush()
            .map_err(|e| Error::backend("flush id map", e))?;
        Ok(())
    }

    async fn load_id_map(&self, object: &ObjectType) -> Result<IdMap> {
        let path = self.map_path(object);
        if !path.exists() {
            return Err(Error::SnapshotMissing(object.to_string()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| Error::backend("open id map", e))?;
        let mut map = IdMap::new();
        for result in reader.records() {
            let record =
                result.map_err(|e| Error::snapshot_malformed(object.as_str(), e.to_string()))?;
            let (Some(original), Some(new)) = (record.get(0), record.get(1)) else {
                return Err(Error::snapshot_malformed(
                    object.as_str(),
                    "id map row must have two columns",
                ));
            };
            if original.is_empty() || new.is_empty() {
                continue;
            }
            map.insert(original.to_string(), new.to_string());
        }
        Ok(map)
    }
}

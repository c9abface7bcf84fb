//! Snapshot export: one table per object type, plus its field listing.
//!
//! The counterpart to the import pipeline; a destination org seeded from
//! these files can later be reconciled from the id maps alone.

use crate::config::MigrationConfig;
use crate::migrate::metadata::MetadataCache;
use crate::models::ObjectType;
use crate::platform::Platform;
use crate::snapshot::{SnapshotStore, SnapshotTable};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub object: ObjectType,
    pub rows: usize,
    pub skipped: Option<String>,
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn export_all(
    platform: &dyn Platform,
    metadata: &MetadataCache,
    store: &dyn SnapshotStore,
    config: &MigrationConfig,
) -> Result<Vec<ExportReport>> {
    let mut reports = Vec::new();
    for object in &config.import_order {
        reports.push(export_one(platform, metadata, store, object).await?);
    }
    Ok(reports)
}

async fn export_one(
    platform: &dyn Platform,
    metadata: &MetadataCache,
    store: &dyn SnapshotStore,
    object: &ObjectType,
) -> Result<ExportReport> {
    let meta = match metadata.describe(object).await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(object = %object, error = %e, "skipping export");
            return Ok(ExportReport {
                object: object.clone(),
                rows: 0,
                skipped: Some(e.to_string()),
            });
        }
    };

    let columns: Vec<String> = meta.fields.iter().map(|f| f.name.clone()).collect();
    let listing: Vec<(String, String)> = meta
        .fields
        .iter()
        .map(|f| (f.name.clone(), f.kind.as_str().to_string()))
        .collect();
    store.save_metadata(object, &listing).await?;

    let soql = format!("SELECT {} FROM {}", columns.join(", "), object);
    let rows = match platform.query(&soql).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(object = %object, error = %e, "query failed; skipping export");
            return Ok(ExportReport {
                object: object.clone(),
                rows: 0,
                skipped: Some(e.to_string()),
            });
        }
    };

    let rows: Vec<_> = rows
        .into_iter()
        .map(|mut row| {
            // Envelope noise from the query API, not a field.
            row.remove("attributes");
            row
        })
        .collect();

    let table = SnapshotTable {
        columns,
        rows,
    };
    // An empty result still writes the header row, so a later import sees
    // the object type with zero rows rather than a missing snapshot.
    store.save_table(object, &table).await?;

    let report = ExportReport {
        object: object.clone(),
        rows: table.rows.len(),
        skipped: None,
    };
    tracing::info!(object = %object, rows = report.rows, "exported");
    Ok(report)
}

//! Pipeline driver.
//!
//! Object types are processed strictly sequentially in the configured import
//! order: each type's resolution may depend on id maps produced by the types
//! before it, and the reconciliation pass needs every map complete. Nothing
//! here is parallel on purpose; correctness first.

use crate::config::MigrationConfig;
use crate::migrate::batch::{build_id_map, BatchExecutor};
use crate::migrate::defaults;
use crate::migrate::metadata::MetadataCache;
use crate::migrate::resolve;
use crate::migrate::sanitize::sanitize;
use crate::migrate::validate;
use crate::models::{ObjectMeta, ObjectType};
use crate::platform::Platform;
use crate::snapshot::SnapshotStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Insert every object type in order, then reconcile unless disabled.
    All { reconcile: bool },
    /// Insert a single object type. Reconciliation stays a separate mode.
    Object(ObjectType),
    /// Rewrite lookups from the persisted id maps; inserts must have run.
    ReconcileOnly,
}

/// Per-object insert accounting, surfaced at the end of each object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReport {
    pub object: ObjectType,
    pub loaded: usize,
    pub submitted: usize,
    pub created: usize,
    pub failed: usize,
    /// Set when the object type was skipped entirely, with the reason.
    pub skipped: Option<String>,
}

impl ObjectReport {
    fn skipped(object: &ObjectType, reason: impl Into<String>) -> Self {
        Self {
            object: object.clone(),
            loaded: 0,
            submitted: 0,
            created: 0,
            failed: 0,
            skipped: Some(reason.into()),
        }
    }
}

/// Per-object reconciliation accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub object: ObjectType,
    pub queued: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: Option<String>,
}

impl ReconcileReport {
    fn skipped(object: &ObjectType, reason: impl Into<String>) -> Self {
        Self {
            object: object.clone(),
            queued: 0,
            applied: 0,
            failed: 0,
            skipped: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub objects: Vec<ObjectReport>,
    pub reconciliation: Vec<ReconcileReport>,
}

pub struct MigrationEngine {
    platform: Arc<dyn Platform>,
    store: Arc<dyn SnapshotStore>,
    metadata: MetadataCache,
    executor: BatchExecutor,
    config: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn SnapshotStore>,
        config: MigrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            metadata: MetadataCache::new(platform.clone()),
            executor: BatchExecutor::new(platform.clone(), config.batch_size),
            platform,
            store,
            config,
        })
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let run_id = ulid::Ulid::new().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, ?mode, "migration run started");

        let mut objects = Vec::new();
        let mut reconciliation = Vec::new();

        match mode {
            RunMode::All { reconcile } => {
                let defaults = defaults::provision(self.platform.as_ref(), &self.config).await;
                for object in self.config.import_order.clone() {
                    objects.push(self.import_one(&object, &defaults).await?);
                }
                if reconcile {
                    reconciliation = self.reconcile_pass().await?;
                }
            }
            RunMode::Object(object) => {
                if !self.config.contains_object(&object) {
                    return Err(Error::InvalidInput(format!(
                        "unknown object type: {object} (not in import order)"
                    )));
                }
                let defaults = defaults::provision(self.platform.as_ref(), &self.config).await;
                objects.push(self.import_one(&object, &defaults).await?);
            }
            RunMode::ReconcileOnly => {
                reconciliation = self.reconcile_pass().await?;
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            objects,
            reconciliation,
        };
        tracing::info!(run_id = %report.run_id, "migration run completed");
        Ok(report)
    }

    /// Metadata for one object type, or `None` (with a warning) when the
    /// describe call fails and the pipeline continues degraded.
    async fn describe_or_degrade(&self, object: &ObjectType) -> Option<Arc<ObjectMeta>> {
        match self.metadata.describe(object).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(object = %object, error = %e, "continuing without metadata");
                None
            }
        }
    }

    async fn import_one(
        &self,
        object: &ObjectType,
        defaults: &HashMap<ObjectType, String>,
    ) -> Result<ObjectReport> {
        let records = match self.store.load_records(object).await {
            Ok(records) => records,
            Err(e @ (Error::SnapshotMissing(_) | Error::SnapshotMalformed { .. })) => {
                tracing::warn!(object = %object, reason = %e, "skipping object type");
                return Ok(ObjectReport::skipped(object, e.to_string()));
            }
            Err(e) => return Err(e),
        };
        let loaded = records.len();

        let meta = self.describe_or_degrade(object).await;
        let meta_ref = meta.as_deref();

        let records = sanitize(object, records, meta_ref, &self.config);
        let records =
            resolve::substitute_defaults(object, records, defaults, meta_ref, &self.config);
        let records = validate::clean(
            object,
            records,
            meta_ref,
            self.platform.as_ref(),
            &self.config,
        )
        .await;

        let outcomes = self.executor.insert(object, &records).await;
        let id_map = build_id_map(object, &records, &outcomes);
        self.store.save_id_map(object, &id_map).await?;

        let report = ObjectReport {
            object: object.clone(),
            loaded,
            submitted: records.len(),
            created: id_map.len(),
            failed: records.len() - id_map.len(),
            skipped: None,
        };
        tracing::info!(
            object = %object,
            loaded = report.loaded,
            submitted = report.submitted,
            created = report.created,
            failed = report.failed,
            "object type imported"
        );
        Ok(report)
    }

    async fn reconcile_pass(&self) -> Result<Vec<ReconcileReport>> {
        let id_maps = self.store.load_id_maps(&self.config.import_order).await?;
        let mut reports = Vec::new();

        for object in &self.config.import_order {
            if !id_maps.contains(object) {
                reports.push(ReconcileReport::skipped(object, "no id map on disk"));
                continue;
            }
            let records = match self.store.load_records(object).await {
                Ok(records) => records,
                Err(e @ (Error::SnapshotMissing(_) | Error::SnapshotMalformed { .. })) => {
                    tracing::warn!(object = %object, reason = %e, "skipping reconciliation");
                    reports.push(ReconcileReport::skipped(object, e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Some(meta) = self.describe_or_degrade(object).await else {
                reports.push(ReconcileReport::skipped(object, "metadata unavailable"));
                continue;
            };

            let groups =
                resolve::plan_reconciliation(object, &records, &id_maps, &meta, &self.config);

            let mut queued = 0usize;
            let mut applied = 0usize;
            for group in groups {
                queued += group.updates.len();
                let outcomes = self.executor.update(object, &group.updates).await;
                let ok = outcomes.iter().filter(|o| o.success).count();
                applied += ok;
                tracing::info!(
                    object = %object,
                    field = %group.field,
                    target = %group.target,
                    queued = group.updates.len(),
                    applied = ok,
                    "lookup field reconciled"
                );
            }

            reports.push(ReconcileReport {
                object: object.clone(),
                queued,
                applied,
                failed: queued - applied,
                skipped: None,
            });
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use crate::platform::memory::{meta_from_fields, MemoryPlatform};
    use crate::snapshot::csv_store::CsvSnapshotStore;
    use crate::snapshot::{SnapshotTable, SnapshotStore as _};
    use serde_json::{json, Value};

    fn test_config() -> MigrationConfig {
        MigrationConfig {
            import_order: vec![
                ObjectType::new("Account"),
                ObjectType::new("Opportunity"),
                ObjectType::new("Task"),
            ],
            defaults: MigrationConfig::default()
                .defaults
                .into_iter()
                .filter(|d| {
                    matches!(d.object.as_str(), "Account" | "Opportunity")
                })
                .collect(),
            ..MigrationConfig::default()
        }
    }

    async fn test_platform() -> MemoryPlatform {
        let p = MemoryPlatform::new();
        p.register_object(
            meta_from_fields(
                "Account",
                &[
                    ("Id", FieldKind::Id, false, false, false, &[]),
                    ("Name", FieldKind::String, true, true, false, &[]),
                ],
            ),
            "001",
        )
        .await;
        p.register_object(
            meta_from_fields(
                "Opportunity",
                &[
                    ("Id", FieldKind::Id, false, false, false, &[]),
                    ("Name", FieldKind::String, true, true, false, &[]),
                    ("StageName", FieldKind::Picklist, true, true, false, &[]),
                    ("CloseDate", FieldKind::Date, true, true, false, &[]),
                    (
                        "AccountId",
                        FieldKind::Reference,
                        true,
                        true,
                        false,
                        &["Account"],
                    ),
                ],
            ),
            "006",
        )
        .await;
        p.register_object(
            meta_from_fields(
                "Task",
                &[
                    ("Id", FieldKind::Id, false, false, false, &[]),
                    ("Subject", FieldKind::String, true, true, false, &[]),
                    (
                        "WhatId",
                        FieldKind::Reference,
                        true,
                        true,
                        false,
                        &["Account", "Opportunity"],
                    ),
                ],
            ),
            "00T",
        )
        .await;
        p
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> SnapshotTable {
        SnapshotTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| {
                    columns
                        .iter()
                        .zip(cells.iter())
                        .map(|(c, v)| (c.to_string(), Value::String(v.to_string())))
                        .collect()
                })
                .collect(),
        }
    }

    async fn seed_snapshots(store: &CsvSnapshotStore) {
        store
            .save_table(
                &ObjectType::new("Account"),
                &table(
                    &["Id", "Name"],
                    &[
                        &["001SRCA00000001AAA", "Acme"],
                        &["001SRCB00000001AAA", "Globex"],
                    ],
                ),
            )
            .await
            .unwrap();
        store
            .save_table(
                &ObjectType::new("Opportunity"),
                &table(
                    &["Id", "Name", "StageName", "CloseDate", "AccountId"],
                    &[&[
                        "006SRCA00000001AAA",
                        "Big Deal",
                        "Prospecting",
                        "2026-01-01",
                        "001SRCA00000001AAA",
                    ]],
                ),
            )
            .await
            .unwrap();
        store
            .save_table(
                &ObjectType::new("Task"),
                &table(
                    &["Id", "Subject", "WhatId"],
                    &[
                        &["00TSRCA00000001AAA", "Call", "001SRCA00000001AAA"],
                        &["00TSRCB00000001AAA", "Email", "006SRCA00000001AAA"],
                    ],
                ),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_run_inserts_then_reconciles_real_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvSnapshotStore::new(dir.path()));
        let platform = test_platform().await;
        seed_snapshots(store.as_ref()).await;

        let engine = MigrationEngine::new(
            Arc::new(platform.clone()),
            store.clone(),
            test_config(),
        )
        .unwrap();

        let report = engine.run(RunMode::All { reconcile: true }).await.unwrap();
        assert_eq!(report.objects.len(), 3);
        assert!(report.objects.iter().all(|o| o.skipped.is_none()));
        assert_eq!(report.objects[0].created, 2);

        // Insert pass pointed references at defaults; reconciliation must
        // rewrite them to the real new ids.
        let account_map = store
            .load_id_map(&ObjectType::new("Account"))
            .await
            .unwrap();
        let new_acme = Value::String(account_map["001SRCA00000001AAA"].clone());

        let updates = platform.applied_updates().await;
        let task_updates: Vec<_> = updates
            .iter()
            .filter(|(o, _)| o.as_str() == "Task")
            .collect();
        assert_eq!(task_updates.len(), 2);
        assert!(task_updates
            .iter()
            .any(|(_, u)| u.fields.get("WhatId") == Some(&new_acme)));

        let opp_updates: Vec<_> = updates
            .iter()
            .filter(|(o, _)| o.as_str() == "Opportunity")
            .collect();
        assert_eq!(opp_updates.len(), 1);
        assert_eq!(opp_updates[0].1.fields["AccountId"], new_acme);
    }

    #[tokio::test]
    async fn missing_snapshot_skips_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvSnapshotStore::new(dir.path()));
        let platform = test_platform().await;
        // Only Account has a snapshot.
        store
            .save_table(
                &ObjectType::new("Account"),
                &table(&["Id", "Name"], &[&["001SRCA00000001AAA", "Acme"]]),
            )
            .await
            .unwrap();

        let engine =
            MigrationEngine::new(Arc::new(platform), store.clone(), test_config()).unwrap();
        let report = engine.run(RunMode::All { reconcile: false }).await.unwrap();

        assert_eq!(report.objects[0].created, 1);
        assert!(report.objects[1].skipped.is_some());
        assert!(report.objects[2].skipped.is_some());
    }

    #[tokio::test]
    async fn unknown_object_type_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvSnapshotStore::new(dir.path()));
        let platform = test_platform().await;
        let engine =
            MigrationEngine::new(Arc::new(platform), store, test_config()).unwrap();

        let err = engine
            .run(RunMode::Object(ObjectType::new("Nonexistent__c")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_parent_never_leaves_dangling_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvSnapshotStore::new(dir.path()));
        let platform = test_platform().await;
        seed_snapshots(store.as_ref()).await;
        // Every Account create fails, including the default record.
        platform.fail_creates_where("Name", json!("Acme")).await;
        platform.fail_creates_where("Name", json!("Globex")).await;
        platform
            .fail_creates_where("Name", json!("Unassigned Account"))
            .await;

        let engine = MigrationEngine::new(
            Arc::new(platform.clone()),
            store.clone(),
            test_config(),
        )
        .unwrap();
        let report = engine.run(RunMode::All { reconcile: true }).await.unwrap();

        assert_eq!(report.objects[0].created, 0);
        // The opportunity still inserted; its AccountId was cleared, not
        // left pointing at a source-org id.
        let opps = platform
            .created_records(&ObjectType::new("Opportunity"))
            .await;
        let migrated: Vec<_> = opps
            .iter()
            .filter(|(_, f)| f.get("Name") == Some(&json!("Big Deal")))
            .collect();
        assert_eq!(migrated.len(), 1);
        let account_ref = migrated[0].1.get("AccountId");
        assert!(account_ref.is_none() || account_ref.is_some_and(|v| crate::models::is_blank(v)));
    }

    #[tokio::test]
    async fn reconcile_only_mode_runs_from_persisted_maps() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvSnapshotStore::new(dir.path()));
        let platform = test_platform().await;
        seed_snapshots(store.as_ref()).await;

        let engine = MigrationEngine::new(
            Arc::new(platform.clone()),
            store.clone(),
            test_config(),
        )
        .unwrap();
        engine.run(RunMode::All { reconcile: false }).await.unwrap();
        let before = platform.applied_updates().await.len();
        assert_eq!(before, 0);

        let report = engine.run(RunMode::ReconcileOnly).await.unwrap();
        assert!(report.objects.is_empty());
        assert!(report
            .reconciliation
            .iter()
            .any(|r| r.applied > 0));
        assert!(!platform.applied_updates().await.is_empty());
    }
}

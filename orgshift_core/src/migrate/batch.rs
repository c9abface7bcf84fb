//! Batch submission with two-tier fallback.
//!
//! One `SubmitStrategy` interface, two implementations: `BulkSubmit` sends a
//! whole chunk in one platform call; `SerialSubmit` issues one call per
//! record and never fails wholesale. The `BatchExecutor` supervises: chunks
//! at the platform limit, attempts bulk first, and reruns a chunk serially
//! when the bulk call fails at the batch level. Outcomes stay order-aligned
//! with the input throughout, and each chunk is an independent unit: a
//! failure in chunk N never rolls back or skips chunk N+1.

use crate::models::{IdMap, ObjectType, Record, SaveOutcome, UpdateSpec};
use crate::platform::Platform;
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

#[async_trait]
pub trait SubmitStrategy: Send + Sync {
    async fn submit_insert(
        &self,
        object: &ObjectType,
        batch: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>>;

    async fn submit_update(
        &self,
        object: &ObjectType,
        batch: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>>;
}

pub struct BulkSubmit {
    platform: Arc<dyn Platform>,
}

impl BulkSubmit {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl SubmitStrategy for BulkSubmit {
    async fn submit_insert(
        &self,
        object: &ObjectType,
        batch: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>> {
        self.platform.bulk_create(object, batch).await
    }

    async fn submit_update(
        &self,
        object: &ObjectType,
        batch: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>> {
        self.platform.bulk_update(object, batch).await
    }
}

pub struct SerialSubmit {
    platform: Arc<dyn Platform>,
}

impl SerialSubmit {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    fn outcome_from_error(e: &crate::Error) -> SaveOutcome {
        SaveOutcome::failed("REQUEST_FAILED", e.to_string())
    }
}

#[async_trait]
impl SubmitStrategy for SerialSubmit {
    async fn submit_insert(
        &self,
        object: &ObjectType,
        batch: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>> {
        let mut out = Vec::with_capacity(batch.len());
        for fields in batch {
            match self.platform.create(object, fields).await {
                Ok(outcome) => out.push(outcome),
                Err(e) => out.push(Self::outcome_from_error(&e)),
            }
        }
        Ok(out)
    }

    async fn submit_update(
        &self,
        object: &ObjectType,
        batch: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>> {
        let mut out = Vec::with_capacity(batch.len());
        for update in batch {
            match self.platform.update(object, update).await {
                Ok(outcome) => out.push(outcome),
                Err(e) => out.push(Self::outcome_from_error(&e)),
            }
        }
        Ok(out)
    }
}

pub struct BatchExecutor {
    bulk: BulkSubmit,
    serial: SerialSubmit,
    batch_size: usize,
}

impl BatchExecutor {
    pub fn new(platform: Arc<dyn Platform>, batch_size: usize) -> Self {
        Self {
            bulk: BulkSubmit::new(platform.clone()),
            serial: SerialSubmit::new(platform),
            batch_size,
        }
    }

    /// Create records, one outcome per input record in input order.
    #[tracing::instrument(level = "info", skip_all, fields(object = %object, records = records.len()))]
    pub async fn insert(&self, object: &ObjectType, records: &[Record]) -> Vec<SaveOutcome> {
        let payloads: Vec<Map<String, Value>> =
            records.iter().map(|r| r.fields.clone()).collect();
        let mut outcomes = Vec::with_capacity(records.len());
        for chunk in payloads.chunks(self.batch_size.max(1)) {
            match self.bulk.submit_insert(object, chunk).await {
                Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                Err(e) => {
                    tracing::warn!(
                        object = %object,
                        error = %e,
                        "bulk create failed at batch level; retrying records serially"
                    );
                    match self.serial.submit_insert(object, chunk).await {
                        Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                        // SerialSubmit is infallible by construction.
                        Err(e) => {
                            outcomes.extend(
                                chunk.iter().map(|_| SerialSubmit::outcome_from_error(&e)),
                            );
                        }
                    }
                }
            }
        }
        outcomes
    }

    /// Apply reconciliation updates with the same chunking and fallback
    /// contract as `insert`.
    #[tracing::instrument(level = "info", skip_all, fields(object = %object, updates = updates.len()))]
    pub async fn update(&self, object: &ObjectType, updates: &[UpdateSpec]) -> Vec<SaveOutcome> {
        let mut outcomes = Vec::with_capacity(updates.len());
        for chunk in updates.chunks(self.batch_size.max(1)) {
            match self.bulk.submit_update(object, chunk).await {
                Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                Err(e) => {
                    tracing::warn!(
                        object = %object,
                        error = %e,
                        "bulk update failed at batch level; retrying records serially"
                    );
                    match self.serial.submit_update(object, chunk).await {
                        Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                        Err(e) => {
                            outcomes.extend(
                                chunk.iter().map(|_| SerialSubmit::outcome_from_error(&e)),
                            );
                        }
                    }
                }
            }
        }
        outcomes
    }
}

/// Zip original ids with outcomes: only successes enter the id map, and
/// every failure is logged with its code, message, and offending fields.
pub fn build_id_map(object: &ObjectType, records: &[Record], outcomes: &[SaveOutcome]) -> IdMap {
    debug_assert_eq!(records.len(), outcomes.len());
    let mut map = IdMap::new();
    for (record, outcome) in records.iter().zip(outcomes) {
        if outcome.success {
            if let Some(new_id) = &outcome.id {
                map.insert(record.original_id.clone(), new_id.clone());
            }
        } else {
            for err in &outcome.errors {
                tracing::warn!(
                    object = %object,
                    original_id = %record.original_id,
                    code = %err.status_code,
                    message = %err.message,
                    fields = ?err.fields,
                    "record failed to create"
                );
            }
        }
    }
    map
}

//! Remote platform contract.
//!
//! Concrete connectors live in `orgshift_integrations`; `memory` provides an
//! in-process backend for local development and unit tests.

pub mod memory;

use crate::models::{ObjectMeta, ObjectType, SaveOutcome, UpdateSpec};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// The destination org. All calls are request/response; no streaming.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Field metadata for one object type.
    async fn describe(&self, object: &ObjectType) -> Result<ObjectMeta>;

    /// Create a single record.
    async fn create(&self, object: &ObjectType, fields: &Map<String, Value>)
        -> Result<SaveOutcome>;

    /// Update a single record.
    async fn update(&self, object: &ObjectType, update: &UpdateSpec) -> Result<SaveOutcome>;

    /// Create up to the platform batch limit of records in one call.
    /// Outcomes are order-aligned with the input; an `Err` is a batch-level
    /// failure and says nothing about individual records.
    async fn bulk_create(
        &self,
        object: &ObjectType,
        records: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>>;

    /// Update up to the platform batch limit of records in one call, with
    /// the same alignment contract as `bulk_create`.
    async fn bulk_update(
        &self,
        object: &ObjectType,
        updates: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>>;

    /// Run a SOQL-style query, returning one field map per row.
    async fn query(&self, soql: &str) -> Result<Vec<Map<String, Value>>>;

    /// Which of the given ids exist on the destination org.
    async fn query_existing_ids(
        &self,
        object: &ObjectType,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
        let soql = format!(
            "SELECT Id FROM {} WHERE Id IN ({})",
            object,
            quoted.join(",")
        );
        let rows = self.query(&soql).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("Id").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

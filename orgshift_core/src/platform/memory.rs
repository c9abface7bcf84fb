//! In-memory Platform for local development and unit tests.
//!
//! Assigns sequential 18-character ids using each object type's registered
//! key prefix. Failure injection covers the three paths the pipeline cares
//! about: per-record create failures, batch-level bulk failures (forcing the
//! serial fallback), and describe failures (forcing degraded sanitization).

use crate::models::{
    is_blank, scalar_eq, FieldDescriptor, ObjectMeta, ObjectType, SaveOutcome, UpdateSpec,
};
use crate::platform::Platform;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    metadata: HashMap<ObjectType, ObjectMeta>,
    key_prefixes: HashMap<ObjectType, String>,
    created: HashMap<ObjectType, Vec<(String, Map<String, Value>)>>,
    updates: Vec<(ObjectType, UpdateSpec)>,
    existing_ids: HashSet<String>,
    fail_creates: Vec<(String, Value)>,
    fail_bulk: HashSet<ObjectType>,
    fail_describe: HashSet<ObjectType>,
    fail_query: bool,
    describe_calls: HashMap<ObjectType, u64>,
    next_seq: u64,
}

#[derive(Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<State>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata for an object type along with the 3-character key
    /// prefix used when minting ids for it.
    pub async fn register_object(&self, meta: ObjectMeta, key_prefix: &str) {
        let mut st = self.state.lock().await;
        st.key_prefixes
            .insert(meta.object.clone(), key_prefix.to_string());
        st.metadata.insert(meta.object.clone(), meta);
    }

    /// Mark ids as already existing, for reference-existence queries.
    pub async fn seed_existing(&self, ids: impl IntoIterator<Item = String>) {
        let mut st = self.state.lock().await;
        st.existing_ids.extend(ids);
    }

    /// Fail any create whose payload carries `field == value`.
    pub async fn fail_creates_where(&self, field: &str, value: Value) {
        self.state
            .lock()
            .await
            .fail_creates
            .push((field.to_string(), value));
    }

    /// Make `bulk_create` fail wholesale for the object type. Serial creates
    /// still work, so the fallback path is observable.
    pub async fn fail_bulk(&self, object: &ObjectType) {
        self.state.lock().await.fail_bulk.insert(object.clone());
    }

    pub async fn fail_describe(&self, object: &ObjectType) {
        self.state.lock().await.fail_describe.insert(object.clone());
    }

    pub async fn fail_queries(&self) {
        self.state.lock().await.fail_query = true;
    }

    /// Snapshot of records created for an object type (primarily for tests).
    pub async fn created_records(&self, object: &ObjectType) -> Vec<(String, Map<String, Value>)> {
        self.state
            .lock()
            .await
            .created
            .get(object)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of applied updates, in application order.
    pub async fn applied_updates(&self) -> Vec<(ObjectType, UpdateSpec)> {
        self.state.lock().await.updates.clone()
    }

    pub async fn describe_count(&self, object: &ObjectType) -> u64 {
        self.state
            .lock()
            .await
            .describe_calls
            .get(object)
            .copied()
            .unwrap_or(0)
    }

    fn mint_id(st: &mut State, object: &ObjectType) -> String {
        let prefix = st
            .key_prefixes
            .get(object)
            .cloned()
            .unwrap_or_else(|| "a00".to_string());
        st.next_seq += 1;
        format!("{prefix}{:015}", st.next_seq)
    }

    fn create_in(st: &mut State, object: &ObjectType, fields: &Map<String, Value>) -> SaveOutcome {
        for (field, value) in &st.fail_creates {
            if fields.get(field).is_some_and(|v| scalar_eq(v, value)) {
                return SaveOutcome::failed(
                    "FIELD_CUSTOM_VALIDATION_EXCEPTION",
                    format!("rejected by rule on {field}"),
                );
            }
        }
        for value in fields.values() {
            if let Value::String(s) = value {
                if !is_blank(value) && looks_like_id(s) && !st.existing_ids.contains(s.as_str()) {
                    return SaveOutcome::failed(
                        "INVALID_CROSS_REFERENCE_KEY",
                        format!("invalid reference id {s}"),
                    );
                }
            }
        }
        let id = Self::mint_id(st, object);
        st.existing_ids.insert(id.clone());
        st.created
            .entry(object.clone())
            .or_default()
            .push((id.clone(), fields.clone()));
        SaveOutcome::created(id)
    }
}

/// Heuristic mirror of the platform's id shape: 15 or 18 alphanumeric
/// characters starting with a digit-zero pair, enough to distinguish ids
/// from names and picklist values in test payloads.
fn looks_like_id(s: &str) -> bool {
    let s = s.trim();
    (s.len() == 15 || s.len() == 18) && s.starts_with("00") && s.chars().all(char::is_alphanumeric)
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn describe(&self, object: &ObjectType) -> Result<ObjectMeta> {
        let mut st = self.state.lock().await;
        *st.describe_calls.entry(object.clone()).or_insert(0) += 1;
        if st.fail_describe.contains(object) {
            return Err(Error::BackendMessage(format!(
                "describe unavailable for {object}"
            )));
        }
        st.metadata
            .get(object)
            .cloned()
            .ok_or_else(|| Error::BackendMessage(format!("no such object: {object}")))
    }

    async fn create(
        &self,
        object: &ObjectType,
        fields: &Map<String, Value>,
    ) -> Result<SaveOutcome> {
        let mut st = self.state.lock().await;
        Ok(Self::create_in(&mut st, object, fields))
    }

    async fn update(&self, object: &ObjectType, update: &UpdateSpec) -> Result<SaveOutcome> {
        let mut st = self.state.lock().await;
        if !st.existing_ids.contains(&update.id) {
            return Ok(SaveOutcome::failed(
                "ENTITY_IS_DELETED",
                format!("no record {}", update.id),
            ));
        }
        st.updates.push((object.clone(), update.clone()));
        Ok(SaveOutcome {
            success: true,
            id: Some(update.id.clone()),
            errors: Vec::new(),
        })
    }

    async fn bulk_create(
        &self,
        object: &ObjectType,
        records: &[Map<String, Value>],
    ) -> Result<Vec<SaveOutcome>> {
        let mut st = self.state.lock().await;
        if st.fail_bulk.contains(object) {
            return Err(Error::BackendMessage(format!(
                "bulk endpoint unavailable for {object}"
            )));
        }
        Ok(records
            .iter()
            .map(|r| Self::create_in(&mut st, object, r))
            .collect())
    }

    async fn bulk_update(
        &self,
        object: &ObjectType,
        updates: &[UpdateSpec],
    ) -> Result<Vec<SaveOutcome>> {
        let mut out = Vec::with_capacity(updates.len());
        for u in updates {
            out.push(self.update(object, u).await?);
        }
        Ok(out)
    }

    async fn query(&self, _soql: &str) -> Result<Vec<Map<String, Value>>> {
        Err(Error::BackendMessage(
            "memory platform does not parse SOQL; use query_existing_ids".to_string(),
        ))
    }

    async fn query_existing_ids(
        &self,
        _object: &ObjectType,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        let st = self.state.lock().await;
        if st.fail_query {
            return Err(Error::BackendMessage("query unavailable".to_string()));
        }
        Ok(ids
            .iter()
            .filter(|id| st.existing_ids.contains(id.as_str()))
            .cloned()
            .collect())
    }
}

/// Build an `ObjectMeta` from `(name, kind, createable, updateable,
/// calculated, reference_to)` tuples; shared by tests across the crate.
pub fn meta_from_fields(
    object: &str,
    fields: &[(&str, crate::models::FieldKind, bool, bool, bool, &[&str])],
) -> ObjectMeta {
    ObjectMeta {
        object: ObjectType::new(object),
        fields: fields
            .iter()
            .map(
                |(name, kind, createable, updateable, calculated, refs)| FieldDescriptor {
                    name: name.to_string(),
                    kind: *kind,
                    createable: *createable,
                    updateable: *updateable,
                    calculated: *calculated,
                    reference_to: refs.iter().map(|r| ObjectType::new(*r)).collect(),
                },
            )
            .collect(),
    }
}

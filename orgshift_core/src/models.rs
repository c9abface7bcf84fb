//! Shared data model: object types, field metadata, records, id maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// API name of an object type on the remote platform (e.g. `Account`,
/// `Apart__c`). Comparison is case-sensitive, matching the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType(pub String);

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Scalar kind of a field, as reported by the platform's describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Id,
    String,
    Textarea,
    Phone,
    Email,
    Url,
    Picklist,
    Multipicklist,
    Int,
    Double,
    Currency,
    Percent,
    Date,
    Datetime,
    Time,
    Boolean,
    Reference,
    #[serde(other)]
    Other,
}

impl FieldKind {
    /// The wire spelling, as used in exported field listings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::String => "string",
            Self::Textarea => "textarea",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Url => "url",
            Self::Picklist => "picklist",
            Self::Multipicklist => "multipicklist",
            Self::Int => "int",
            Self::Double => "double",
            Self::Currency => "currency",
            Self::Percent => "percent",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Time => "time",
            Self::Boolean => "boolean",
            Self::Reference => "reference",
            Self::Other => "other",
        }
    }

    /// Kinds whose values are free-form text and subject to numeric-corruption
    /// repair after a snapshot round trip.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::String | Self::Textarea | Self::Phone | Self::Email | Self::Url | Self::Picklist
        )
    }
}

/// One field descriptor from the platform's describe response.
///
/// The serde attribute names mirror the wire format so connectors can
/// deserialize describe payloads directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub createable: bool,
    pub updateable: bool,
    pub calculated: bool,
    #[serde(rename = "referenceTo", default)]
    pub reference_to: Vec<ObjectType>,
}

impl FieldDescriptor {
    pub fn is_reference(&self) -> bool {
        self.kind == FieldKind::Reference && !self.reference_to.is_empty()
    }

    /// More than one reference target means the field is structurally
    /// polymorphic; name-designated polymorphic fields are configured
    /// separately.
    pub fn is_polymorphic(&self) -> bool {
        self.reference_to.len() > 1
    }
}

/// Field descriptors for one object type, fetched once per process run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub object: ObjectType,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectMeta {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Reference fields that are writable on create.
    pub fn createable_references(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.is_reference() && f.createable)
    }

    /// Reference fields that can be rewritten after insert.
    pub fn updateable_references(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.is_reference() && f.updateable)
    }
}

/// One row read from a snapshot table, keyed by its identifier in the source
/// org. Pipeline stages never mutate a record in place; each transform
/// returns new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub original_id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(original_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            original_id: original_id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Blank means "no reference": JSON null, the empty string, or whitespace.
/// Blank values pass through every pipeline stage untouched.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Scalar equality as the snapshot sees it: everything compares through its
/// string rendering, since CSV round trips erase JSON types.
pub fn scalar_eq(a: &Value, b: &Value) -> bool {
    scalar_string(a) == scalar_string(b)
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Per-record error detail from a create or update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveError {
    #[serde(alias = "errorCode", rename = "statusCode")]
    pub status_code: String,
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Outcome of creating or updating one record, order-aligned with the input
/// batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub errors: Vec<SaveError>,
}

impl SaveOutcome {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            errors: Vec::new(),
        }
    }

    pub fn failed(status_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            errors: vec![SaveError {
                status_code: status_code.into(),
                message: message.into(),
                fields: Vec::new(),
            }],
        }
    }
}

/// One pending field rewrite for an already-created record.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    /// Identifier of the record in the destination org.
    pub id: String,
    pub fields: Map<String, Value>,
}

impl UpdateSpec {
    pub fn single(id: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(field.into(), value);
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Source-org id to destination-org id, for one object type. Contains only
/// records whose create call succeeded; a missing entry means "not created",
/// which callers treat as "skip", never as an error.
pub type IdMap = HashMap<String, String>;

/// The accumulated id maps of a run, one per object type.
#[derive(Debug, Clone, Default)]
pub struct IdMaps {
    inner: HashMap<ObjectType, IdMap>,
}

impl IdMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ObjectType, map: IdMap) {
        self.inner.insert(object, map);
    }

    pub fn get(&self, object: &ObjectType) -> Option<&IdMap> {
        self.inner.get(object)
    }

    /// Translate an original id for the given object type.
    pub fn new_id(&self, object: &ObjectType, original_id: &str) -> Option<&str> {
        self.inner
            .get(object)?
            .get(original_id)
            .map(String::as_str)
    }

    pub fn contains(&self, object: &ObjectType) -> bool {
        self.inner.contains_key(object)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

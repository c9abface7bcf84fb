//! Declarative migration configuration.
//!
//! Everything the pipeline special-cases lives here as data: the import
//! order, the polymorphic field pairs and their key-prefix table, the
//! default fallback records, and the sanitizer's keep/subtype/exclusion
//! tables. The built-in `Default` carries the standard org layout; a YAML
//! file can override any of it.

use crate::models::ObjectType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A `{object, field}` pair used by the sanitizer's tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub object: ObjectType,
    pub field: String,
}

impl FieldRef {
    pub fn new(object: impl Into<ObjectType>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: field.into(),
        }
    }

    pub fn matches(&self, object: &ObjectType, field: &str) -> bool {
        &self.object == object && self.field == field
    }
}

/// A reference field whose target type is decided by the value's key prefix,
/// not by field metadata (the existing value's type, not the schema,
/// captures intent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicField {
    pub object: ObjectType,
    pub field: String,
}

/// Field removal driven by a non-writable flag on the row itself, e.g.
/// person accounts cannot take a `Name` on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeRule {
    pub object: ObjectType,
    /// Flag field kept through sanitization solely to drive this rule.
    pub flag_field: String,
    /// Fields removed from rows where the flag is set.
    pub drop_fields: Vec<String>,
}

/// Injects an already-provisioned parent default id into a child default
/// record before it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentLink {
    pub field: String,
    pub parent: ObjectType,
}

/// One fallback record, created once per insert run, whose id backfills
/// references that would otherwise point at records never migrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRecordSpec {
    pub object: ObjectType,
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub parent_links: Vec<ParentLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Total order over object types, parents before children. No object
    /// references a type after its own position, except self/forward
    /// references that only the reconciliation pass rewrites.
    pub import_order: Vec<ObjectType>,

    /// Key prefix (first 3 id characters) to target object type.
    pub prefix_table: BTreeMap<String, ObjectType>,

    /// Fields resolved through the prefix table instead of metadata.
    pub polymorphic_fields: Vec<PolymorphicField>,

    /// Fallback records, in creation order (parents first).
    pub defaults: Vec<DefaultRecordSpec>,

    /// Non-writable fields the sanitizer keeps anyway because later logic
    /// needs them (identity-discriminating flags).
    pub keep_fields: Vec<FieldRef>,

    /// Flag-driven per-row field removals.
    pub subtype_rules: Vec<SubtypeRule>,

    /// Unconditional per-object field removals, applied last.
    pub excluded_fields: Vec<FieldRef>,

    /// Batch size for bulk create/update calls (platform limit 200).
    pub batch_size: usize,

    /// Distinct values sampled per reference field and target when checking
    /// existence in the destination org.
    pub validation_sample_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        let obj = |s: &str| ObjectType::new(s);
        let fields = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect::<Map<String, Value>>()
        };

        Self {
            import_order: [
                "Account",
                "Lead",
                "Task",
                "Opportunity",
                "Apart__c",
                "Room__c",
                "Buyer__c",
                "Transcript__c",
                "MP_Action__c",
                "OpportunityLog__c",
                "ValuationLog__c",
            ]
            .into_iter()
            .map(ObjectType::new)
            .collect(),

            prefix_table: BTreeMap::from([
                ("001".to_string(), obj("Account")),
                ("006".to_string(), obj("Opportunity")),
                ("00Q".to_string(), obj("Lead")),
            ]),

            polymorphic_fields: vec![
                PolymorphicField {
                    object: obj("Task"),
                    field: "WhoId".to_string(),
                },
                PolymorphicField {
                    object: obj("Task"),
                    field: "WhatId".to_string(),
                },
            ],

            defaults: vec![
                DefaultRecordSpec {
                    object: obj("Account"),
                    fields: fields(&[("Name", "Unassigned Account")]),
                    parent_links: vec![],
                },
                DefaultRecordSpec {
                    object: obj("Lead"),
                    fields: fields(&[
                        ("LastName", "Unassigned"),
                        ("Company", "Unassigned"),
                        ("Status", "Open - Not Contacted"),
                    ]),
                    parent_links: vec![],
                },
                DefaultRecordSpec {
                    object: obj("Opportunity"),
                    fields: fields(&[
                        ("Name", "Unassigned Opportunity"),
                        ("StageName", "Prospecting"),
                        ("CloseDate", "2030-01-01"),
                    ]),
                    parent_links: vec![],
                },
                DefaultRecordSpec {
                    object: obj("Apart__c"),
                    fields: fields(&[("Name", "Unassigned Apart")]),
                    parent_links: vec![],
                },
                DefaultRecordSpec {
                    object: obj("Room__c"),
                    fields: fields(&[("Name", "Unassigned Room")]),
                    parent_links: vec![ParentLink {
                        field: "Apart__c".to_string(),
                        parent: obj("Apart__c"),
                    }],
                },
                DefaultRecordSpec {
                    object: obj("Buyer__c"),
                    fields: fields(&[("Name", "Unassigned Buyer")]),
                    parent_links: vec![],
                },
            ],

            keep_fields: vec![FieldRef {
                object: obj("Account"),
                field: "IsPersonAccount".to_string(),
            }],

            subtype_rules: vec![SubtypeRule {
                object: obj("Account"),
                flag_field: "IsPersonAccount".to_string(),
                drop_fields: vec!["Name".to_string()],
            }],

            excluded_fields: vec![
                FieldRef {
                    object: obj("Account"),
                    field: "CleanStatus".to_string(),
                },
                FieldRef {
                    object: obj("Lead"),
                    field: "CleanStatus".to_string(),
                },
            ],

            batch_size: 200,
            validation_sample_size: 5,
        }
    }
}

impl MigrationConfig {
    /// Load a YAML override file. Missing keys fall back to the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::backend("read migration config", e))?;
        let cfg: Self =
            serde_yaml::from_str(&raw).map_err(|e| Error::backend("parse migration config", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.import_order.is_empty() {
            return Err(Error::InvalidInput("import order is empty".to_string()));
        }
        if self.batch_size == 0 || self.batch_size > 200 {
            return Err(Error::InvalidInput(format!(
                "batch size must be 1..=200, got {}",
                self.batch_size
            )));
        }
        for prefix in self.prefix_table.keys() {
            if prefix.len() != 3 {
                return Err(Error::InvalidInput(format!(
                    "key prefix must be 3 characters: {prefix:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn contains_object(&self, object: &ObjectType) -> bool {
        self.import_order.contains(object)
    }

    pub fn is_polymorphic(&self, object: &ObjectType, field: &str) -> bool {
        self.polymorphic_fields
            .iter()
            .any(|p| &p.object == object && p.field == field)
    }

    /// Infer the target object type of an id value from its first three
    /// characters. `None` when the value is too short or the prefix is not
    /// in the table.
    pub fn prefix_target(&self, value: &str) -> Option<&ObjectType> {
        let v = value.trim();
        self.prefix_table.get(v.get(..3)?)
    }

    pub fn default_spec(&self, object: &ObjectType) -> Option<&DefaultRecordSpec> {
        self.defaults.iter().find(|d| &d.object == object)
    }

    pub fn is_kept(&self, object: &ObjectType, field: &str) -> bool {
        self.keep_fields.iter().any(|k| k.matches(object, field))
    }

    pub fn is_excluded(&self, object: &ObjectType, field: &str) -> bool {
        self.excluded_fields
            .iter()
            .any(|k| k.matches(object, field))
    }

    pub fn subtype_rules_for<'a>(
        &'a self,
        object: &'a ObjectType,
    ) -> impl Iterator<Item = &'a SubtypeRule> {
        self.subtype_rules
            .iter()
            .filter(move |r| &r.object == object)
    }
}

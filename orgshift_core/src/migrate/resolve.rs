//! Lookup resolution, in two modes.
//!
//! Pre-insert: every writable reference still points into the source org, so
//! non-blank values are replaced with the target type's default fallback id,
//! or cleared when no fallback exists. Id maps are never consulted here;
//! most types have not been inserted yet.
//!
//! Reconciliation: after all inserts, rewrite every updateable reference on
//! every created record through the accumulated id maps. Unmapped values are
//! skipped with a warning, never written stale.
//!
//! Polymorphic fields (`Task.WhoId`, `Task.WhatId` by default) resolve their
//! target from the value's 3-character key prefix: the existing value's
//! type, not field metadata, captures intent. The prefix table is
//! configuration; values with a prefix outside it are flagged for operator
//! review, not silently dropped.

use crate::config::MigrationConfig;
use crate::models::{is_blank, IdMaps, ObjectMeta, ObjectType, Record, UpdateSpec};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Replace writable references with default fallback ids (or clear them).
///
/// Blank values pass through untouched. Without metadata only the
/// configured polymorphic fields are processed; plain reference fields
/// cannot be identified by name alone.
pub fn substitute_defaults(
    object: &ObjectType,
    records: Vec<Record>,
    defaults: &HashMap<ObjectType, String>,
    meta: Option<&ObjectMeta>,
    config: &MigrationConfig,
) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            let field_names: Vec<String> = record.fields.keys().cloned().collect();
            for field in field_names {
                let is_poly = config.is_polymorphic(object, &field);
                let desc = meta.and_then(|m| m.field(&field));
                let is_plain_ref = desc.is_some_and(|d| d.is_reference() && d.createable);
                if !is_poly && !is_plain_ref {
                    continue;
                }

                let value = record.fields.get(&field).cloned().unwrap_or(Value::Null);
                if is_blank(&value) {
                    continue;
                }

                let replacement = if is_poly {
                    resolve_polymorphic_default(object, &field, &value, defaults, config)
                } else {
                    // First declared target with a provisioned fallback wins.
                    desc.and_then(|d| {
                        d.reference_to
                            .iter()
                            .find_map(|target| defaults.get(target))
                    })
                    .cloned()
                };

                match replacement {
                    Some(id) => {
                        record.fields.insert(field, Value::String(id));
                    }
                    None => {
                        record.fields.insert(field, Value::Null);
                    }
                }
            }
            record
        })
        .collect()
}

fn resolve_polymorphic_default(
    object: &ObjectType,
    field: &str,
    value: &Value,
    defaults: &HashMap<ObjectType, String>,
    config: &MigrationConfig,
) -> Option<String> {
    let raw = value.as_str()?;
    match config.prefix_target(raw) {
        Some(target) => defaults.get(target).cloned(),
        None => {
            tracing::warn!(
                object = %object,
                field = %field,
                prefix = raw.trim().get(..3).unwrap_or(raw),
                "id prefix not in table; clearing value (extend prefix_table if intended)"
            );
            None
        }
    }
}

/// One batch group of pending rewrites: a single field, a single referenced
/// object type. A polymorphic field produces one group per inferred target.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateGroup {
    pub object: ObjectType,
    pub field: String,
    pub target: ObjectType,
    pub updates: Vec<UpdateSpec>,
}

/// Plan the reconciliation updates for one object type.
///
/// Pure planning: the caller submits each group through the batch executor.
/// Running the plan twice with the same maps queues identical values, so
/// reconciliation is idempotent.
pub fn plan_reconciliation(
    object: &ObjectType,
    records: &[Record],
    id_maps: &IdMaps,
    meta: &ObjectMeta,
    config: &MigrationConfig,
) -> Vec<UpdateGroup> {
    let mut groups: BTreeMap<(String, ObjectType), Vec<UpdateSpec>> = BTreeMap::new();

    let fields: Vec<_> = meta.updateable_references().collect();

    for record in records {
        let Some(own_new_id) = id_maps.new_id(object, &record.original_id) else {
            // Not created (or its create failed): nothing to rewrite.
            continue;
        };

        for desc in &fields {
            let Some(value) = record.get(&desc.name) else {
                continue;
            };
            if is_blank(value) {
                continue;
            }
            let Some(original_ref) = value.as_str() else {
                continue;
            };

            let resolved = if config.is_polymorphic(object, &desc.name) {
                match config.prefix_target(original_ref) {
                    Some(target) => id_maps
                        .new_id(target, original_ref)
                        .map(|new| (target.clone(), new.to_string()))
                        .or_else(|| {
                            tracing::warn!(
                                object = %object,
                                field = %desc.name,
                                original = %original_ref,
                                target = %target,
                                "original reference not in id map; skipping rewrite"
                            );
                            None
                        }),
                    None => {
                        tracing::warn!(
                            object = %object,
                            field = %desc.name,
                            original = %original_ref,
                            "id prefix not in table; skipping rewrite (extend prefix_table if intended)"
                        );
                        None
                    }
                }
            } else {
                // Targets are tried in declaration order; the first id map
                // containing the value wins.
                let hit = desc.reference_to.iter().find_map(|target| {
                    id_maps
                        .new_id(target, original_ref)
                        .map(|new| (target.clone(), new.to_string()))
                });
                if hit.is_none() {
                    tracing::warn!(
                        object = %object,
                        field = %desc.name,
                        original = %original_ref,
                        "original reference not in any id map; skipping rewrite"
                    );
                }
                hit
            };

            if let Some((target, new_ref)) = resolved {
                groups
                    .entry((desc.name.clone(), target))
                    .or_default()
                    .push(UpdateSpec::single(
                        own_new_id,
                        desc.name.clone(),
                        Value::String(new_ref),
                    ));
            }
        }
    }

    groups
        .into_iter()
        .map(|((field, target), updates)| UpdateGroup {
            object: object.clone(),
            field,
            target,
            updates,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldKind, IdMap};
    use crate::platform::memory::meta_from_fields;
    use serde_json::json;

    fn task_meta() -> ObjectMeta {
        meta_from_fields(
            "Task",
            &[
                ("Subject", FieldKind::String, true, true, false, &[]),
                (
                    "WhoId",
                    FieldKind::Reference,
                    true,
                    true,
                    false,
                    &["Contact", "Lead"],
                ),
                (
                    "WhatId",
                    FieldKind::Reference,
                    true,
                    true,
                    false,
                    &["Account", "Opportunity"],
                ),
            ],
        )
    }

    fn record(id: &str, pairs: &[(&str, Value)]) -> Record {
        Record::new(
            id,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn defaults(pairs: &[(&str, &str)]) -> HashMap<ObjectType, String> {
        pairs
            .iter()
            .map(|(o, id)| (ObjectType::new(*o), id.to_string()))
            .collect()
    }

    #[test]
    fn polymorphic_substitution_uses_prefix_not_metadata() {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let defaults = defaults(&[("Account", "001DEF"), ("Lead", "00QDEF")]);

        let records = vec![record(
            "00T1",
            &[
                ("WhatId", json!("001xx0000000001AAA")),
                ("WhoId", json!("00Qxx0000000001AAA")),
            ],
        )];
        let out = substitute_defaults(&task, records, &defaults, Some(&task_meta()), &cfg);
        assert_eq!(out[0].fields["WhatId"], json!("001DEF"));
        assert_eq!(out[0].fields["WhoId"], json!("00QDEF"));
    }

    #[test]
    fn unknown_prefix_is_cleared() {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let defaults = defaults(&[("Account", "001DEF")]);

        let records = vec![record("00T1", &[("WhatId", json!("003xx0000000001AAA"))])];
        let out = substitute_defaults(&task, records, &defaults, Some(&task_meta()), &cfg);
        assert_eq!(out[0].fields["WhatId"], Value::Null);
    }

    #[test]
    fn known_target_without_default_is_cleared() {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let defaults = defaults(&[("Account", "001DEF")]);

        // Opportunity prefix, but no Opportunity default provisioned.
        let records = vec![record("00T1", &[("WhatId", json!("006xx0000000001AAA"))])];
        let out = substitute_defaults(&task, records, &defaults, Some(&task_meta()), &cfg);
        assert_eq!(out[0].fields["WhatId"], Value::Null);
    }

    #[test]
    fn blank_references_pass_through_every_mode() {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let d = defaults(&[("Account", "001DEF")]);

        let records = vec![record(
            "00T1",
            &[("WhatId", json!("")), ("WhoId", Value::Null)],
        )];
        let out = substitute_defaults(&task, records, &d, Some(&task_meta()), &cfg);
        assert_eq!(out[0].fields["WhatId"], json!(""));
        assert_eq!(out[0].fields["WhoId"], Value::Null);

        let mut maps = IdMaps::new();
        let mut tasks = IdMap::new();
        tasks.insert("00T1".to_string(), "00TNEW".to_string());
        maps.insert(task.clone(), tasks);
        let groups = plan_reconciliation(&task, &out, &maps, &task_meta(), &cfg);
        assert!(groups.is_empty());
    }

    #[test]
    fn plain_reference_substitutes_first_target_with_default() {
        let cfg = MigrationConfig::default();
        let opp = ObjectType::new("Opportunity");
        let meta = meta_from_fields(
            "Opportunity",
            &[(
                "AccountId",
                FieldKind::Reference,
                true,
                true,
                false,
                &["Account"],
            )],
        );
        let d = defaults(&[("Account", "001DEF")]);

        // Parent create failed in the source run: the child still must never
        // carry a dangling original id.
        let records = vec![record("006A", &[("AccountId", json!("001DEADBEEF000AAA"))])];
        let out = substitute_defaults(&opp, records, &d, Some(&meta), &cfg);
        assert_eq!(out[0].fields["AccountId"], json!("001DEF"));

        let out = substitute_defaults(
            &opp,
            vec![record("006A", &[("AccountId", json!("001DEADBEEF000AAA"))])],
            &HashMap::new(),
            Some(&meta),
            &cfg,
        );
        assert_eq!(out[0].fields["AccountId"], Value::Null);
    }

    #[test]
    fn degraded_mode_processes_only_polymorphic_fields() {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let d = defaults(&[("Account", "001DEF")]);

        let records = vec![record(
            "00T1",
            &[
                ("WhatId", json!("001xx0000000001AAA")),
                ("AccountId", json!("001xx0000000001AAA")),
            ],
        )];
        let out = substitute_defaults(&task, records, &d, None, &cfg);
        assert_eq!(out[0].fields["WhatId"], json!("001DEF"));
        // Unrecognizable without metadata: left as-is for the validator.
        assert_eq!(out[0].fields["AccountId"], json!("001xx0000000001AAA"));
    }

    fn reconcile_fixture() -> (MigrationConfig, ObjectType, Vec<Record>, IdMaps) {
        let cfg = MigrationConfig::default();
        let task = ObjectType::new("Task");
        let records = vec![
            record(
                "00TA",
                &[
                    ("WhatId", json!("001OLD000000001AAA")),
                    ("WhoId", json!("00QOLD000000001AAA")),
                ],
            ),
            record("00TB", &[("WhatId", json!("006OLD000000001AAA"))]),
            record("00TC", &[("WhatId", json!("001GONE00000001AAA"))]),
        ];

        let mut maps = IdMaps::new();
        maps.insert(
            task.clone(),
            IdMap::from([
                ("00TA".to_string(), "00TNEWA".to_string()),
                ("00TB".to_string(), "00TNEWB".to_string()),
                ("00TC".to_string(), "00TNEWC".to_string()),
            ]),
        );
        maps.insert(
            ObjectType::new("Account"),
            IdMap::from([("001OLD000000001AAA".to_string(), "001NEW".to_string())]),
        );
        maps.insert(
            ObjectType::new("Opportunity"),
            IdMap::from([("006OLD000000001AAA".to_string(), "006NEW".to_string())]),
        );
        maps.insert(
            ObjectType::new("Lead"),
            IdMap::from([("00QOLD000000001AAA".to_string(), "00QNEW".to_string())]),
        );
        (cfg, task, records, maps)
    }

    #[test]
    fn reconciliation_groups_by_field_and_target() {
        let (cfg, task, records, maps) = reconcile_fixture();
        let groups = plan_reconciliation(&task, &records, &maps, &task_meta(), &cfg);

        // WhatId splits per inferred target; the unmapped 001GONE value is
        // skipped entirely.
        assert_eq!(groups.len(), 3);
        let what_account = groups
            .iter()
            .find(|g| g.field == "WhatId" && g.target.as_str() == "Account")
            .unwrap();
        assert_eq!(what_account.updates.len(), 1);
        assert_eq!(what_account.updates[0].id, "00TNEWA");
        assert_eq!(what_account.updates[0].fields["WhatId"], json!("001NEW"));

        let what_opp = groups
            .iter()
            .find(|g| g.field == "WhatId" && g.target.as_str() == "Opportunity")
            .unwrap();
        assert_eq!(what_opp.updates[0].id, "00TNEWB");

        let who_lead = groups
            .iter()
            .find(|g| g.field == "WhoId" && g.target.as_str() == "Lead")
            .unwrap();
        assert_eq!(who_lead.updates[0].fields["WhoId"], json!("00QNEW"));
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let (cfg, task, records, maps) = reconcile_fixture();
        let first = plan_reconciliation(&task, &records, &maps, &task_meta(), &cfg);
        let second = plan_reconciliation(&task, &records, &maps, &task_meta(), &cfg);
        assert_eq!(first, second);
    }

    #[test]
    fn records_without_own_mapping_are_skipped() {
        let (cfg, task, records, _) = reconcile_fixture();
        // No Task map at all: none of the records can be addressed.
        let mut maps = IdMaps::new();
        maps.insert(
            ObjectType::new("Account"),
            IdMap::from([("001OLD000000001AAA".to_string(), "001NEW".to_string())]),
        );
        let groups = plan_reconciliation(&task, &records, &maps, &task_meta(), &cfg);
        assert!(groups.is_empty());
    }
}

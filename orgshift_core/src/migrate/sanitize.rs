//! Record sanitization before insert.
//!
//! Pure transforms only: each pass takes records and returns new ones, never
//! touching the metadata cache or the platform. Order of operations:
//!
//! 1. drop `Id` and fields that are not createable or are calculated,
//!    keeping the configured identity-discriminating flags
//! 2. drop fields absent from current metadata (schema drift)
//! 3. repair float-corrupted text values from the snapshot round trip
//! 4. drop rows that exactly match the configured default record
//! 5. apply flag-driven subtype rules, then consume the flag
//! 6. apply the declarative per-object exclusion table last
//!
//! Without metadata (describe failed) steps 1-3 reduce to dropping `Id`;
//! steps 4-6 still run.

use crate::config::MigrationConfig;
use crate::models::{scalar_eq, ObjectMeta, ObjectType, Record};
use serde_json::{Map, Value};

pub fn sanitize(
    object: &ObjectType,
    records: Vec<Record>,
    meta: Option<&ObjectMeta>,
    config: &MigrationConfig,
) -> Vec<Record> {
    let mut out = Vec::with_capacity(records.len());
    let mut dropped_defaults = 0usize;

    for record in records {
        if matches_default(object, &record.fields, config) {
            dropped_defaults += 1;
            continue;
        }

        let mut fields = Map::with_capacity(record.fields.len());
        for (name, value) in record.fields {
            if name == "Id" || name == "attributes" {
                continue;
            }
            match meta.map(|m| m.field(&name)) {
                // Schema drift: present in the snapshot, gone from the org.
                Some(None) => continue,
                Some(Some(desc)) => {
                    if (!desc.createable || desc.calculated) && !config.is_kept(object, &name) {
                        continue;
                    }
                    let value = if desc.kind.is_text() {
                        repair_text_value(value)
                    } else {
                        value
                    };
                    fields.insert(name, value);
                }
                // Degraded: no metadata, keep the field as-is.
                None => {
                    fields.insert(name, value);
                }
            }
        }

        apply_subtype_rules(object, &mut fields, config);
        fields.retain(|name, _| !config.is_excluded(object, name));

        out.push(Record::new(record.original_id, fields));
    }

    if dropped_defaults > 0 {
        tracing::info!(
            object = %object,
            rows = dropped_defaults,
            "dropped rows matching the pre-seeded default record"
        );
    }
    out
}

/// A row is the default record if every configured default field matches
/// exactly; such rows are provisioned separately and must not be duplicated.
fn matches_default(
    object: &ObjectType,
    fields: &Map<String, Value>,
    config: &MigrationConfig,
) -> bool {
    let Some(spec) = config.default_spec(object) else {
        return false;
    };
    spec.fields.iter().all(|(name, expected)| {
        fields
            .get(name)
            .is_some_and(|actual| scalar_eq(actual, expected))
    })
}

fn apply_subtype_rules(object: &ObjectType, fields: &mut Map<String, Value>, config: &MigrationConfig) {
    for rule in config.subtype_rules_for(object) {
        let flagged = fields.get(&rule.flag_field).is_some_and(is_truthy);
        if flagged {
            for drop in &rule.drop_fields {
                fields.remove(drop);
            }
        }
        // The flag itself is not writable; it was kept only for this rule.
        fields.remove(&rule.flag_field);
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim(), "true" | "True" | "TRUE" | "1"),
        _ => false,
    }
}

/// Repair text values a file round trip rendered as floats: `8.011111111E9`
/// becomes `8011111111`, `10.0` becomes `10`. Values that are not
/// float-formatted pass through, so `007` keeps its leading zeros.
fn repair_text_value(value: Value) -> Value {
    match value {
        Value::String(s) => match repair_float_text(&s) {
            Some(fixed) => Value::String(fixed),
            None => Value::String(s),
        },
        other => other,
    }
}

fn repair_float_text(s: &str) -> Option<String> {
    let t = s.trim();
    if !(t.contains('.') || t.contains('e') || t.contains('E')) {
        return None;
    }
    let f: f64 = t.parse().ok()?;
    // Whole-number floats only, within exact integer range.
    if !f.is_finite() || f.fract() != 0.0 || f.abs() >= 9_007_199_254_740_992.0 {
        return None;
    }
    Some(format!("{}", f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use crate::platform::memory::meta_from_fields;
    use serde_json::json;

    fn record(id: &str, pairs: &[(&str, Value)]) -> Record {
        Record::new(
            id,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn float_repair_cases() {
        assert_eq!(repair_float_text("8.011111111E9").as_deref(), Some("8011111111"));
        assert_eq!(repair_float_text("10.0").as_deref(), Some("10"));
        assert_eq!(repair_float_text("abc"), None);
        assert_eq!(repair_float_text("007"), None);
        assert_eq!(repair_float_text("10.5"), None);
        assert_eq!(repair_float_text("1e3").as_deref(), Some("1000"));
        assert_eq!(repair_float_text(""), None);
    }

    #[test]
    fn strips_non_writable_and_drifted_fields() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Opportunity");
        let meta = meta_from_fields(
            "Opportunity",
            &[
                ("Id", FieldKind::Id, false, false, false, &[]),
                ("Name", FieldKind::String, true, true, false, &[]),
                ("Amount", FieldKind::Currency, true, true, false, &[]),
                ("ExpectedRevenue", FieldKind::Currency, false, false, true, &[]),
                ("CreatedDate", FieldKind::Datetime, false, false, false, &[]),
            ],
        );

        let records = vec![record(
            "006OLD",
            &[
                ("Id", json!("006OLD")),
                ("Name", json!("Deal")),
                ("Amount", json!("1200")),
                ("ExpectedRevenue", json!("840")),
                ("CreatedDate", json!("2024-01-01T00:00:00Z")),
                ("Dropped_Long_Ago__c", json!("stale")),
            ],
        )];

        let out = sanitize(&object, records, Some(&meta), &cfg);
        assert_eq!(out.len(), 1);
        let fields = &out[0].fields;
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("Name"));
        assert!(fields.contains_key("Amount"));
        assert_eq!(out[0].original_id, "006OLD");
    }

    #[test]
    fn repairs_text_fields_only() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Account");
        let meta = meta_from_fields(
            "Account",
            &[
                ("Phone", FieldKind::Phone, true, true, false, &[]),
                ("AnnualRevenue", FieldKind::Currency, true, true, false, &[]),
            ],
        );

        let records = vec![record(
            "001X",
            &[
                ("Phone", json!("8.011111111E9")),
                ("AnnualRevenue", json!("1.5E6")),
            ],
        )];
        let out = sanitize(&object, records, Some(&meta), &cfg);
        assert_eq!(out[0].fields["Phone"], json!("8011111111"));
        // Non-text kinds are left alone; the platform coerces numerics.
        assert_eq!(out[0].fields["AnnualRevenue"], json!("1.5E6"));
    }

    #[test]
    fn drops_rows_matching_the_default_record() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Apart__c");
        let meta = meta_from_fields(
            "Apart__c",
            &[("Name", FieldKind::String, true, true, false, &[])],
        );

        let records = vec![
            record("a01A", &[("Name", json!("Tower A"))]),
            record("a01B", &[("Name", json!("Unassigned Apart"))]),
            record("a01C", &[("Name", json!("Tower C"))]),
        ];
        let out = sanitize(&object, records, Some(&meta), &cfg);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.fields["Name"] != json!("Unassigned Apart")));
    }

    #[test]
    fn person_account_flag_drives_name_removal_then_disappears() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Account");
        let meta = meta_from_fields(
            "Account",
            &[
                ("Name", FieldKind::String, true, true, false, &[]),
                ("IsPersonAccount", FieldKind::Boolean, false, false, false, &[]),
            ],
        );

        let records = vec![
            record(
                "001P",
                &[("Name", json!("Jane Doe")), ("IsPersonAccount", json!("true"))],
            ),
            record(
                "001B",
                &[("Name", json!("Acme")), ("IsPersonAccount", json!("false"))],
            ),
        ];
        let out = sanitize(&object, records, Some(&meta), &cfg);
        // Person account: Name removed. Both: flag consumed.
        assert!(!out[0].fields.contains_key("Name"));
        assert!(!out[0].fields.contains_key("IsPersonAccount"));
        assert_eq!(out[1].fields["Name"], json!("Acme"));
        assert!(!out[1].fields.contains_key("IsPersonAccount"));
    }

    #[test]
    fn exclusion_table_applies_last() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Account");
        let meta = meta_from_fields(
            "Account",
            &[
                ("Name", FieldKind::String, true, true, false, &[]),
                ("CleanStatus", FieldKind::Picklist, true, true, false, &[]),
            ],
        );

        let records = vec![record(
            "001X",
            &[("Name", json!("Acme")), ("CleanStatus", json!("Pending"))],
        )];
        let out = sanitize(&object, records, Some(&meta), &cfg);
        assert!(!out[0].fields.contains_key("CleanStatus"));
    }

    #[test]
    fn degraded_mode_still_drops_id_and_default_rows() {
        let cfg = MigrationConfig::default();
        let object = ObjectType::new("Apart__c");

        let records = vec![
            record("a01A", &[("Id", json!("a01A")), ("Name", json!("Tower A"))]),
            record("a01B", &[("Id", json!("a01B")), ("Name", json!("Unassigned Apart"))]),
        ];
        let out = sanitize(&object, records, None, &cfg);
        assert_eq!(out.len(), 1);
        assert!(!out[0].fields.contains_key("Id"));
        assert_eq!(out[0].fields["Name"], json!("Tower A"));
    }
}

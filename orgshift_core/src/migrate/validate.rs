//! Pre-insert reference validation.
//!
//! Sampling is a cost control, not a guarantee: up to 5 distinct values per
//! reference field per target type are checked against the destination org.
//! If none of the sample exist the whole field is cleared for that target
//! group (cheap, safe); if some exist the field is left alone and the org's
//! own validation rejects bad rows individually; if the check itself fails
//! the field is cleared defensively. Matters most on degraded paths, where
//! default substitution could not run and values still carry source-org ids.

use crate::config::MigrationConfig;
use crate::models::{is_blank, ObjectMeta, ObjectType, Record};
use crate::platform::Platform;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub async fn clean(
    object: &ObjectType,
    mut records: Vec<Record>,
    meta: Option<&ObjectMeta>,
    platform: &dyn Platform,
    config: &MigrationConfig,
) -> Vec<Record> {
    let Some(meta) = meta else {
        // Without metadata we cannot tell references from plain text.
        return records;
    };

    for desc in meta.createable_references().cloned().collect::<Vec<_>>() {
        // Group distinct values by inferred target type. The polymorphic
        // pairs group by key prefix; plain fields use the declared target.
        let mut by_target: BTreeMap<Option<ObjectType>, BTreeSet<String>> = BTreeMap::new();
        for record in &records {
            let Some(value) = record.get(&desc.name) else {
                continue;
            };
            if is_blank(value) {
                continue;
            }
            let Some(raw) = value.as_str() else {
                continue;
            };
            let target = if config.is_polymorphic(object, &desc.name) {
                config.prefix_target(raw).cloned()
            } else {
                desc.reference_to.first().cloned()
            };
            by_target.entry(target).or_default().insert(raw.to_string());
        }

        for (target, values) in by_target {
            let clear_values = match target {
                // No inferable target: nothing to validate against, clear.
                None => values.clone(),
                Some(target) => {
                    let sample: Vec<String> = values
                        .iter()
                        .take(config.validation_sample_size)
                        .cloned()
                        .collect();
                    match platform.query_existing_ids(&target, &sample).await {
                        Ok(existing) if existing.is_empty() => {
                            tracing::warn!(
                                object = %object,
                                field = %desc.name,
                                target = %target,
                                sampled = sample.len(),
                                "no sampled reference exists in destination; clearing field"
                            );
                            values.clone()
                        }
                        Ok(_) => BTreeSet::new(),
                        Err(e) => {
                            tracing::warn!(
                                object = %object,
                                field = %desc.name,
                                target = %target,
                                error = %e,
                                "reference existence check failed; clearing field defensively"
                            );
                            values.clone()
                        }
                    }
                }
            };

            if clear_values.is_empty() {
                continue;
            }
            for record in &mut records {
                let matches = record
                    .get(&desc.name)
                    .and_then(Value::as_str)
                    .is_some_and(|raw| clear_values.contains(raw));
                if matches {
                    record.fields.insert(desc.name.clone(), Value::Null);
                }
            }
        }
    }

    records
}

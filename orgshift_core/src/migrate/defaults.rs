//! Default fallback record provisioning.
//!
//! One record per configured object type, created at the start of an insert
//! run in parents-before-children order. The returned map is the only
//! signal: an object type absent from it has no fallback, and resolution
//! clears references instead of substituting.

use crate::config::MigrationConfig;
use crate::models::ObjectType;
use crate::platform::Platform;
use serde_json::Value;
use std::collections::HashMap;

pub async fn provision(
    platform: &dyn Platform,
    config: &MigrationConfig,
) -> HashMap<ObjectType, String> {
    let mut provisioned: HashMap<ObjectType, String> = HashMap::new();

    for spec in &config.defaults {
        let mut fields = spec.fields.clone();
        for link in &spec.parent_links {
            match provisioned.get(&link.parent) {
                Some(parent_id) => {
                    fields.insert(link.field.clone(), Value::String(parent_id.clone()));
                }
                None => {
                    tracing::warn!(
                        object = %spec.object,
                        parent = %link.parent,
                        field = %link.field,
                        "parent default not provisioned; creating child default without it"
                    );
                }
            }
        }

        match platform.create(&spec.object, &fields).await {
            Ok(outcome) if outcome.success => {
                let id = outcome.id.unwrap_or_default();
                tracing::info!(object = %spec.object, id = %id, "provisioned default record");
                provisioned.insert(spec.object.clone(), id);
            }
            Ok(outcome) => {
                tracing::warn!(
                    object = %spec.object,
                    errors = ?outcome.errors,
                    "failed to provision default record; references to it will be cleared"
                );
            }
            Err(e) => {
                tracing::warn!(
                    object = %spec.object,
                    error = %e,
                    "error provisioning default record; references to it will be cleared"
                );
            }
        }
    }

    provisioned
}

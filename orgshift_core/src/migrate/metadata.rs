//! Process-lifetime metadata cache.
//!
//! Field descriptors are fetched from the destination org at most once per
//! object type per run. The cache is an explicit object passed into pipeline
//! stages; `clear` exists only for switching destination orgs mid-process.

use crate::models::{ObjectMeta, ObjectType};
use crate::platform::Platform;
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;

pub struct MetadataCache {
    platform: Arc<dyn Platform>,
    cache: DashMap<ObjectType, Arc<ObjectMeta>>,
}

impl MetadataCache {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            cache: DashMap::new(),
        }
    }

    /// Field descriptors for an object type, fetched on first use.
    ///
    /// A fetch failure is `MetadataUnavailable`: callers continue with a
    /// reduced sanitize/resolve pass instead of aborting the run. Failures
    /// are not cached, so a later object type sharing the connection may
    /// still succeed.
    pub async fn describe(&self, object: &ObjectType) -> Result<Arc<ObjectMeta>> {
        if let Some(meta) = self.cache.get(object) {
            return Ok(meta.clone());
        }
        let meta = self
            .platform
            .describe(object)
            .await
            .map_err(|e| Error::metadata_unavailable(object.as_str(), e.to_string()))?;
        let meta = Arc::new(meta);
        self.cache.insert(object.clone(), meta.clone());
        Ok(meta)
    }

    /// Drop everything. Required when the same process switches to a
    /// different destination org.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use crate::platform::memory::{meta_from_fields, MemoryPlatform};

    #[tokio::test]
    async fn describe_is_memoized_per_object_type() {
        let platform = MemoryPlatform::new();
        let account = ObjectType::new("Account");
        platform
            .register_object(
                meta_from_fields(
                    "Account",
                    &[("Name", FieldKind::String, true, true, false, &[])],
                ),
                "001",
            )
            .await;

        let cache = MetadataCache::new(Arc::new(platform.clone()));
        let a = cache.describe(&account).await.unwrap();
        let b = cache.describe(&account).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(platform.describe_count(&account).await, 1);

        cache.clear();
        cache.describe(&account).await.unwrap();
        assert_eq!(platform.describe_count(&account).await, 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_metadata_unavailable_and_not_cached() {
        let platform = MemoryPlatform::new();
        let account = ObjectType::new("Account");
        platform.fail_describe(&account).await;

        let cache = MetadataCache::new(Arc::new(platform.clone()));
        let err = cache.describe(&account).await.unwrap_err();
        assert!(matches!(err, Error::MetadataUnavailable { .. }));
        // Second call goes back to the platform rather than caching the miss.
        let _ = cache.describe(&account).await.unwrap_err();
        assert_eq!(platform.describe_count(&account).await, 2);
    }
}

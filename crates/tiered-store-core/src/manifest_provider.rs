//! Bounded, time-expiring cache of parsed [`SegmentManifest`]s, keyed by
//! segment object key. Concurrent misses on the same key collapse into a
//! single underlying fetch: this uses Moka's `try_get_with` to prevent a
//! thundering herd of identical loads.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::{Bound, ManifestCacheConfig};
use crate::error::ManifestError;
use crate::manifest::SegmentManifest;
use crate::object_store::ObjectStore;
use crate::stats::{CacheStats, CacheStatsSnapshot};

/// Caches manifests. Parse/fetch failures are never cached: a failed load
/// evicts its own in-flight entry so the next caller retries from scratch,
/// matching Moka's behavior of not inserting when the init future errors.
pub struct ManifestProvider {
    cache: Cache<String, Arc<SegmentManifest>>,
    store: Arc<dyn ObjectStore>,
    key_prefix_manifest_suffix: &'static str,
    stats: CacheStats,
}

impl ManifestProvider {
    #[must_use]
    pub fn new(config: &ManifestCacheConfig, store: Arc<dyn ObjectStore>) -> Self {
        let mut builder = Cache::builder();
        if let Bound::Limited(size) = config.size {
            builder = builder.max_capacity(size);
        }
        if let Bound::Limited(retention) = config.retention {
            builder = builder.time_to_live(retention);
        } else {
            builder = builder.time_to_live(Duration::from_secs(u64::MAX / 2));
        }

        Self {
            cache: builder.build(),
            store,
            key_prefix_manifest_suffix: crate::segment::MANIFEST_SUFFIX,
            stats: CacheStats::default(),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(segment_key))]
    pub async fn get(&self, segment_key: &str) -> Result<Arc<SegmentManifest>, ManifestError> {
        let manifest_key = format!("{segment_key}.{}", self.key_prefix_manifest_suffix);
        let was_cached = self.cache.get(segment_key).await.is_some();

        let result = self
            .cache
            .try_get_with(segment_key.to_string(), async {
                let bytes = self
                    .store
                    .fetch(&manifest_key)
                    .await
                    .map_err(|source| ManifestError::Fetch {
                        key: segment_key.to_string(),
                        source,
                    })?;
                let manifest = SegmentManifest::from_json(&bytes).map_err(|source| ManifestError::Parse {
                    key: segment_key.to_string(),
                    message: source.to_string(),
                })?;
                Ok::<_, ManifestError>(Arc::new(manifest))
            })
            .await;

        match result {
            Ok(manifest) => {
                if was_cached {
                    self.stats.record_hit();
                } else {
                    self.stats.record_miss();
                    self.stats.record_load_success();
                }
                Ok(manifest)
            }
            Err(e) => {
                self.stats.record_miss();
                self.stats.record_load_failure();
                // moka wraps the init future's error in an Arc shared by every
                // waiter that collapsed onto the same load. Unwrap back to an
                // owned error for the winner, and clone the variant as-is for
                // losers so they see the same error kind, never a different one.
                Err(Arc::try_unwrap(e).unwrap_or_else(|shared| (*shared).clone()))
            }
        }
    }

    pub fn invalidate(&self, segment_key: &str) {
        self.cache.invalidate(segment_key);
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

//! Bounded, time-expiring cache of plaintext chunk payloads.
//!
//! Splits structurally between in-memory and disk-backed caching: a
//! byte-weighted, time-to-live-bounded Moka cache with `try_get_with` single-
//! flight semantics. When a disk path is configured, the cache holds file
//! paths instead of payload bytes, and every chunk is read back off disk on
//! each access rather than held resident in memory.

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;
use sha2::{Digest, Sha256};

use crate::chunk::ChunkKey;
use crate::config::{Bound, ChunkCacheConfig};
use crate::error::{CacheLoadError, ChunkError};
use crate::stats::{CacheStats, CacheStatsSnapshot, EvictionCause};

enum Backing {
    Memory(Cache<ChunkKey, Arc<Vec<u8>>>),
    Disk {
        cache: Cache<ChunkKey, Arc<PathBuf>>,
        root: PathBuf,
    },
}

/// Caches plaintext chunk payloads keyed by `(segment_object_key, ordinal)`.
pub struct ChunkCache {
    backing: Backing,
    stats: Arc<CacheStats>,
}

fn eviction_cause(cause: RemovalCause) -> EvictionCause {
    match cause {
        RemovalCause::Expired => EvictionCause::Expired,
        RemovalCause::Size => EvictionCause::Size,
        RemovalCause::Explicit | RemovalCause::Replaced => EvictionCause::Invalidated,
    }
}

fn disk_file_name(key: &ChunkKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.segment_object_key.as_bytes());
    hasher.update(key.chunk_ordinal.to_be_bytes());
    hex::encode(hasher.finalize())
}

impl ChunkCache {
    #[must_use]
    pub fn new(config: &ChunkCacheConfig) -> Self {
        let stats = Arc::new(CacheStats::default());

        let backing = if let Some(root) = config.path.clone() {
            let stats_for_listener = stats.clone();
            let root_for_listener = root.clone();
            let mut builder = Cache::builder().eviction_listener(move |_k, v: Arc<PathBuf>, cause| {
                stats_for_listener.record_eviction(eviction_cause(cause));
                let _ = &root_for_listener;
                if let Err(e) = std::fs::remove_file(v.as_path()) {
                    tracing::warn!(path = %v.display(), error = %e, "failed to remove evicted chunk cache file");
                }
            });
            if let Bound::Limited(size) = config.size {
                builder = builder.max_capacity(size).weigher(|_k, _v: &Arc<PathBuf>| 1);
            }
            if let Bound::Limited(retention) = config.retention {
                builder = builder.time_to_live(retention);
            }
            Backing::Disk {
                cache: builder.build(),
                root,
            }
        } else {
            let stats_for_listener = stats.clone();
            let mut builder = Cache::builder().eviction_listener(move |_k, _v, cause| {
                stats_for_listener.record_eviction(eviction_cause(cause));
            });
            if let Bound::Limited(size) = config.size {
                builder = builder
                    .max_capacity(size)
                    .weigher(|_k, v: &Arc<Vec<u8>>| v.len().min(u32::MAX as usize) as u32);
            }
            if let Bound::Limited(retention) = config.retention {
                builder = builder.time_to_live(retention);
            }
            Backing::Memory(builder.build())
        };

        Self { backing, stats }
    }

    /// Fetch the plaintext payload for `key`, invoking `supplier` at most once
    /// across all concurrent callers on a cold entry. Returns a fresh reader
    /// positioned at the start of the payload on every call.
    pub async fn fetch<F, Fut>(
        &self,
        key: ChunkKey,
        supplier: F,
    ) -> Result<Cursor<Arc<Vec<u8>>>, CacheLoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ChunkError>>,
    {
        match &self.backing {
            Backing::Memory(cache) => {
                let was_cached = cache.get(&key).await.is_some();
                let bytes = cache
                    .try_get_with(key, async move { supplier().await.map(Arc::new) })
                    .await
                    .map_err(|e| self.on_load_error(e))?;
                self.record_outcome(was_cached);
                Ok(Cursor::new(bytes))
            }
            Backing::Disk { cache, root } => {
                let was_cached = cache.get(&key).await.is_some();
                let file_name = disk_file_name(&key);
                let path = root.join(&file_name);
                let path_for_init = path.clone();

                let stored_path = cache
                    .try_get_with(key, async move {
                        let bytes = supplier().await?;
                        write_chunk_file(&path_for_init, &bytes).await?;
                        Ok::<_, ChunkError>(Arc::new(path_for_init))
                    })
                    .await
                    .map_err(|e| self.on_load_error(e))?;

                self.record_outcome(was_cached);
                let bytes = tokio::fs::read(stored_path.as_path())
                    .await
                    .map_err(|e| CacheLoadError(ChunkError::CacheIo(e)))?;
                Ok(Cursor::new(Arc::new(bytes)))
            }
        }
    }

    fn record_outcome(&self, was_cached: bool) {
        if was_cached {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
            self.stats.record_load_success();
        }
    }

    fn on_load_error(&self, e: Arc<ChunkError>) -> CacheLoadError {
        self.stats.record_miss();
        self.stats.record_load_failure();
        match Arc::try_unwrap(e) {
            Ok(e) => CacheLoadError(e),
            // another waiter already unwrapped the shared Arc; the source chain
            // isn't `Clone` so the original error can't be recovered here.
            Err(_shared) => CacheLoadError(ChunkError::CacheIo(std::io::Error::other(
                "chunk load failed (error already reported to another waiter)",
            ))),
        }
    }

    /// Schedule background materialization of the given ordinals without
    /// blocking the caller. Completion is observable through later [`Self::fetch`]
    /// calls hitting the cache.
    pub fn prepare<F, Fut>(&self, keys: Vec<ChunkKey>, mut supplier_for: F)
    where
        F: FnMut(ChunkKey) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ChunkError>> + Send + 'static,
    {
        for key in keys {
            let fut = supplier_for(key.clone());
            match &self.backing {
                Backing::Memory(cache) => {
                    let cache = cache.clone();
                    tokio::spawn(async move {
                        let _ = cache.try_get_with(key, async move { fut.await.map(Arc::new) }).await;
                    });
                }
                Backing::Disk { cache, root } => {
                    let cache = cache.clone();
                    let path = root.join(disk_file_name(&key));
                    tokio::spawn(async move {
                        let _ = cache
                            .try_get_with(key, async move {
                                let bytes = fut.await?;
                                write_chunk_file(&path, &bytes).await?;
                                Ok::<_, ChunkError>(Arc::new(path))
                            })
                            .await;
                    });
                }
            }
        }
    }

    pub fn invalidate(&self, key: &ChunkKey) {
        match &self.backing {
            Backing::Memory(cache) => cache.invalidate(key),
            Backing::Disk { cache, .. } => cache.invalidate(key),
        };
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

async fn write_chunk_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(ordinal: u32) -> ChunkKey {
        ChunkKey::new("segment-a", ordinal)
    }

    #[tokio::test]
    async fn memory_cache_hit_after_miss_does_not_reload() {
        let cache = ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Unbounded,
            retention: Bound::Unbounded,
            path: None,
        });
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            let mut cursor = cache
                .fetch(key(0), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(b"payload".to_vec())
                })
                .await
                .unwrap();
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut cursor, &mut buf).unwrap();
            assert_eq!(buf, b"payload");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 2);
    }

    #[tokio::test]
    async fn concurrent_fetches_single_flight() {
        let cache = Arc::new(ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Unbounded,
            retention: Bound::Unbounded,
            path: None,
        }));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .fetch(key(1), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(b"shared".to_vec())
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prepare_materializes_chunks_without_blocking_caller() {
        let cache = Arc::new(ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Unbounded,
            retention: Bound::Unbounded,
            path: None,
        }));
        let calls = Arc::new(AtomicUsize::new(0));

        let keys = vec![key(0), key(1), key(2)];
        let supplied = calls.clone();
        cache.prepare(keys.clone(), move |k| {
            let supplied = supplied.clone();
            async move {
                supplied.fetch_add(1, Ordering::SeqCst);
                Ok(format!("chunk-{}", k.chunk_ordinal).into_bytes())
            }
        });

        // prepare() hands work off to spawned tasks; poll until they land
        // rather than assuming a fixed sleep suffices on a loaded scheduler.
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == keys.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), keys.len());

        for k in &keys {
            let unreachable = calls.clone();
            let mut cursor = cache
                .fetch(k.clone(), || async move {
                    // prefetch already populated the cache; this must not run.
                    unreachable.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::new())
                })
                .await
                .unwrap();
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut cursor, &mut buf).unwrap();
            assert_eq!(buf, format!("chunk-{}", k.chunk_ordinal).into_bytes());
        }
        assert_eq!(calls.load(Ordering::SeqCst), keys.len());
    }

    #[tokio::test]
    async fn retention_expiry_triggers_reload_and_is_recorded_as_expired() {
        let cache = ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Unbounded,
            retention: Bound::Limited(Duration::from_millis(100)),
            path: None,
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let load = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ChunkError>(b"payload".to_vec())
        };
        cache.fetch(key(0), || load(calls.clone())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        if let Backing::Memory(c) = &cache.backing {
            c.run_pending_tasks().await;
        }

        cache.fetch(key(0), || load(calls.clone())).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().evictions_expired, 1);
    }

    #[tokio::test]
    async fn size_bound_evicts_until_under_capacity_and_is_recorded_as_size() {
        let cache = ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Limited(18),
            retention: Bound::Unbounded,
            path: None,
        });
        cache.fetch(key(0), || async { Ok(vec![0u8; 10]) }).await.unwrap();
        cache.fetch(key(1), || async { Ok(vec![0u8; 10]) }).await.unwrap();
        if let Backing::Memory(c) = &cache.backing {
            c.run_pending_tasks().await;
        }
        assert!(cache.stats().evictions_size >= 1);

        // exactly one of the two keys survived the size-bound eviction; the
        // other reloads from the supplier on its next fetch.
        let calls = Arc::new(AtomicUsize::new(0));
        for k in [key(0), key(1)] {
            let calls = calls.clone();
            cache
                .fetch(k, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![0u8; 10])
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disk_backed_cache_materializes_and_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkCache::new(&ChunkCacheConfig {
            size: Bound::Unbounded,
            retention: Bound::Unbounded,
            path: Some(dir.path().to_path_buf()),
        });
        let mut cursor = cache
            .fetch(key(2), || async { Ok(b"on-disk".to_vec()) })
            .await
            .unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut cursor, &mut buf).unwrap();
        assert_eq!(buf, b"on-disk");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

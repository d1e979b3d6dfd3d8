//! Composition root: assembles the chunk index, envelope crypto, transform
//! pipeline, manifest provider and chunk cache into the exact host-facing
//! surface described in the external interfaces section of this crate's
//! design docs (`copy_log_segment`, `fetch_log_segment` x2, `fetch_index`,
//! `delete_log_segment_data`, `close`).
//!
//! This is composition, not a reimplementation of the host plug-in lifecycle:
//! the host still owns starting/stopping the plug-in and wiring it to a real
//! object-store driver. `RemoteStorage` just wires components A-I together
//! the way the write/read flow diagrams already describe.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::chunk::BytesRange;
use crate::chunk_cache::ChunkCache;
use crate::chunk_manager::ChunkManager;
use crate::config::Config;
use crate::crypto::envelope::{DataKey, EnvelopeCrypto};
use crate::error::{BackendError, ChunkError, TieredStorageError};
use crate::manifest::{IndexSizes, SegmentEncryptionMetadata, SegmentManifest};
use crate::manifest_provider::ManifestProvider;
use crate::object_store::ObjectStore;
use crate::range_assembler::RangeAssembler;
use crate::segment::{IndexType, SegmentId, SegmentObjectKeys};
use crate::transform::TransformError;
use crate::transform::finisher::TransformFinisher;
use crate::transform::stream::{BaseChunker, Compress, Encrypt};

/// The plaintext log bytes plus whichever companion index files the host
/// happened to have on disk for this segment (a missing `TRANSACTION` index
/// is normal; every other index type is expected to be present).
#[derive(Debug, Clone, Default)]
pub struct SegmentData {
    pub log: Vec<u8>,
    pub indexes: HashMap<IndexType, Vec<u8>>,
}

/// Magic bytes of the compression formats the quick "is this already
/// compressed" sniff recognizes. This stands in for inspecting the host log
/// format's own batch header (out of scope: this crate has no notion of the
/// host's record-batch encoding), so it only ever recognizes payloads that
/// already look like a known compressed container.
fn sniff_already_compressed(data: &[u8]) -> Option<bool> {
    if data.is_empty() {
        return None;
    }
    const GZIP: [u8; 2] = [0x1f, 0x8b];
    const ZSTD: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
    const LZ4: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];
    const BZIP2: [u8; 3] = [0x42, 0x5a, 0x68];

    let looks_compressed = data.starts_with(&GZIP)
        || data.starts_with(&ZSTD)
        || data.starts_with(&LZ4)
        || data.starts_with(&BZIP2);
    Some(looks_compressed)
}

/// Composes A-I into the host's remote-storage surface.
pub struct RemoteStorage {
    config: Config,
    store: Arc<dyn ObjectStore>,
    keys: SegmentObjectKeys,
    crypto: Option<EnvelopeCrypto>,
    manifest_provider: ManifestProvider,
    chunk_manager: Arc<ChunkManager>,
    chunk_cache: Arc<ChunkCache>,
}

impl RemoteStorage {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn ObjectStore>, crypto: Option<EnvelopeCrypto>) -> Self {
        let keys = SegmentObjectKeys::new(config.key_prefix.clone());
        let manifest_provider = ManifestProvider::new(&config.manifest_cache, store.clone());
        let chunk_manager = Arc::new(ChunkManager::new(store.clone(), keys.clone(), crypto.clone()));
        let chunk_cache = Arc::new(ChunkCache::new(&config.chunk_cache));

        Self {
            config,
            store,
            keys,
            crypto,
            manifest_provider,
            chunk_manager,
            chunk_cache,
        }
    }

    fn range_assembler(&self) -> RangeAssembler {
        RangeAssembler::new(self.chunk_manager.clone(), self.chunk_cache.clone())
    }

    /// Upload a segment's log data, every index file the host provided, and
    /// the manifest describing how the log was chunked and transformed.
    #[tracing::instrument(level = "info", skip(self, data), fields(segment = %segment.path_stem()))]
    pub async fn copy_log_segment(&self, segment: &SegmentId, data: SegmentData) -> Result<(), TieredStorageError> {
        let original_total_size = data.log.len() as u64;
        let compress = self.should_compress(&data.log);

        if self.config.encryption.enabled && self.crypto.is_none() {
            return Err(TieredStorageError::EncryptionNotConfigured);
        }

        let chunk_size = self.config.chunk_size as usize;
        let source = Cursor::new(data.log);
        let chunker = BaseChunker::new(source, chunk_size);

        let mut stage: Box<dyn Iterator<Item = Result<Vec<u8>, TransformError>>> = Box::new(chunker);
        if compress {
            stage = Box::new(Compress::new(stage, 3));
        }

        let encryption_metadata = if self.config.encryption.enabled {
            let crypto = self.crypto.clone().expect("checked above");
            let data_key = DataKey::generate();
            let aad = aad_for(segment);
            let wrapped_data_key = crypto.wrap_data_key(&data_key)?;
            stage = Box::new(Encrypt::new(stage, crypto, data_key, aad.clone()));
            Some(SegmentEncryptionMetadata {
                wrapped_data_key,
                aad,
            })
        } else {
            None
        };

        let log_key = self.keys.log_key(segment);
        let mut uploaded = Vec::new();
        let finisher = TransformFinisher::new(self.config.chunk_size, original_total_size);
        let chunk_index = finisher
            .drive(stage, |block| {
                uploaded.extend_from_slice(block);
                Ok(())
            })
            .map_err(transform_err_to_storage)?;
        self.store.upload(&log_key, uploaded).await?;

        let mut index_sizes: IndexSizes = HashMap::new();
        let mut uploads = JoinSet::new();
        for (index_type, bytes) in data.indexes {
            index_sizes.insert(index_type, bytes.len() as u64);
            let key = self.keys.index_key(segment, index_type);
            let store = self.store.clone();
            uploads.spawn(async move { store.upload(&key, bytes).await });
        }
        while let Some(result) = uploads.join_next().await {
            result.expect("index upload task panicked")?;
        }

        let mut manifest = SegmentManifest::new(chunk_index, compress, encryption_metadata);
        if !index_sizes.is_empty() {
            manifest.indexes = Some(index_sizes);
        }

        let manifest_key = self.keys.manifest_key(segment);
        let manifest_json = manifest
            .to_json()
            .expect("SegmentManifest always serializes");
        self.store.upload(&manifest_key, manifest_json).await?;

        Ok(())
    }

    fn should_compress(&self, log: &[u8]) -> bool {
        if !self.config.compression.enabled {
            return false;
        }
        if !self.config.compression.heuristic_enabled {
            return true;
        }
        match sniff_already_compressed(log) {
            Some(true) => false,
            Some(false) => true,
            None => {
                tracing::warn!("could not sniff segment compression state, uploading uncompressed");
                false
            }
        }
    }

    /// Fetch `[start, end-of-segment)` of a segment's plaintext bytes.
    pub async fn fetch_log_segment_from(&self, segment: &SegmentId, start: u64) -> Result<Vec<u8>, TieredStorageError> {
        let manifest = self.manifest_for(segment).await?;
        let end = manifest.chunk_index.total_original_size().saturating_sub(1);
        self.range_assembler()
            .fetch_range(segment, &manifest, BytesRange { from: start, to: end })
            .await
    }

    /// Fetch `[start, end]` (inclusive) of a segment's plaintext bytes.
    pub async fn fetch_log_segment_range(
        &self,
        segment: &SegmentId,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, TieredStorageError> {
        let manifest = self.manifest_for(segment).await?;
        self.range_assembler()
            .fetch_range(segment, &manifest, BytesRange { from: start, to: end })
            .await
    }

    /// Fetch a companion index file. A missing `TRANSACTION` index is
    /// expected and returns `None`; every other missing index is an error.
    pub async fn fetch_index(
        &self,
        segment: &SegmentId,
        index_type: IndexType,
    ) -> Result<Option<Vec<u8>>, TieredStorageError> {
        let key = self.keys.index_key(segment, index_type);
        match self.store.fetch(&key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(BackendError::Permanent { .. }) if index_type.optional() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every object a segment owns: the log, every index suffix, and
    /// the manifest.
    #[tracing::instrument(level = "info", skip(self), fields(segment = %segment.path_stem()))]
    pub async fn delete_log_segment_data(&self, segment: &SegmentId) -> Result<(), TieredStorageError> {
        for key in self.keys.all_keys(segment) {
            self.store.delete(&key).await?;
        }
        self.manifest_provider.invalidate(&segment.path_stem());
        Ok(())
    }

    /// Flush observability counters and release resources. Idempotent.
    pub fn close(&self) {
        let manifest_stats = self.manifest_provider.stats();
        let chunk_stats = self.chunk_cache.stats();
        tracing::info!(
            manifest_hit_rate = manifest_stats.hit_rate(),
            chunk_hit_rate = chunk_stats.hit_rate(),
            "closing remote storage facade"
        );
    }

    async fn manifest_for(&self, segment: &SegmentId) -> Result<Arc<SegmentManifest>, TieredStorageError> {
        self.manifest_provider
            .get(&segment.path_stem())
            .await
            .map_err(TieredStorageError::from)
    }

    /// Fetch and parse a segment's manifest, for callers that want to inspect
    /// chunking/compression/encryption metadata directly (the demo CLI's
    /// `info` command, for instance) rather than read the segment's bytes.
    pub async fn manifest(&self, segment: &SegmentId) -> Result<Arc<SegmentManifest>, TieredStorageError> {
        self.manifest_for(segment).await
    }

    #[must_use]
    pub fn manifest_cache_stats(&self) -> crate::stats::CacheStatsSnapshot {
        self.manifest_provider.stats()
    }

    #[must_use]
    pub fn chunk_cache_stats(&self) -> crate::stats::CacheStatsSnapshot {
        self.chunk_cache.stats()
    }
}

fn aad_for(segment: &SegmentId) -> Vec<u8> {
    segment.path_stem().into_bytes()
}

fn transform_err_to_storage(e: TransformError) -> TieredStorageError {
    let chunk_err = match e {
        TransformError::Io(io) => ChunkError::CacheIo(io),
        TransformError::Crypto(c) => ChunkError::Crypto(c),
        TransformError::Compression(c) => ChunkError::Compression(c),
    };
    chunk_err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bound, ChunkCacheConfig, CompressionConfig, EncryptionConfig, ManifestCacheConfig};
    use crate::object_store::FsObjectStore;
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    const TEST_PRIVATE_KEY_PEM: &str = include_str!("../testdata/test_rsa2048.pem");

    fn plain_config() -> Config {
        Config {
            chunk_size: 10,
            compression: CompressionConfig {
                enabled: false,
                heuristic_enabled: false,
            },
            encryption: EncryptionConfig {
                enabled: false,
                public_key_file: None,
                private_key_file: None,
            },
            key_prefix: "tiered".to_string(),
            chunk_cache: ChunkCacheConfig {
                size: Bound::Unbounded,
                retention: Bound::Unbounded,
                path: None,
            },
            manifest_cache: ManifestCacheConfig {
                size: Bound::Unbounded,
                retention: Bound::Unbounded,
            },
        }
    }

    fn segment() -> SegmentId {
        SegmentId::new("orders", 0, 0, uuid::Uuid::nil())
    }

    #[tokio::test]
    async fn plain_round_trip_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let remote = RemoteStorage::new(plain_config(), store, None);
        let segment = segment();
        let data = SegmentData {
            log: b"0123456789abcdefghij".to_vec(),
            indexes: HashMap::new(),
        };
        remote.copy_log_segment(&segment, data).await.unwrap();

        let full = remote.fetch_log_segment_from(&segment, 0).await.unwrap();
        assert_eq!(full, b"0123456789abcdefghij");

        let mid = remote.fetch_log_segment_range(&segment, 5, 14).await.unwrap();
        assert_eq!(mid, b"56789abcde");
    }

    #[tokio::test]
    async fn encrypted_round_trip_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let private_key = RsaPrivateKey::from_pkcs1_pem(TEST_PRIVATE_KEY_PEM).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let crypto = EnvelopeCrypto::new(public_key, private_key);

        let mut config = plain_config();
        config.encryption.enabled = true;

        let remote = RemoteStorage::new(config, store, Some(crypto));
        let segment = segment();
        let data = SegmentData {
            log: b"0123456789abcdefghij".to_vec(),
            indexes: HashMap::new(),
        };
        remote.copy_log_segment(&segment, data).await.unwrap();

        let full = remote.fetch_log_segment_from(&segment, 0).await.unwrap();
        assert_eq!(full, b"0123456789abcdefghij");
    }

    #[tokio::test]
    async fn tampered_stored_chunk_fails_with_auth_tag_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let private_key = RsaPrivateKey::from_pkcs1_pem(TEST_PRIVATE_KEY_PEM).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let crypto = EnvelopeCrypto::new(public_key, private_key);

        let mut config = plain_config();
        config.encryption.enabled = true;
        let keys = SegmentObjectKeys::new(config.key_prefix.clone());

        let remote = RemoteStorage::new(config, store, Some(crypto));
        let segment = segment();
        let data = SegmentData {
            log: b"0123456789abcdefghij".to_vec(),
            indexes: HashMap::new(),
        };
        remote.copy_log_segment(&segment, data).await.unwrap();

        let log_path = dir.path().join(keys.log_key(&segment));
        let mut bytes = std::fs::read(&log_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&log_path, bytes).unwrap();

        let err = remote.fetch_log_segment_from(&segment, 0).await.unwrap_err();
        assert!(matches!(
            err,
            TieredStorageError::Chunk(ChunkError::Crypto(crate::error::CryptoError::AuthTagInvalid))
        ));
    }

    #[tokio::test]
    async fn already_compressed_segment_is_uploaded_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let keys = SegmentObjectKeys::new("tiered".to_string());

        let mut config = plain_config();
        config.compression.enabled = true;
        config.compression.heuristic_enabled = true;

        let remote = RemoteStorage::new(config, store.clone(), None);
        let segment = segment();
        // Starts with the zstd magic number, so the heuristic should treat it
        // as already compressed and skip re-compressing it.
        let mut log = vec![0x28, 0xb5, 0x2f, 0xfd];
        log.extend_from_slice(b"already-compressed-payload-bytes");
        let data = SegmentData {
            log: log.clone(),
            indexes: HashMap::new(),
        };
        remote.copy_log_segment(&segment, data).await.unwrap();

        let uploaded = store.fetch(&keys.log_key(&segment)).await.unwrap();
        assert_eq!(uploaded, log, "already-compressed payload must be stored unchanged");

        let manifest_bytes = store.fetch(&keys.manifest_key(&segment)).await.unwrap();
        let manifest = SegmentManifest::from_json(&manifest_bytes).unwrap();
        assert!(!manifest.compressed);
    }

    #[tokio::test]
    async fn missing_transaction_index_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let remote = RemoteStorage::new(plain_config(), store, None);
        let segment = segment();
        let data = SegmentData {
            log: b"0123456789".to_vec(),
            indexes: HashMap::new(),
        };
        remote.copy_log_segment(&segment, data).await.unwrap();

        let txn = remote.fetch_index(&segment, IndexType::Transaction).await.unwrap();
        assert!(txn.is_none());

        let err = remote.fetch_index(&segment, IndexType::Offset).await.unwrap_err();
        assert!(matches!(err, TieredStorageError::Backend(BackendError::Permanent { .. })));
    }

    #[tokio::test]
    async fn delete_removes_every_known_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let remote = RemoteStorage::new(plain_config(), store.clone(), None);
        let segment = segment();
        let mut indexes = HashMap::new();
        indexes.insert(IndexType::Offset, b"idx".to_vec());
        let data = SegmentData {
            log: b"0123456789".to_vec(),
            indexes,
        };
        remote.copy_log_segment(&segment, data).await.unwrap();
        remote.delete_log_segment_data(&segment).await.unwrap();

        let err = remote.fetch_log_segment_from(&segment, 0).await.unwrap_err();
        assert!(matches!(err, TieredStorageError::Manifest(_)));
    }

    #[test]
    fn compression_heuristic_detects_known_magic_bytes() {
        assert_eq!(sniff_already_compressed(&[0x1f, 0x8b, 0x00]), Some(true));
        assert_eq!(sniff_already_compressed(b"plain text"), Some(false));
        assert_eq!(sniff_already_compressed(&[]), None);
    }
}

//! Given a segment, its manifest, and a chunk ordinal, produces a readable
//! stream of plaintext bytes for that single chunk. Composes the object
//! store, envelope crypto and transform stages in reverse of the write path.

use std::sync::Arc;

use crate::chunk::ChunkKey;
use crate::crypto::envelope::EnvelopeCrypto;
use crate::error::{ChunkError, CryptoError};
use crate::manifest::SegmentManifest;
use crate::object_store::{FetchRange, ObjectStore};
use crate::segment::{SegmentId, SegmentObjectKeys};
use crate::transform::stream::{BaseDechunker, Decompress, Decrypt};
use crate::transform::TransformError;

pub struct ChunkManager {
    store: Arc<dyn ObjectStore>,
    keys: SegmentObjectKeys,
    crypto: Option<EnvelopeCrypto>,
}

impl ChunkManager {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, keys: SegmentObjectKeys, crypto: Option<EnvelopeCrypto>) -> Self {
        Self { store, keys, crypto }
    }

    /// Fetch and fully decode the plaintext bytes of a single chunk.
    #[tracing::instrument(level = "debug", skip(self, manifest), fields(segment = %segment.path_stem(), chunk_ordinal))]
    pub async fn get_chunk(
        &self,
        segment: &SegmentId,
        manifest: &SegmentManifest,
        chunk_ordinal: u32,
    ) -> Result<Vec<u8>, ChunkError> {
        let chunk = manifest.chunk_index.get(chunk_ordinal)?;
        let log_key = self.keys.log_key(segment);

        let transformed = self
            .store
            .fetch_range(
                &log_key,
                FetchRange {
                    from: chunk.transformed_from,
                    to: chunk.transformed_from + u64::from(chunk.transformed_size) - 1,
                },
            )
            .await?;

        let dechunked = BaseDechunker::new(std::io::Cursor::new(transformed), vec![chunk.transformed_size]);

        let data_key = match (&manifest.encryption, &self.crypto) {
            (Some(meta), Some(crypto)) => Some((crypto.unwrap_data_key(&meta.wrapped_data_key)?, meta.aad.clone())),
            (Some(_), None) => {
                return Err(ChunkError::Crypto(CryptoError::KeyUnwrap(rsa::Error::Decryption)));
            }
            (None, _) => None,
        };

        let decrypted: Box<dyn Iterator<Item = Result<Vec<u8>, TransformError>>> = match (&data_key, &self.crypto) {
            (Some((key, aad)), Some(crypto)) => Box::new(Decrypt::new(
                dechunked,
                crypto.clone(),
                key.clone(),
                aad.clone(),
                chunk_ordinal,
            )),
            _ => Box::new(dechunked),
        };

        let mut decompressed: Box<dyn Iterator<Item = Result<Vec<u8>, TransformError>>> = if manifest.compressed {
            Box::new(Decompress::new(decrypted))
        } else {
            decrypted
        };

        let block = decompressed
            .next()
            .transpose()
            .map_err(|e| match e {
                TransformError::Crypto(c) => ChunkError::Crypto(c),
                TransformError::Compression(c) => ChunkError::Compression(c),
                TransformError::Io(io) => ChunkError::Backend(crate::error::BackendError::Transient {
                    key: log_key.clone(),
                    source: io,
                }),
            })?
            .unwrap_or_default();

        Ok(block)
    }

    pub fn chunk_key(&self, segment: &SegmentId, chunk_ordinal: u32) -> ChunkKey {
        ChunkKey::new(self.keys.log_key(segment), chunk_ordinal)
    }
}

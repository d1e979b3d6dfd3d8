//! Error types for the tiered storage core.
//!
//! Mirrors the error kinds enumerated for the host-facing facade: transient and
//! permanent backend failures are kept distinct so the host can decide whether to
//! retry, and manifest/crypto/compression failures are never retried internally.

use thiserror::Error;

use crate::chunk::index::ChunkIndexError;

/// Errors surfaced by the object-store driver contract.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A timeout, connection reset, or 5xx-class failure. The host may retry.
    #[error("transient backend error for key {key}: {source}")]
    Transient {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A 404/403-class failure, or any error the driver considers non-retryable.
    #[error("permanent backend error for key {key}: {source}")]
    Permanent {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

// `std::io::Error` isn't `Clone`, but `ManifestError` needs to be so the
// single-flight manifest cache can hand every waiter its own owned error
// instead of reinventing one (see `manifest_provider.rs`). Rebuild an
// equivalent `io::Error` from the kind and message; it round-trips the
// classification that callers actually branch on.
impl Clone for BackendError {
    fn clone(&self) -> Self {
        match self {
            BackendError::Transient { key, source } => BackendError::Transient {
                key: key.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            BackendError::Permanent { key, source } => BackendError::Permanent {
                key: key.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
        }
    }
}

/// Errors from parsing or validating a [`crate::manifest::SegmentManifest`].
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    #[error("failed to fetch manifest for segment {key}")]
    Fetch {
        key: String,
        #[source]
        source: BackendError,
    },

    /// `serde_json::Error` isn't `Clone`, so the parse failure message is
    /// captured as text. Still a distinct, surfaced variant from
    /// `VersionUnknown`, just without the original source chain attached.
    #[error("malformed manifest JSON for segment {key}: {message}")]
    Parse { key: String, message: String },

    #[error("unknown manifest version tag: {tag}")]
    VersionUnknown { tag: String },
}

/// Errors from the envelope crypto component.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to unwrap segment data key")]
    KeyUnwrap(#[source] rsa::Error),

    #[error("failed to wrap segment data key")]
    KeyWrap(#[source] rsa::Error),

    #[error("authentication tag invalid, ciphertext was tampered with or the key is wrong")]
    AuthTagInvalid,

    #[error("ciphertext too short to contain an IV and authentication tag")]
    CiphertextTooShort,
}

/// Errors from the compression stages.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("failed to compress chunk")]
    Compress(#[source] std::io::Error),

    #[error("compressed chunk data is corrupt")]
    Corrupt(#[source] std::io::Error),
}

/// Errors raised while materializing a chunk through the chunk manager or cache.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Index(#[from] ChunkIndexError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("requested ordinal {ordinal} is out of range (chunk count {chunk_count})")]
    OutOfRange { ordinal: u32, chunk_count: u32 },

    #[error("failed to materialize chunk cache entry on disk")]
    CacheIo(#[from] std::io::Error),
}

/// Raised when the chunk cache's supplier fails; wraps the underlying cause.
#[derive(Debug, Error)]
#[error("chunk cache load failed: {0}")]
pub struct CacheLoadError(#[from] pub ChunkError);

/// Top-level error returned by the host-facing remote-storage surface (see
/// `tiered-store-cli`'s `cp`/`cat`/`rm`/`info` commands for a worked facade).
#[derive(Debug, Error)]
pub enum TieredStorageError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("byte range {from}..={to} is out of bounds for segment of size {segment_size}")]
    RangeOutOfBounds { from: u64, to: u64, segment_size: u64 },

    #[error("encryption.enabled is true but no crypto context was configured")]
    EncryptionNotConfigured,
}

impl From<CacheLoadError> for TieredStorageError {
    fn from(e: CacheLoadError) -> Self {
        e.0.into()
    }
}

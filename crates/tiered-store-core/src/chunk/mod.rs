//! Chunk-level types shared by the transform pipeline, manifest and caches.

pub mod index;

use serde::{Deserialize, Serialize};

/// A single chunk, addressed in both plaintext ("original") and on-object-store
/// ("transformed") byte coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub ordinal: u32,
    pub original_from: u64,
    pub original_size: u32,
    pub transformed_from: u64,
    pub transformed_size: u32,
}

impl Chunk {
    #[must_use]
    pub fn original_range(&self) -> BytesRange {
        BytesRange {
            from: self.original_from,
            to: self.original_from + u64::from(self.original_size) - 1,
        }
    }

    #[must_use]
    pub fn transformed_range(&self) -> BytesRange {
        BytesRange {
            from: self.transformed_from,
            to: self.transformed_from + u64::from(self.transformed_size) - 1,
        }
    }
}

/// An inclusive byte range, `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesRange {
    pub from: u64,
    pub to: u64,
}

impl BytesRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false // an inclusive range with from <= to always has at least one byte
    }
}

/// The identity of a single chunk within a segment: used as the cache key for
/// both the manifest provider and the chunk cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub segment_object_key: String,
    pub chunk_ordinal: u32,
}

impl ChunkKey {
    #[must_use]
    pub fn new(segment_object_key: impl Into<String>, chunk_ordinal: u32) -> Self {
        Self {
            segment_object_key: segment_object_key.into(),
            chunk_ordinal,
        }
    }
}

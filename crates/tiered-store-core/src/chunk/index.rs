//! Content-addressed chunk index: maps plaintext byte offsets to the chunk that
//! contains them, and vice versa.
//!
//! Two representations exist because a fixed-size chunker (no compression) lets
//! every lookup be done with plain arithmetic, analogous to the constant-size
//! chunk-number/offset arithmetic used for fixed-size AES-GCM chunks elsewhere.
//! Once chunk sizes vary (compression), lookups go through a precomputed
//! prefix-sum table instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Chunk;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkIndexError {
    #[error("offset {offset} is out of range for index spanning {total} bytes")]
    OutOfRange { offset: u64, total: u64 },

    #[error("ordinal {ordinal} is out of range (chunk count {chunk_count})")]
    OrdinalOutOfRange { ordinal: u32, chunk_count: u32 },
}

/// Serialized, versioned chunk index. The `type` tag is what the manifest JSON
/// schema calls `chunkIndex.type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChunkIndex {
    #[serde(rename = "fixed")]
    Fixed(FixedChunkIndex),
    #[serde(rename = "variable")]
    Variable(VariableChunkIndex),
}

impl ChunkIndex {
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        match self {
            ChunkIndex::Fixed(f) => f.chunk_count(),
            ChunkIndex::Variable(v) => v.chunk_count(),
        }
    }

    #[must_use]
    pub fn total_original_size(&self) -> u64 {
        match self {
            ChunkIndex::Fixed(f) => f.original_file_size,
            ChunkIndex::Variable(v) => v.total_original_size(),
        }
    }

    #[must_use]
    pub fn total_transformed_size(&self) -> u64 {
        match self {
            ChunkIndex::Fixed(f) => f.transformed_file_size,
            ChunkIndex::Variable(v) => v.total_transformed_size(),
        }
    }

    pub fn get(&self, ordinal: u32) -> Result<Chunk, ChunkIndexError> {
        match self {
            ChunkIndex::Fixed(f) => f.get(ordinal),
            ChunkIndex::Variable(v) => v.get(ordinal),
        }
    }

    pub fn find_chunk_for_original_offset(&self, offset: u64) -> Result<Chunk, ChunkIndexError> {
        match self {
            ChunkIndex::Fixed(f) => f.find_chunk_for_original_offset(offset),
            ChunkIndex::Variable(v) => v.find_chunk_for_original_offset(offset),
        }
    }

    /// Lazily iterate every chunk in ordinal order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.chunk_count()).map(move |ordinal| {
            self.get(ordinal)
                .expect("ordinal within 0..chunk_count is always valid")
        })
    }
}

/// Compact representation for the common case: every chunk but the last has
/// identical plaintext and transformed size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedChunkIndex {
    pub original_chunk_size: u32,
    pub original_file_size: u64,
    pub transformed_chunk_size: u32,
    pub transformed_file_size: u64,
}

impl FixedChunkIndex {
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        if self.original_file_size == 0 {
            return 0;
        }
        let size = u64::from(self.original_chunk_size);
        self.original_file_size.div_ceil(size) as u32
    }

    fn is_last(&self, ordinal: u32) -> bool {
        ordinal + 1 == self.chunk_count()
    }

    pub fn get(&self, ordinal: u32) -> Result<Chunk, ChunkIndexError> {
        let count = self.chunk_count();
        if ordinal >= count {
            return Err(ChunkIndexError::OrdinalOutOfRange {
                ordinal,
                chunk_count: count,
            });
        }

        let original_from = u64::from(ordinal) * u64::from(self.original_chunk_size);
        let transformed_from = u64::from(ordinal) * u64::from(self.transformed_chunk_size);

        let original_size = if self.is_last(ordinal) {
            (self.original_file_size - original_from) as u32
        } else {
            self.original_chunk_size
        };
        let transformed_size = if self.is_last(ordinal) {
            (self.transformed_file_size - transformed_from) as u32
        } else {
            self.transformed_chunk_size
        };

        Ok(Chunk {
            ordinal,
            original_from,
            original_size,
            transformed_from,
            transformed_size,
        })
    }

    pub fn find_chunk_for_original_offset(&self, offset: u64) -> Result<Chunk, ChunkIndexError> {
        if offset >= self.original_file_size {
            return Err(ChunkIndexError::OutOfRange {
                offset,
                total: self.original_file_size,
            });
        }
        let ordinal = (offset / u64::from(self.original_chunk_size)) as u32;
        self.get(ordinal)
    }
}

/// Wire-format twin of [`VariableChunkIndex`]. Keeps the on-object-store JSON
/// shape stable while the in-memory type carries a precomputed prefix-sum
/// table that must never itself be serialized (it's derived, and recomputing
/// it on load keeps old manifests readable without a schema bump).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableChunkIndexWire {
    original_chunk_size: u32,
    transformed_chunks: Vec<u32>,
    original_file_size: u64,
}

impl From<VariableChunkIndex> for VariableChunkIndexWire {
    fn from(v: VariableChunkIndex) -> Self {
        VariableChunkIndexWire {
            original_chunk_size: v.original_chunk_size,
            transformed_chunks: v.transformed_chunks,
            original_file_size: v.original_file_size,
        }
    }
}

impl From<VariableChunkIndexWire> for VariableChunkIndex {
    fn from(w: VariableChunkIndexWire) -> Self {
        VariableChunkIndex::new(w.original_chunk_size, w.transformed_chunks, w.original_file_size)
    }
}

/// Explicit per-chunk sizes, used whenever transformed size varies (e.g.
/// compression produces a different size per block). A chunk's transformed
/// offset is an index into a precomputed prefix-sum table rather than a
/// re-sum of every preceding chunk size on each call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VariableChunkIndexWire", into = "VariableChunkIndexWire")]
pub struct VariableChunkIndex {
    original_chunk_size: u32,
    /// Transformed size of each chunk, in ordinal order. Plaintext sizes are
    /// derived: `original_chunk_size` for every chunk but the last, whose
    /// plaintext size is implied by the total (tracked separately so variable
    /// indexes still round-trip exactly).
    transformed_chunks: Vec<u32>,
    original_file_size: u64,
    /// `transformed_prefix[i]` is the sum of `transformed_chunks[..i]`, so
    /// `transformed_prefix.len() == transformed_chunks.len() + 1`. Computed
    /// once at construction and never mutated afterwards.
    transformed_prefix: Vec<u64>,
}

impl VariableChunkIndex {
    #[must_use]
    pub fn new(original_chunk_size: u32, transformed_chunks: Vec<u32>, original_file_size: u64) -> Self {
        let mut transformed_prefix = Vec::with_capacity(transformed_chunks.len() + 1);
        let mut running = 0u64;
        transformed_prefix.push(running);
        for &size in &transformed_chunks {
            running += u64::from(size);
            transformed_prefix.push(running);
        }

        Self {
            original_chunk_size,
            transformed_chunks,
            original_file_size,
            transformed_prefix,
        }
    }

    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        self.transformed_chunks.len() as u32
    }

    fn total_original_size(&self) -> u64 {
        self.original_file_size
    }

    fn total_transformed_size(&self) -> u64 {
        *self.transformed_prefix.last().unwrap_or(&0)
    }

    fn is_last(&self, ordinal: u32) -> bool {
        ordinal + 1 == self.chunk_count()
    }

    fn original_size_of(&self, ordinal: u32) -> u32 {
        let from = u64::from(ordinal) * u64::from(self.original_chunk_size);
        if self.is_last(ordinal) {
            (self.original_file_size - from) as u32
        } else {
            self.original_chunk_size
        }
    }

    pub fn get(&self, ordinal: u32) -> Result<Chunk, ChunkIndexError> {
        let count = self.chunk_count();
        if ordinal >= count {
            return Err(ChunkIndexError::OrdinalOutOfRange {
                ordinal,
                chunk_count: count,
            });
        }

        let original_from = u64::from(ordinal) * u64::from(self.original_chunk_size);
        let transformed_from = self.transformed_prefix[ordinal as usize];

        Ok(Chunk {
            ordinal,
            original_from,
            original_size: self.original_size_of(ordinal),
            transformed_from,
            transformed_size: self.transformed_chunks[ordinal as usize],
        })
    }

    pub fn find_chunk_for_original_offset(&self, offset: u64) -> Result<Chunk, ChunkIndexError> {
        if offset >= self.original_file_size {
            return Err(ChunkIndexError::OutOfRange {
                offset,
                total: self.original_file_size,
            });
        }
        // Chunk sizes only vary on the transformed side (compression); every
        // plaintext chunk but the last is exactly `original_chunk_size`, so
        // the ordinal is still plain arithmetic, not a search.
        let ordinal = (offset / u64::from(self.original_chunk_size)) as u32;
        self.get(ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> ChunkIndex {
        ChunkIndex::Fixed(FixedChunkIndex {
            original_chunk_size: 10,
            original_file_size: 20,
            transformed_chunk_size: 10,
            transformed_file_size: 20,
        })
    }

    fn variable() -> ChunkIndex {
        ChunkIndex::Variable(VariableChunkIndex::new(10, vec![6, 10, 3], 25))
    }

    #[test]
    fn fixed_lookup_by_offset_and_ordinal_agree() {
        let idx = fixed();
        for chunk in idx.chunks() {
            assert_eq!(
                idx.find_chunk_for_original_offset(chunk.original_from).unwrap(),
                chunk
            );
            let last_byte = chunk.original_from + u64::from(chunk.original_size) - 1;
            assert_eq!(idx.find_chunk_for_original_offset(last_byte).unwrap(), chunk);
        }
    }

    #[test]
    fn fixed_last_chunk_may_be_short() {
        let idx = ChunkIndex::Fixed(FixedChunkIndex {
            original_chunk_size: 10,
            original_file_size: 25,
            transformed_chunk_size: 10,
            transformed_file_size: 25,
        });
        assert_eq!(idx.chunk_count(), 3);
        let last = idx.get(2).unwrap();
        assert_eq!(last.original_size, 5);
    }

    #[test]
    fn variable_offsets_use_cumulative_transformed_sizes() {
        let idx = variable();
        let c1 = idx.get(1).unwrap();
        assert_eq!(c1.transformed_from, 6);
        assert_eq!(c1.transformed_size, 10);
        let c2 = idx.get(2).unwrap();
        assert_eq!(c2.transformed_from, 16);
        assert_eq!(c2.original_size, 5);
    }

    #[test]
    fn offset_out_of_range_errs() {
        let idx = fixed();
        assert!(idx.find_chunk_for_original_offset(20).is_err());
    }

    #[test]
    fn totals_match_chunk_sums() {
        let idx = variable();
        assert_eq!(idx.total_transformed_size(), 19);
        assert_eq!(idx.total_original_size(), 25);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Every ordinal's chunk is recovered by looking up its first and last
    /// plaintext byte, for arbitrary fixed-size indexes (invariant 7).
    fn fixed_strategy() -> impl Strategy<Value = FixedChunkIndex> {
        (1u32..=64, 1u64..=2000).prop_map(|(chunk_size, file_size)| FixedChunkIndex {
            original_chunk_size: chunk_size,
            original_file_size: file_size,
            transformed_chunk_size: chunk_size,
            transformed_file_size: file_size,
        })
    }

    proptest! {
        #[test]
        fn fixed_offset_lookup_round_trips(idx in fixed_strategy()) {
            let index = ChunkIndex::Fixed(idx);
            for chunk in index.chunks() {
                prop_assert_eq!(
                    index.find_chunk_for_original_offset(chunk.original_from).unwrap(),
                    chunk
                );
                let last_byte = chunk.original_from + u64::from(chunk.original_size) - 1;
                prop_assert_eq!(index.find_chunk_for_original_offset(last_byte).unwrap(), chunk);
            }
        }

        #[test]
        fn variable_offset_lookup_round_trips(
            original_chunk_size in 1u32..=32,
            transformed_chunks in prop::collection::vec(1u32..=40, 1..20),
        ) {
            // plaintext size of every chunk but the last is `original_chunk_size`;
            // pick a file size consistent with that so the index is well-formed.
            let n = transformed_chunks.len() as u64;
            let last_plain = 1 + (n * 7) % u64::from(original_chunk_size);
            let original_file_size = (n - 1) * u64::from(original_chunk_size) + last_plain;
            let idx = ChunkIndex::Variable(VariableChunkIndex::new(
                original_chunk_size,
                transformed_chunks,
                original_file_size,
            ));
            for chunk in idx.chunks() {
                prop_assert_eq!(
                    idx.find_chunk_for_original_offset(chunk.original_from).unwrap(),
                    chunk
                );
                let last_byte = chunk.original_from + u64::from(chunk.original_size) - 1;
                prop_assert_eq!(idx.find_chunk_for_original_offset(last_byte).unwrap(), chunk);
            }
        }
    }
}

//! The segment manifest: an immutable, serializable descriptor of how a
//! segment was chunked and transformed. See the manifest JSON schema for the
//! stable wire format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::chunk::index::ChunkIndex;
use crate::segment::IndexType;

/// Wrapped data key plus additional authenticated data bound into every
/// chunk's AES-GCM ciphertext.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEncryptionMetadata {
    #[serde(rename = "dataKey")]
    #[serde_as(as = "Base64")]
    pub wrapped_data_key: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub aad: Vec<u8>,
}

/// Byte offsets of each index object within the manifest, keyed by index type.
/// Present only for index types that were actually uploaded; a missing
/// `TRANSACTION` entry means the segment has no transaction index, not that
/// the manifest is malformed.
pub type IndexSizes = HashMap<IndexType, u64>;

/// Immutable descriptor of a segment's on-object-store layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentManifest {
    pub chunk_index: ChunkIndex,
    pub compressed: bool,
    pub encryption: Option<SegmentEncryptionMetadata>,
    pub indexes: Option<IndexSizes>,
}

impl SegmentManifest {
    #[must_use]
    pub fn new(chunk_index: ChunkIndex, compressed: bool, encryption: Option<SegmentEncryptionMetadata>) -> Self {
        Self {
            chunk_index,
            compressed,
            encryption,
            indexes: None,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&ManifestWire::V1 {
            chunk_index: self.chunk_index.clone(),
            compression: self.compressed,
            encryption: self.encryption.clone(),
            segment_indexes: self.indexes.clone(),
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let wire: ManifestWire = serde_json::from_slice(bytes)?;
        let ManifestWire::V1 {
            chunk_index,
            compression,
            encryption,
            segment_indexes,
        } = wire;
        Ok(Self {
            chunk_index,
            compressed: compression,
            encryption,
            indexes: segment_indexes,
        })
    }
}

/// Versioned wire format. Unknown `type` tags are a hard parse error handled
/// by the caller (`ManifestError::VersionUnknown`), never silently ignored.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ManifestWire {
    #[serde(rename = "v1")]
    V1 {
        #[serde(rename = "chunkIndex")]
        chunk_index: ChunkIndex,
        compression: bool,
        encryption: Option<SegmentEncryptionMetadata>,
        #[serde(rename = "segmentIndexes")]
        segment_indexes: Option<IndexSizes>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::index::FixedChunkIndex;

    fn sample_manifest() -> SegmentManifest {
        SegmentManifest::new(
            ChunkIndex::Fixed(FixedChunkIndex {
                original_chunk_size: 1024,
                original_file_size: 3072,
                transformed_chunk_size: 1024,
                transformed_file_size: 3072,
            }),
            false,
            None,
        )
    }

    #[test]
    fn json_round_trips() {
        let manifest = sample_manifest();
        let json = manifest.to_json().unwrap();
        let parsed = SegmentManifest::from_json(&json).unwrap();
        assert_eq!(manifest, parsed);
    }

    #[test]
    fn wire_format_uses_expected_keys() {
        let manifest = sample_manifest();
        let json = String::from_utf8(manifest.to_json().unwrap()).unwrap();
        assert!(json.contains("\"type\":\"v1\""));
        assert!(json.contains("\"chunkIndex\""));
        assert!(json.contains("\"compression\":false"));
    }

    #[test]
    fn encryption_metadata_round_trips_base64() {
        let mut manifest = sample_manifest();
        manifest.encryption = Some(SegmentEncryptionMetadata {
            wrapped_data_key: vec![1, 2, 3, 4],
            aad: vec![9, 9],
        });
        let json = manifest.to_json().unwrap();
        let parsed = SegmentManifest::from_json(&json).unwrap();
        assert_eq!(manifest, parsed);
    }

    #[test]
    fn unknown_version_tag_is_a_parse_error() {
        let bad = br#"{"type":"v99","chunkIndex":{}}"#;
        assert!(SegmentManifest::from_json(bad).is_err());
    }
}

//! Segment identity and the object key layout used to address a segment's
//! uploaded objects in the backing object store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one log segment: topic-partition plus the offset the segment
/// starts at and a UUID disambiguating re-uploads of the same base offset
/// (e.g. after a leader failover).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentId {
    pub topic: String,
    pub partition: u32,
    pub base_offset: u64,
    pub uuid: Uuid,
}

impl SegmentId {
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: u32, base_offset: u64, uuid: Uuid) -> Self {
        Self {
            topic: topic.into(),
            partition,
            base_offset,
            uuid,
        }
    }

    /// `{topic}-{partition}/{segment_base_offset}-{uuid}`, the portion of the
    /// object key layout shared by every suffix.
    #[must_use]
    pub fn path_stem(&self) -> String {
        format!(
            "{}-{}/{}-{}",
            self.topic, self.partition, self.base_offset, self.uuid
        )
    }
}

/// Index types a segment may carry, matching Kafka's own segment index files.
/// `TRANSACTION` is the one index type allowed to be absent: the host-facing
/// `fetch_index` call returns `None` rather than an error for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    Offset,
    Timestamp,
    ProducerSnapshot,
    Transaction,
    LeaderEpoch,
}

impl IndexType {
    #[must_use]
    pub const fn all() -> [IndexType; 5] {
        [
            IndexType::Offset,
            IndexType::Timestamp,
            IndexType::ProducerSnapshot,
            IndexType::Transaction,
            IndexType::LeaderEpoch,
        ]
    }

    #[must_use]
    pub fn object_suffix(self) -> &'static str {
        match self {
            IndexType::Offset => "index",
            IndexType::Timestamp => "timeindex",
            IndexType::ProducerSnapshot => "snapshot",
            IndexType::Transaction => "txnindex",
            IndexType::LeaderEpoch => "leader-epoch-checkpoint",
        }
    }

    /// Whether a missing index of this type is expected rather than an error.
    #[must_use]
    pub fn optional(self) -> bool {
        matches!(self, IndexType::Transaction)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.object_suffix())
    }
}

/// Parses the `SCREAMING_SNAKE_CASE` names used on the wire and in the demo CLI
/// (`OFFSET`, `TIMESTAMP`, `PRODUCER_SNAPSHOT`, `TRANSACTION`, `LEADER_EPOCH`).
impl FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFFSET" => Ok(IndexType::Offset),
            "TIMESTAMP" => Ok(IndexType::Timestamp),
            "PRODUCER_SNAPSHOT" => Ok(IndexType::ProducerSnapshot),
            "TRANSACTION" => Ok(IndexType::Transaction),
            "LEADER_EPOCH" => Ok(IndexType::LeaderEpoch),
            other => Err(format!(
                "unknown index type {other:?} (expected one of OFFSET, TIMESTAMP, PRODUCER_SNAPSHOT, TRANSACTION, LEADER_EPOCH)"
            )),
        }
    }
}

/// The object-key suffix for the segment's log data and its manifest sidecar.
pub const LOG_SUFFIX: &str = "log";
pub const MANIFEST_SUFFIX: &str = "rsm-manifest";

/// Builds fully qualified object keys for a segment under a configured
/// key prefix: `{prefix}/{topic}-{partition}/{segment_base_offset}-{uuid}.{suffix}`.
#[derive(Debug, Clone)]
pub struct SegmentObjectKeys {
    prefix: String,
}

impl SegmentObjectKeys {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    #[must_use]
    pub fn log_key(&self, segment: &SegmentId) -> String {
        self.key_with_suffix(segment, LOG_SUFFIX)
    }

    #[must_use]
    pub fn manifest_key(&self, segment: &SegmentId) -> String {
        self.key_with_suffix(segment, MANIFEST_SUFFIX)
    }

    #[must_use]
    pub fn index_key(&self, segment: &SegmentId, index_type: IndexType) -> String {
        self.key_with_suffix(segment, index_type.object_suffix())
    }

    /// Every object key that `delete_log_segment_data` must remove.
    #[must_use]
    pub fn all_keys(&self, segment: &SegmentId) -> Vec<String> {
        let mut keys = vec![self.log_key(segment), self.manifest_key(segment)];
        keys.extend(IndexType::all().iter().map(|&t| self.index_key(segment, t)));
        keys
    }

    fn key_with_suffix(&self, segment: &SegmentId, suffix: &str) -> String {
        format!("{}/{}.{}", self.prefix.trim_end_matches('/'), segment.path_stem(), suffix)
    }
}

//! Subcommands driving [`tiered_store_core::RemoteStorage`] against a
//! filesystem-backed object store, plus the segment-identity arguments they
//! share.

pub mod cat;
pub mod cp;
pub mod info;
pub mod rm;

use std::path::PathBuf;
use std::str::FromStr;

use clap::Args as ClapArgs;
use tiered_store_core::{IndexType, SegmentId};
use uuid::Uuid;

/// Identifies an existing segment: every field its object key layout needs.
#[derive(Debug, ClapArgs)]
pub struct SegmentRef {
    /// Topic name.
    #[arg(long)]
    pub topic: String,

    /// Partition number.
    #[arg(long, default_value_t = 0)]
    pub partition: u32,

    /// Offset the segment starts at.
    #[arg(long = "base-offset", default_value_t = 0)]
    pub base_offset: u64,

    /// Segment UUID, printed by `cp` when the segment was first uploaded.
    #[arg(long)]
    pub uuid: Uuid,
}

impl SegmentRef {
    #[must_use]
    pub fn to_segment_id(&self) -> SegmentId {
        SegmentId::new(self.topic.clone(), self.partition, self.base_offset, self.uuid)
    }
}

/// Parses a `TYPE=PATH` pair for `cp --index`, e.g. `OFFSET=segment.index`.
pub fn parse_index_arg(raw: &str) -> Result<(IndexType, PathBuf), String> {
    let (ty, path) = raw.split_once('=').ok_or_else(|| format!("expected TYPE=PATH, got {raw:?}"))?;
    let index_type = IndexType::from_str(ty)?;
    Ok((index_type, PathBuf::from(path)))
}

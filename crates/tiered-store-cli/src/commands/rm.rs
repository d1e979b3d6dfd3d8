//! `rm`: delete every object a segment owns (log, indexes, manifest).

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tiered_store_core::RemoteStorage;

use super::SegmentRef;

#[derive(Debug, ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub segment: SegmentRef,
}

pub async fn execute(remote: &RemoteStorage, args: &Args) -> Result<()> {
    let segment = args.segment.to_segment_id();
    remote
        .delete_log_segment_data(&segment)
        .await
        .with_context(|| format!("deleting segment {}", segment.path_stem()))?;
    eprintln!("deleted {}", segment.path_stem());
    Ok(())
}

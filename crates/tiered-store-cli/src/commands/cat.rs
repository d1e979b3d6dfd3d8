//! `cat`: fetch a segment's plaintext bytes, or a sub-range of them, and
//! write them to stdout.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tiered_store_core::RemoteStorage;
use tokio::io::{AsyncWriteExt, stdout};

use super::SegmentRef;

#[derive(Debug, ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub segment: SegmentRef,

    /// First byte to read (inclusive).
    #[arg(long, default_value_t = 0)]
    pub from: u64,

    /// Last byte to read (inclusive). Defaults to the end of the segment.
    #[arg(long)]
    pub to: Option<u64>,
}

pub async fn execute(remote: &RemoteStorage, args: &Args) -> Result<()> {
    let segment = args.segment.to_segment_id();
    let bytes = match args.to {
        Some(to) => remote.fetch_log_segment_range(&segment, args.from, to).await,
        None => remote.fetch_log_segment_from(&segment, args.from).await,
    }
    .with_context(|| format!("fetching segment {}", segment.path_stem()))?;

    stdout().write_all(&bytes).await.context("writing segment bytes to stdout")?;
    Ok(())
}

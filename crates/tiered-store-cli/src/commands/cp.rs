//! `cp`: upload a local file as a new segment's LOG data, plus whichever
//! companion index files were given, and print the resulting segment
//! identity so it can be passed to `cat`/`rm`/`info`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tiered_store_core::{IndexType, RemoteStorage, SegmentData, SegmentId};
use uuid::Uuid;

use super::parse_index_arg;

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Local file holding the segment's plaintext LOG bytes.
    pub file: PathBuf,

    /// Topic name.
    #[arg(long)]
    pub topic: String,

    /// Partition number.
    #[arg(long, default_value_t = 0)]
    pub partition: u32,

    /// Offset the segment starts at.
    #[arg(long = "base-offset", default_value_t = 0)]
    pub base_offset: u64,

    /// Segment UUID to use. A random one is generated if omitted.
    #[arg(long)]
    pub uuid: Option<Uuid>,

    /// Companion index file to upload alongside the log, as TYPE=PATH
    /// (e.g. `--index OFFSET=segment.index`). Repeatable.
    #[arg(long = "index", value_parser = parse_index_arg)]
    pub indexes: Vec<(IndexType, PathBuf)>,
}

pub async fn execute(remote: &RemoteStorage, args: &Args) -> Result<()> {
    let log = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let mut indexes = HashMap::new();
    for (index_type, path) in &args.indexes {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading index file {}", path.display()))?;
        indexes.insert(*index_type, bytes);
    }

    let uuid = args.uuid.unwrap_or_else(Uuid::new_v4);
    let segment = SegmentId::new(args.topic.clone(), args.partition, args.base_offset, uuid);

    remote
        .copy_log_segment(&segment, SegmentData { log, indexes })
        .await
        .with_context(|| format!("uploading segment {}", segment.path_stem()))?;

    let summary = serde_json::json!({
        "topic": args.topic,
        "partition": args.partition,
        "base_offset": args.base_offset,
        "uuid": uuid,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

//! `info`: print a segment's manifest summary and the facade's cache
//! statistics.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use tiered_store_core::RemoteStorage;

use super::SegmentRef;

#[derive(Debug, ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub segment: SegmentRef,
}

#[derive(Serialize)]
struct ManifestSummary {
    chunk_count: u32,
    original_size: u64,
    transformed_size: u64,
    compressed: bool,
    encrypted: bool,
    indexes: Vec<String>,
}

pub async fn execute(remote: &RemoteStorage, args: &Args) -> Result<()> {
    let segment = args.segment.to_segment_id();
    let manifest = remote
        .manifest(&segment)
        .await
        .with_context(|| format!("fetching manifest for segment {}", segment.path_stem()))?;

    let summary = ManifestSummary {
        chunk_count: manifest.chunk_index.chunk_count(),
        original_size: manifest.chunk_index.total_original_size(),
        transformed_size: manifest.chunk_index.total_transformed_size(),
        compressed: manifest.compressed,
        encrypted: manifest.encryption.is_some(),
        indexes: manifest
            .indexes
            .as_ref()
            .map(|m| m.keys().map(ToString::to_string).collect())
            .unwrap_or_default(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let manifest_cache = remote.manifest_cache_stats();
    let chunk_cache = remote.chunk_cache_stats();
    eprintln!(
        "manifest cache: {} hits, {} misses ({:.1}% hit rate)",
        manifest_cache.hits,
        manifest_cache.misses,
        manifest_cache.hit_rate() * 100.0
    );
    eprintln!(
        "chunk cache: {} hits, {} misses ({:.1}% hit rate)",
        chunk_cache.hits,
        chunk_cache.misses,
        chunk_cache.hit_rate() * 100.0
    );
    Ok(())
}

#![deny(unsafe_code)]

mod commands;
mod exit_code;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tiered_store_core::config::{Config, ConfigError};
use tiered_store_core::crypto::envelope::EnvelopeCrypto;
use tiered_store_core::error::TieredStorageError;
use tiered_store_core::object_store::{FsObjectStore, ObjectStore};
use tiered_store_core::RemoteStorage;
use tracing_subscriber::EnvFilter;

use crate::commands::{cat, cp, info, rm};

/// Demo command-line driver for the tiered storage plug-in core: exercises
/// the segment transform pipeline and chunk fetch cache end to end against a
/// filesystem-backed object store stand-in.
#[derive(Parser)]
#[command(name = "tiered-store")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Upload a log segment, printing its generated UUID
    tiered-store --store-root ./store cp segment.log --topic orders --partition 0 --base-offset 0

    # Read it back
    tiered-store --store-root ./store cat --topic orders --partition 0 --base-offset 0 --uuid <uuid>

    # Compressed and encrypted
    tiered-store --store-root ./store --compress --encrypt --public-key-file pub.pem --private-key-file priv.pem \\
        cp segment.log --topic orders --partition 0 --base-offset 0
")]
struct Cli {
    /// Local directory standing in for the object-store backend.
    #[arg(long, global = true)]
    store_root: PathBuf,

    /// Object-key prefix every segment is uploaded under.
    #[arg(long, default_value = "tiered", global = true)]
    key_prefix: String,

    /// Plaintext chunk size in bytes.
    #[arg(long, default_value_t = 1_048_576, global = true)]
    chunk_size: u32,

    /// Compress each chunk with zstd before encryption.
    #[arg(long, global = true)]
    compress: bool,

    /// Skip compression when the segment already looks compressed.
    #[arg(long, global = true)]
    compress_heuristic: bool,

    /// Envelope-encrypt each chunk's payload.
    #[arg(long, global = true)]
    encrypt: bool,

    /// PEM-encoded RSA public key used to wrap the per-segment data key.
    #[arg(long, global = true)]
    public_key_file: Option<PathBuf>,

    /// PEM-encoded RSA private key used to unwrap the per-segment data key.
    #[arg(long, global = true)]
    private_key_file: Option<PathBuf>,

    /// Chunk cache capacity in bytes (-1 = unbounded).
    #[arg(long, default_value_t = -1, global = true)]
    chunk_cache_size: i64,

    /// Chunk cache retention in milliseconds (-1 = no expiry).
    #[arg(long, default_value_t = -1, global = true)]
    chunk_cache_retention_ms: i64,

    /// Directory to materialize cached chunks on disk (memory-only if unset).
    #[arg(long, global = true)]
    chunk_cache_path: Option<PathBuf>,

    /// Manifest cache capacity, entries (-1 = unbounded).
    #[arg(long, default_value_t = -1, global = true)]
    manifest_cache_size: i64,

    /// Manifest cache retention in milliseconds (-1 = no expiry).
    #[arg(long, default_value_t = -1, global = true)]
    manifest_cache_retention_ms: i64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file as a new segment's LOG data.
    Cp(cp::Args),
    /// Fetch segment bytes (optionally a sub-range) to stdout.
    Cat(cat::Args),
    /// Delete every object a segment owns.
    Rm(rm::Args),
    /// Show manifest and cache statistics for a segment.
    Info(info::Args),
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::from(exit_code::GENERAL_ERROR);
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = build_config(&cli).context("building configuration")?;
    let crypto = build_crypto(&cli).context("loading encryption keys")?;
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&cli.store_root));
    let remote = RemoteStorage::new(config, store, crypto);

    match &cli.command {
        Commands::Cp(args) => cp::execute(&remote, args).await,
        Commands::Cat(args) => cat::execute(&remote, args).await,
        Commands::Rm(args) => rm::execute(&remote, args).await,
        Commands::Info(args) => info::execute(&remote, args).await,
    }
}

fn build_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut raw = HashMap::new();
    raw.insert("chunk.size".to_string(), cli.chunk_size.to_string());
    raw.insert("key.prefix".to_string(), cli.key_prefix.clone());
    raw.insert("compression.enabled".to_string(), cli.compress.to_string());
    raw.insert("compression.heuristic.enabled".to_string(), cli.compress_heuristic.to_string());
    raw.insert("encryption.enabled".to_string(), cli.encrypt.to_string());
    raw.insert("chunk.cache.size".to_string(), cli.chunk_cache_size.to_string());
    raw.insert("chunk.cache.retention.ms".to_string(), cli.chunk_cache_retention_ms.to_string());
    raw.insert("segment.manifest.cache.size".to_string(), cli.manifest_cache_size.to_string());
    raw.insert(
        "segment.manifest.cache.retention.ms".to_string(),
        cli.manifest_cache_retention_ms.to_string(),
    );
    if let Some(path) = &cli.chunk_cache_path {
        raw.insert("chunk.cache.path".to_string(), path.display().to_string());
    }
    if let Some(path) = &cli.public_key_file {
        raw.insert("encryption.public.key.file".to_string(), path.display().to_string());
    }
    if let Some(path) = &cli.private_key_file {
        raw.insert("encryption.private.key.file".to_string(), path.display().to_string());
    }

    Config::from_map(&raw)
}

fn build_crypto(cli: &Cli) -> Result<Option<EnvelopeCrypto>> {
    if !cli.encrypt {
        return Ok(None);
    }

    match (&cli.public_key_file, &cli.private_key_file) {
        (Some(public_path), Some(private_path)) => {
            let public_key = read_public_key(public_path)?;
            let private_key = read_private_key(private_path)?;
            Ok(Some(EnvelopeCrypto::new(public_key, private_key)))
        }
        (None, Some(private_path)) => {
            let private_key = read_private_key(private_path)?;
            Ok(Some(EnvelopeCrypto::from_private_key(private_key)))
        }
        (Some(public_path), None) => {
            let public_key = read_public_key(public_path)?;
            Ok(Some(EnvelopeCrypto::from_public_key(public_key)))
        }
        (None, None) => anyhow::bail!("--encrypt requires --public-key-file and/or --private-key-file"),
    }
}

fn read_private_key(path: &std::path::Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    RsaPrivateKey::from_pkcs1_pem(&pem).with_context(|| format!("parsing RSA private key from {}", path.display()))
}

fn read_public_key(path: &std::path::Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    RsaPublicKey::from_pkcs1_pem(&pem).with_context(|| format!("parsing RSA public key from {}", path.display()))
}

/// Set up tracing/logging based on verbosity level.
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting,
/// rather than matching on the rendered message text.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(storage_err) = cause.downcast_ref::<TieredStorageError>() {
            match storage_err {
                TieredStorageError::Backend(tiered_store_core::error::BackendError::Permanent { .. }) => {
                    return exit_code::NOT_FOUND;
                }
                TieredStorageError::Manifest(_) => return exit_code::NOT_FOUND,
                TieredStorageError::Crypto(_) => return exit_code::CRYPTO_ERROR,
                TieredStorageError::Config(_) => return exit_code::CONFIG_ERROR,
                TieredStorageError::EncryptionNotConfigured => return exit_code::CONFIG_ERROR,
                _ => {}
            }
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_code::CONFIG_ERROR;
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::NotFound {
                return exit_code::NOT_FOUND;
            }
        }
    }
    exit_code::GENERAL_ERROR
}

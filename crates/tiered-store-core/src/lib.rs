//! Core of the tiered storage plug-in: the segment transform pipeline and
//! chunk fetch caches that let a remote object store stand in for local disk
//! for cold log segments, while preserving positional read semantics.
//!
//! This crate implements the host-independent pieces only; a production
//! object-store driver, the host's own configuration parsing, metrics
//! reporting, key-file loading, and the host plug-in adapter that exposes
//! [`manifest::SegmentManifest`]-backed reads through the host's
//! remote-storage interface live in the `tiered-store-cli` demo crate or,
//! in production, the host integration.

pub mod chunk;
pub mod chunk_cache;
pub mod chunk_manager;
pub mod config;
pub mod crypto;
pub mod error;
pub mod manifest;
pub mod manifest_provider;
pub mod object_store;
pub mod range_assembler;
pub mod remote_storage;
pub mod segment;
pub mod stats;
pub mod transform;

pub use chunk::index::ChunkIndex;
pub use chunk::{BytesRange, Chunk, ChunkKey};
pub use chunk_cache::ChunkCache;
pub use chunk_manager::ChunkManager;
pub use config::Config;
pub use manifest::SegmentManifest;
pub use manifest_provider::ManifestProvider;
pub use range_assembler::RangeAssembler;
pub use remote_storage::{RemoteStorage, SegmentData};
pub use segment::{IndexType, SegmentId};

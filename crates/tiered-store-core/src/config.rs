//! Typed configuration, parsed once at startup from the flat key/value map the
//! host supplies (the host's own config file/property parsing is out of
//! scope; this module only validates and types the already-extracted values).

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// `-1` is the universal sentinel for "unbounded"/"no expiry" in every size
/// and retention key below.
const UNBOUNDED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound<T> {
    Unbounded,
    Limited(T),
}

impl Bound<u64> {
    fn parse_size(key: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let value: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "not an integer",
        })?;
        match value {
            UNBOUNDED => Ok(Bound::Unbounded),
            v if v >= 0 => Ok(Bound::Limited(v as u64)),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw.to_string(),
                reason: "must be >= 0 or the sentinel -1",
            }),
        }
    }
}

impl Bound<Duration> {
    fn parse_retention_ms(key: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let value: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "not an integer",
        })?;
        match value {
            UNBOUNDED => Ok(Bound::Unbounded),
            v if v >= 0 => Ok(Bound::Limited(Duration::from_millis(v as u64))),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw.to_string(),
                reason: "must be >= 0 or the sentinel -1",
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkCacheConfig {
    pub size: Bound<u64>,
    pub retention: Bound<Duration>,
    pub path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ManifestCacheConfig {
    pub size: Bound<u64>,
    pub retention: Bound<Duration>,
}

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub heuristic_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub enabled: bool,
    pub public_key_file: Option<std::path::PathBuf>,
    pub private_key_file: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chunk_size: u32,
    pub compression: CompressionConfig,
    pub encryption: EncryptionConfig,
    pub key_prefix: String,
    pub chunk_cache: ChunkCacheConfig,
    pub manifest_cache: ManifestCacheConfig,
}

impl Config {
    /// Parse from the flat string map the host exposes its configuration as.
    /// Unrecognized keys are ignored; missing keys with no sensible default
    /// (`chunk.size`, `key.prefix`) are a hard error.
    pub fn from_map(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let chunk_size = get(raw, "chunk.size")?
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "chunk.size",
                value: get(raw, "chunk.size").unwrap_or_default(),
                reason: "not a positive integer",
            })?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunk.size",
                value: "0".to_string(),
                reason: "must be greater than zero",
            });
        }

        let compression = CompressionConfig {
            enabled: get_bool(raw, "compression.enabled", false)?,
            heuristic_enabled: get_bool(raw, "compression.heuristic.enabled", false)?,
        };

        let encryption = EncryptionConfig {
            enabled: get_bool(raw, "encryption.enabled", false)?,
            public_key_file: raw.get("encryption.public.key.file").map(Into::into),
            private_key_file: raw.get("encryption.private.key.file").map(Into::into),
        };

        let key_prefix = get(raw, "key.prefix")?;

        let chunk_cache = ChunkCacheConfig {
            size: match raw.get("chunk.cache.size") {
                Some(v) => Bound::<u64>::parse_size("chunk.cache.size", v)?,
                None => Bound::Unbounded,
            },
            retention: match raw.get("chunk.cache.retention.ms") {
                Some(v) => Bound::<Duration>::parse_retention_ms("chunk.cache.retention.ms", v)?,
                None => Bound::Unbounded,
            },
            path: raw.get("chunk.cache.path").map(Into::into),
        };

        let manifest_cache = ManifestCacheConfig {
            size: match raw.get("segment.manifest.cache.size") {
                Some(v) => Bound::<u64>::parse_size("segment.manifest.cache.size", v)?,
                None => Bound::Unbounded,
            },
            retention: match raw.get("segment.manifest.cache.retention.ms") {
                Some(v) => Bound::<Duration>::parse_retention_ms("segment.manifest.cache.retention.ms", v)?,
                None => Bound::Unbounded,
            },
        };

        Ok(Self {
            chunk_size,
            compression,
            encryption,
            key_prefix,
            chunk_cache,
            manifest_cache,
        })
    }
}

fn get(raw: &HashMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    raw.get(key).cloned().ok_or(ConfigError::MissingKey(key))
}

fn get_bool(raw: &HashMap<String, String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match raw.get(key) {
        None => Ok(default),
        Some(v) => v.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
            key,
            value: v.clone(),
            reason: "expected true or false",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("chunk.size".to_string(), "1048576".to_string());
        m.insert("key.prefix".to_string(), "tiered".to_string());
        m
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg = Config::from_map(&base_map()).unwrap();
        assert_eq!(cfg.chunk_size, 1_048_576);
        assert!(!cfg.compression.enabled);
        assert!(!cfg.encryption.enabled);
        assert_eq!(cfg.chunk_cache.size, Bound::Unbounded);
    }

    #[test]
    fn missing_chunk_size_is_an_error() {
        let mut m = base_map();
        m.remove("chunk.size");
        assert!(matches!(
            Config::from_map(&m),
            Err(ConfigError::MissingKey("chunk.size"))
        ));
    }

    #[test]
    fn negative_sentinel_means_unbounded() {
        let mut m = base_map();
        m.insert("chunk.cache.size".to_string(), "-1".to_string());
        let cfg = Config::from_map(&m).unwrap();
        assert_eq!(cfg.chunk_cache.size, Bound::Unbounded);
    }

    #[test]
    fn other_negative_values_are_rejected() {
        let mut m = base_map();
        m.insert("chunk.cache.size".to_string(), "-2".to_string());
        assert!(Config::from_map(&m).is_err());
    }

    #[test]
    fn retention_ms_parses_to_duration() {
        let mut m = base_map();
        m.insert("chunk.cache.retention.ms".to_string(), "5000".to_string());
        let cfg = Config::from_map(&m).unwrap();
        assert_eq!(cfg.chunk_cache.retention, Bound::Limited(Duration::from_millis(5000)));
    }
}

// In: src/config.rs

//! The single source of truth for all chunk retrieval configuration.
//!
//! `ChunkConfig` is created once when a result is opened (from the driver's
//! connection settings or a JSON document) and then shared read-only through
//! an `Arc<ChunkConfig>` by the downloader and the parsers.
//!
//! Version selectors are closed enums deserialized through `TryFrom<u8>`, so an
//! unsupported value is rejected while the configuration is read, never at
//! first use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};

//==================================================================================
// I. Strategy Selectors
//==================================================================================

/// Selects which JSON dialect parser turns a chunk body into rows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChunkParserVersion {
    /// Deserializes the whole body into a JSON document first, then copies leaves.
    WholeBuffer,
    /// Single forward pass over the token stream.
    #[default]
    Streaming,
    /// Streaming pass into a chunk arena pre-sized from the declared uncompressed size.
    ReusableStreaming,
}

impl TryFrom<u8> for ChunkParserVersion {
    type Error = ChunkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::WholeBuffer),
            2 => Ok(Self::Streaming),
            3 => Ok(Self::ReusableStreaming),
            other => Err(ChunkError::Configuration(format!(
                "Unsupported Chunk Parser version specified in the configuration: {}",
                other
            ))),
        }
    }
}

impl From<ChunkParserVersion> for u8 {
    fn from(value: ChunkParserVersion) -> u8 {
        match value {
            ChunkParserVersion::WholeBuffer => 1,
            ChunkParserVersion::Streaming => 2,
            ChunkParserVersion::ReusableStreaming => 3,
        }
    }
}

/// Selects how remote chunks are scheduled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChunkDownloaderVersion {
    /// No background work: each chunk is fetched when the cursor asks for it.
    OnDemand,
    /// Background fetches with bounded concurrency; finished chunks are buffered.
    Concurrent,
    /// Background fetches that hold their concurrency slot until the chunk is
    /// consumed, bounding both in-flight and buffered chunks.
    #[default]
    Prefetch,
}

impl TryFrom<u8> for ChunkDownloaderVersion {
    type Error = ChunkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::OnDemand),
            2 => Ok(Self::Concurrent),
            3 => Ok(Self::Prefetch),
            other => Err(ChunkError::Configuration(format!(
                "Unsupported Chunk Downloader version specified in the configuration: {}",
                other
            ))),
        }
    }
}

impl From<ChunkDownloaderVersion> for u8 {
    fn from(value: ChunkDownloaderVersion) -> u8 {
        match value {
            ChunkDownloaderVersion::OnDemand => 1,
            ChunkDownloaderVersion::Concurrent => 2,
            ChunkDownloaderVersion::Prefetch => 3,
        }
    }
}

//==================================================================================
// II. The Unified ChunkConfig
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChunkConfig {
    #[serde(default)]
    pub chunk_parser_version: ChunkParserVersion,

    #[serde(default)]
    pub chunk_downloader_version: ChunkDownloaderVersion,

    /// Number of chunks fetched in parallel (and, for `Prefetch`, held ahead of the cursor).
    #[serde(default = "default_prefetch_threads")]
    pub prefetch_threads: usize,

    /// Extra attempts after the first failed fetch of a chunk.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Remote JSON chunk bodies arrive as `[..],[..]` without the enclosing
    /// brackets; when set, the downloader supplies them.
    #[serde(default = "default_true")]
    pub wrap_remote_json: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_parser_version: ChunkParserVersion::default(),
            chunk_downloader_version: ChunkDownloaderVersion::default(),
            prefetch_threads: default_prefetch_threads(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            wrap_remote_json: true,
        }
    }
}

impl ChunkConfig {
    /// Reads and validates a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ChunkConfig = serde_json::from_str(json).map_err(|e| {
            // serde wraps our TryFrom message; surface it as a configuration failure.
            ChunkError::Configuration(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from raw version numbers, as handed over by a
    /// connection-string provider.
    pub fn from_versions(parser: u8, downloader: u8, prefetch_threads: usize) -> Result<Self> {
        let config = ChunkConfig {
            chunk_parser_version: ChunkParserVersion::try_from(parser)?,
            chunk_downloader_version: ChunkDownloaderVersion::try_from(downloader)?,
            prefetch_threads,
            ..ChunkConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefetch_threads == 0 {
            return Err(ChunkError::Configuration(
                "prefetch_threads must be at least 1".to_string(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ChunkError::Configuration(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_prefetch_threads() -> usize {
    4
}

fn default_max_retries() -> u32 {
    7
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    16_000
}

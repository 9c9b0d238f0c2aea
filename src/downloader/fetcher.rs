//! The byte-fetch seam between the downloader and the transport layer.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// One GET of a remote chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub url: String,
    /// Extra request headers (e.g. server-side encryption keys).
    pub headers: HashMap<String, String>,
}

/// Fetches the full body of a remote chunk.
///
/// Implementations report retryable faults (timeouts, 5xx, dropped
/// connections) as `ChunkError::TransientIo`; any other error is surfaced to
/// the consumer without retry. `cancel` fires when the result is closed, and a
/// long fetch should stop promptly when it does.
#[async_trait]
pub trait ChunkFetcher: Send + Sync + 'static {
    async fn fetch(&self, request: &ChunkRequest, cancel: &CancellationToken) -> Result<Bytes>;
}

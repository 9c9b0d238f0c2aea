//! This module is the background chunk downloader.
//!
//! Remote chunks are fetched and parsed on a tokio runtime and handed to the
//! consumer strictly in chunk order. Each chunk owns a one-shot slot; workers
//! fill slots in whatever order they finish and the consumer always waits on
//! the lowest undelivered one.
//!
//! Three scheduling strategies are available (`ChunkDownloaderVersion`):
//!
//! - `OnDemand`: no background work. A chunk is fetched when asked for.
//! - `Concurrent`: a dispatcher starts fetches in index order, at most
//!   `prefetch_threads` at once. Finished chunks wait in their slots.
//! - `Prefetch`: like `Concurrent`, but a worker's concurrency permit travels
//!   with its chunk and is only released once the consumer moves past it, so
//!   in-flight plus buffered chunks never exceed `prefetch_threads`.
//!
//! Transient fetch failures are retried with backoff; parse failures are not.

pub mod fetcher;
pub mod payload;
pub mod retry;

pub use fetcher::{ChunkFetcher, ChunkRequest};
pub use retry::RetryPolicy;

use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chunk::{ChunkMeta, ResultChunk};
use crate::config::{ChunkConfig, ChunkDownloaderVersion};
use crate::error::{ChunkError, Result};
use crate::parser::{ChunkBuffer, ChunkParser, ResultFormat};
use crate::types::ColumnMeta;

/// Lifecycle of one remote chunk's download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkJobState {
    Pending,
    Downloading,
    Parsed,
    Failed,
}

type Delivery = (Box<dyn ResultChunk>, Option<OwnedSemaphorePermit>);
type Slot = oneshot::Receiver<Result<Delivery>>;

/// Everything a worker needs, shared read-only across tasks.
struct DownloadContext {
    fetcher: Arc<dyn ChunkFetcher>,
    parser: ChunkParser,
    format: ResultFormat,
    columns: Arc<[ColumnMeta]>,
    headers: HashMap<String, String>,
    retry: RetryPolicy,
    wrap_json: bool,
    cancel: CancellationToken,
    states: Mutex<Vec<ChunkJobState>>,
}

impl DownloadContext {
    fn set_state(&self, position: usize, state: ChunkJobState) {
        if let Some(slot) = self.states.lock().get_mut(position) {
            *slot = state;
        }
    }
}

fn cancelled() -> ChunkError {
    ChunkError::Cancelled("chunk download was cancelled".to_string())
}

//==================================================================================
// 1. Worker: fetch, decode, parse, retry
//==================================================================================

/// Parses on the blocking pool and hands the buffer back for reuse.
async fn parse_blocking(
    ctx: &DownloadContext,
    mut buffer: ChunkBuffer,
    body: Bytes,
) -> Result<(ChunkBuffer, Result<()>)> {
    let parser = ctx.parser;
    let columns = ctx.columns.clone();
    let format = ctx.format;
    let wrap_json = ctx.wrap_json;
    let handle = tokio::task::spawn_blocking(move || {
        let parsed = payload::decode_payload(body, buffer.meta()).and_then(|body| {
            let reader = payload::body_reader(&body, format, wrap_json);
            parser.parse_into(reader, &columns, &mut buffer)
        });
        (buffer, parsed)
    });
    Ok(handle.await?)
}

/// Downloads one chunk, retrying transient failures. The chunk buffer is
/// allocated once and reset before every attempt.
async fn download_chunk(
    ctx: &DownloadContext,
    position: usize,
    meta: ChunkMeta,
) -> Result<Box<dyn ResultChunk>> {
    let index = meta.index;
    let request = ChunkRequest {
        url: meta.url.clone(),
        headers: ctx.headers.clone(),
    };
    let mut buffer = ChunkBuffer::new(ctx.format, meta);
    let mut retry = 0;
    ctx.set_state(position, ChunkJobState::Downloading);

    loop {
        buffer.reset();
        let fetched = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(cancelled()),
            body = ctx.fetcher.fetch(&request, &ctx.cancel) => body,
        };
        let outcome = match fetched {
            Ok(body) => {
                let (returned, parsed) = parse_blocking(ctx, buffer, body).await?;
                buffer = returned;
                parsed
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                ctx.set_state(position, ChunkJobState::Parsed);
                crate::log_metric!("event" = "chunk_parsed", "chunk" = index, "retries" = retry);
                return Ok(buffer.into_chunk());
            }
            Err(e) if e.is_retryable() && retry < ctx.retry.max_retries => {
                let delay = ctx.retry.delay(retry);
                log::warn!(
                    "chunk {} fetch failed (attempt {}), retrying in {:?}: {}",
                    index,
                    retry + 1,
                    delay,
                    e
                );
                crate::log_metric!("event" = "chunk_retry", "chunk" = index, "delay_ms" = delay.as_millis());
                retry += 1;
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        ctx.set_state(position, ChunkJobState::Failed);
                        return Err(cancelled());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                ctx.set_state(position, ChunkJobState::Failed);
                log::error!("chunk {} failed after {} retries: {}", index, retry, e);
                return Err(e);
            }
        }
    }
}

//==================================================================================
// 2. Dispatcher (Concurrent / Prefetch)
//==================================================================================

async fn dispatch(
    ctx: Arc<DownloadContext>,
    strategy: ChunkDownloaderVersion,
    metas: Vec<ChunkMeta>,
    senders: Vec<oneshot::Sender<Result<Delivery>>>,
    permits: Arc<Semaphore>,
) {
    for (position, (meta, sender)) in metas.into_iter().zip(senders).enumerate() {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        crate::log_metric!("event" = "chunk_dispatched", "chunk" = meta.index);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = download_chunk(&ctx, position, meta).await;
            let delivery = result.map(|chunk| match strategy {
                ChunkDownloaderVersion::Prefetch => (chunk, Some(permit)),
                _ => {
                    drop(permit);
                    (chunk, None)
                }
            });
            // The consumer may already be gone; the chunk is simply dropped then.
            let _ = sender.send(delivery);
        });
    }
}

//==================================================================================
// 3. The Consumer-Facing Downloader
//==================================================================================

/// Inputs for a download session.
pub struct DownloadPlan {
    /// Remote chunks in result order.
    pub chunks: Vec<ChunkMeta>,
    pub format: ResultFormat,
    pub columns: Arc<[ColumnMeta]>,
    pub headers: HashMap<String, String>,
}

pub struct ChunkDownloader {
    strategy: ChunkDownloaderVersion,
    ctx: Arc<DownloadContext>,
    metas: Vec<ChunkMeta>,
    slots: Vec<Option<Slot>>,
    next_position: usize,
    /// The permit of the last delivered chunk under `Prefetch`.
    held_permit: Option<OwnedSemaphorePermit>,
    runtime: Handle,
    dispatcher: Option<JoinHandle<()>>,
}

impl ChunkDownloader {
    /// Starts a session. Under `Concurrent` and `Prefetch` background fetching
    /// begins immediately on `runtime`.
    pub fn start(
        config: &ChunkConfig,
        plan: DownloadPlan,
        fetcher: Arc<dyn ChunkFetcher>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = config.chunk_downloader_version;
        let count = plan.chunks.len();
        let ctx = Arc::new(DownloadContext {
            fetcher,
            parser: ChunkParser::new(config.chunk_parser_version),
            format: plan.format,
            columns: plan.columns,
            headers: plan.headers,
            retry: RetryPolicy::from_config(config),
            wrap_json: config.wrap_remote_json,
            cancel: CancellationToken::new(),
            states: Mutex::new(vec![ChunkJobState::Pending; count]),
        });

        let mut slots = Vec::with_capacity(count);
        let mut dispatcher = None;
        if strategy != ChunkDownloaderVersion::OnDemand && count > 0 {
            let mut senders = Vec::with_capacity(count);
            for _ in 0..count {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                slots.push(Some(rx));
            }
            let permits = Arc::new(Semaphore::new(config.prefetch_threads));
            dispatcher = Some(runtime.spawn(dispatch(
                ctx.clone(),
                strategy,
                plan.chunks.clone(),
                senders,
                permits,
            )));
        }

        log::debug!(
            "chunk downloader started: {} remote chunks, strategy {:?}, {} prefetch threads",
            count,
            strategy,
            config.prefetch_threads
        );
        Ok(Self {
            strategy,
            ctx,
            metas: plan.chunks,
            slots,
            next_position: 0,
            held_permit: None,
            runtime,
            dispatcher,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.metas.len()
    }

    pub fn strategy(&self) -> ChunkDownloaderVersion {
        self.strategy
    }

    pub fn job_state(&self, position: usize) -> Option<ChunkJobState> {
        self.ctx.states.lock().get(position).copied()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Stops all background work; pending and future waits fail with `Cancelled`.
    pub fn cancel(&self) {
        self.ctx.cancel.cancel();
    }

    /// Waits for the next chunk in result order. `Ok(None)` once all are delivered.
    pub async fn next_chunk_async(&mut self) -> Result<Option<Box<dyn ResultChunk>>> {
        // The consumer has moved past the previously delivered chunk.
        self.held_permit = None;

        let position = self.next_position;
        if position >= self.metas.len() {
            return Ok(None);
        }
        if self.ctx.cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.next_position += 1;

        let chunk = match self.strategy {
            ChunkDownloaderVersion::OnDemand => {
                let ctx = self.ctx.clone();
                let meta = self.metas[position].clone();
                let task = self
                    .runtime
                    .spawn(async move { download_chunk(&ctx, position, meta).await });
                tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => return Err(cancelled()),
                    joined = task => joined??,
                }
            }
            ChunkDownloaderVersion::Concurrent | ChunkDownloaderVersion::Prefetch => {
                let slot = self.slots[position].take().ok_or_else(|| {
                    ChunkError::Internal(format!("chunk slot {} was already consumed", position))
                })?;
                let delivered = tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => return Err(cancelled()),
                    delivered = slot => delivered,
                };
                match delivered {
                    Ok(Ok((chunk, permit))) => {
                        self.held_permit = permit;
                        chunk
                    }
                    Ok(Err(e)) => return Err(e),
                    // The worker went away without reporting: only cancellation does that.
                    Err(_) => return Err(cancelled()),
                }
            }
        };

        crate::log_metric!("event" = "chunk_delivered", "chunk" = chunk.chunk_index(), "rows" = chunk.row_count());
        Ok(Some(chunk))
    }

    /// Blocking form of `next_chunk_async`. Must not be called from inside an
    /// async task; all fetching still runs on the downloader's runtime.
    pub fn next_chunk(&mut self) -> Result<Option<Box<dyn ResultChunk>>> {
        futures::executor::block_on(self.next_chunk_async())
    }
}

impl Drop for ChunkDownloader {
    fn drop(&mut self) {
        self.ctx.cancel.cancel();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }
}

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::codec::RawCell;
use crate::config::{ChunkConfig, ChunkDownloaderVersion};
use crate::error::{ChunkError, ErrorKind, Result};
use crate::types::{ColumnMeta, LogicalType};

//==================================================================================
// Test helpers
//==================================================================================

/// An in-memory fetcher with per-URL bodies, delays and scripted transient failures.
#[derive(Default)]
struct ScriptedFetcher {
    bodies: HashMap<String, Bytes>,
    delays: HashMap<String, Duration>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies
            .insert(url.to_string(), Bytes::copy_from_slice(body));
        self
    }

    fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    fn with_failures(self, url: &str, count: u32) -> Self {
        self.failures.lock().insert(url.to_string(), count);
        self
    }

    fn calls(&self, url: &str) -> u32 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ChunkFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &ChunkRequest, cancel: &CancellationToken) -> Result<Bytes> {
        *self.calls.lock().entry(request.url.clone()).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&request.url).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(ChunkError::Cancelled("fetch aborted".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&request.url) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(ChunkError::TransientIo(format!("503 from {}", request.url)));
        }
        self.bodies
            .get(&request.url)
            .cloned()
            .ok_or_else(|| ChunkError::TransientIo(format!("404 from {}", request.url)))
    }
}

fn init_test_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn config(strategy: ChunkDownloaderVersion, threads: usize, retries: u32) -> ChunkConfig {
    ChunkConfig {
        chunk_downloader_version: strategy,
        prefetch_threads: threads,
        max_retries: retries,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        ..ChunkConfig::default()
    }
}

fn url(i: usize) -> String {
    format!("https://stage.example/chunk_{}", i)
}

/// `count` one-row, one-column chunks whose only cell is the chunk position.
fn numbered_fetcher(count: usize) -> ScriptedFetcher {
    (0..count).fold(ScriptedFetcher::default(), |f, i| {
        f.with_body(&url(i), format!(r#"["{}"]"#, i).as_bytes())
    })
}

fn plan(count: usize) -> DownloadPlan {
    let columns: Arc<[ColumnMeta]> = vec![ColumnMeta::new("N", LogicalType::Text, 0)].into();
    DownloadPlan {
        chunks: (0..count)
            .map(|i| ChunkMeta::remote(i as i32 + 1, url(i), 1, 0))
            .collect(),
        format: ResultFormat::Json,
        columns,
        headers: HashMap::new(),
    }
}

fn first_cell(chunk: &dyn ResultChunk) -> String {
    match chunk.extract_cell_at(0, 0).unwrap() {
        RawCell::Text(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
        other => panic!("unexpected cell {:?}", other),
    }
}

fn failure(result: Result<Option<Box<dyn ResultChunk>>>) -> ChunkError {
    match result {
        Err(e) => e,
        Ok(_) => panic!("expected the chunk to fail"),
    }
}

async fn drain(downloader: &mut ChunkDownloader) -> Vec<String> {
    let mut seen = Vec::new();
    while let Some(chunk) = downloader.next_chunk_async().await.unwrap() {
        seen.push(first_cell(chunk.as_ref()));
    }
    seen
}

const ALL_STRATEGIES: [ChunkDownloaderVersion; 3] = [
    ChunkDownloaderVersion::OnDemand,
    ChunkDownloaderVersion::Concurrent,
    ChunkDownloaderVersion::Prefetch,
];

//==================================================================================
// Ordering and scheduling
//==================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunks_are_delivered_in_order_when_completing_in_reverse() {
    for strategy in ALL_STRATEGIES {
        // Earlier chunks take longer, so workers finish back to front.
        let fetcher = (0..6).fold(numbered_fetcher(6), |f, i| {
            f.with_delay(&url(i), Duration::from_millis(5 * (6 - i as u64)))
        });
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 4, 0),
            plan(6),
            Arc::new(fetcher),
            Handle::current(),
        )
        .unwrap();

        let seen = drain(&mut downloader).await;
        assert_eq!(seen, vec!["0", "1", "2", "3", "4", "5"], "{:?}", strategy);
        assert!(downloader.next_chunk_async().await.unwrap().is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chunk_indices_follow_the_plan() {
    let mut downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Prefetch, 2, 0),
        plan(3),
        Arc::new(numbered_fetcher(3)),
        Handle::current(),
    )
    .unwrap();
    let mut indices = Vec::new();
    while let Some(chunk) = downloader.next_chunk_async().await.unwrap() {
        assert_eq!(chunk.row_count(), 1);
        indices.push(chunk.chunk_index());
    }
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(downloader.job_state(2), Some(ChunkJobState::Parsed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_on_demand_fetches_nothing_until_asked() {
    let fetcher = Arc::new(numbered_fetcher(3));
    let mut downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::OnDemand, 4, 0),
        plan(3),
        fetcher.clone(),
        Handle::current(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fetcher.total_calls(), 0);
    assert_eq!(downloader.job_state(0), Some(ChunkJobState::Pending));

    let chunk = downloader.next_chunk_async().await.unwrap().unwrap();
    assert_eq!(first_cell(chunk.as_ref()), "0");
    assert_eq!(fetcher.total_calls(), 1);
    assert_eq!(downloader.job_state(1), Some(ChunkJobState::Pending));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_ahead_of_the_consumer() {
    let fetcher = Arc::new(numbered_fetcher(8));
    let downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Concurrent, 2, 0),
        plan(8),
        fetcher.clone(),
        Handle::current(),
    )
    .unwrap();

    // Nobody consumes, yet every chunk gets fetched and buffered.
    for _ in 0..100 {
        if fetcher.total_calls() == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fetcher.total_calls(), 8);
    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
    drop(downloader);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prefetch_bounds_work_ahead_of_the_consumer() {
    let fetcher = Arc::new(numbered_fetcher(8));
    let mut downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Prefetch, 2, 0),
        plan(8),
        fetcher.clone(),
        Handle::current(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.total_calls(), 2);

    // Taking chunk 0 keeps its slot busy; moving on to chunk 1 frees it.
    let first = downloader.next_chunk_async().await.unwrap().unwrap();
    assert_eq!(first_cell(first.as_ref()), "0");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.total_calls(), 2);

    let second = downloader.next_chunk_async().await.unwrap().unwrap();
    assert_eq!(first_cell(second.as_ref()), "1");
    for _ in 0..50 {
        if fetcher.total_calls() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fetcher.total_calls(), 3);

    let rest = drain(&mut downloader).await;
    assert_eq!(rest, vec!["2", "3", "4", "5", "6", "7"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_plan_ends_immediately() {
    for strategy in ALL_STRATEGIES {
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 2, 0),
            plan(0),
            Arc::new(ScriptedFetcher::default()),
            Handle::current(),
        )
        .unwrap();
        assert_eq!(downloader.chunk_count(), 0);
        assert!(downloader.next_chunk_async().await.unwrap().is_none());
    }
}

//==================================================================================
// Retry and failure propagation
//==================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transient_failures_are_retried() {
    init_test_logging();
    for strategy in ALL_STRATEGIES {
        let fetcher = Arc::new(numbered_fetcher(2).with_failures(&url(1), 2));
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 2, 3),
            plan(2),
            fetcher.clone(),
            Handle::current(),
        )
        .unwrap();

        assert_eq!(drain(&mut downloader).await, vec!["0", "1"]);
        assert_eq!(fetcher.calls(&url(0)), 1);
        assert_eq!(fetcher.calls(&url(1)), 3);
        assert_eq!(downloader.job_state(1), Some(ChunkJobState::Parsed));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_retries_surface_the_transient_error() {
    let fetcher = Arc::new(numbered_fetcher(1).with_failures(&url(0), 10));
    let mut downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Concurrent, 2, 2),
        plan(1),
        fetcher.clone(),
        Handle::current(),
    )
    .unwrap();

    let err = failure(downloader.next_chunk_async().await);
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert_eq!(fetcher.calls(&url(0)), 3);
    assert_eq!(downloader.job_state(0), Some(ChunkJobState::Failed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parse_failures_are_not_retried() {
    for strategy in ALL_STRATEGIES {
        // Two rows where the descriptor declares one.
        let fetcher = Arc::new(ScriptedFetcher::default().with_body(&url(0), br#"["a"],["b"]"#));
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 2, 5),
            plan(1),
            fetcher.clone(),
            Handle::current(),
        )
        .unwrap();

        let err = failure(downloader.next_chunk_async().await);
        assert_eq!(err.kind(), ErrorKind::StructuralParse, "{:?}", strategy);
        assert_eq!(fetcher.calls(&url(0)), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_compressed_bodies_are_decoded() {
    let body = zstd::encode_all(&br#"["x","y"],["z",null]"#[..], 0).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::default().with_body(&url(0), &body));
    let mut plan = plan(1);
    plan.columns = vec![
        ColumnMeta::new("A", LogicalType::Text, 0),
        ColumnMeta::new("B", LogicalType::Text, 0),
    ]
    .into();
    plan.chunks[0].expected_rows = Some(2);

    let mut downloader = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Prefetch, 1, 0),
        plan,
        fetcher,
        Handle::current(),
    )
    .unwrap();
    let chunk = downloader.next_chunk_async().await.unwrap().unwrap();
    assert_eq!(chunk.row_count(), 2);
    assert_eq!(chunk.column_count(), 2);
    assert!(chunk.extract_cell_at(1, 1).unwrap().is_null());
}

//==================================================================================
// Cancellation and the blocking API
//==================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_interrupts_a_waiting_consumer() {
    for strategy in ALL_STRATEGIES {
        let fetcher =
            Arc::new(numbered_fetcher(2).with_delay(&url(0), Duration::from_secs(3600)));
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 2, 0),
            plan(2),
            fetcher,
            Handle::current(),
        )
        .unwrap();

        let token = downloader.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = failure(downloader.next_chunk_async().await);
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{:?}", strategy);
        let again = failure(downloader.next_chunk_async().await);
        assert_eq!(again.kind(), ErrorKind::Cancelled);
    }
}

#[test]
fn test_blocking_api_from_a_plain_thread() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    for strategy in ALL_STRATEGIES {
        let mut downloader = ChunkDownloader::start(
            &config(strategy, 3, 0),
            plan(5),
            Arc::new(numbered_fetcher(5)),
            runtime.handle().clone(),
        )
        .unwrap();

        let mut seen = Vec::new();
        while let Some(chunk) = downloader.next_chunk().unwrap() {
            seen.push(first_cell(chunk.as_ref()));
        }
        assert_eq!(seen, vec!["0", "1", "2", "3", "4"]);
    }
}

#[test]
fn test_invalid_config_is_rejected_at_start() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let result = ChunkDownloader::start(
        &config(ChunkDownloaderVersion::Prefetch, 0, 0),
        plan(1),
        Arc::new(numbered_fetcher(1)),
        runtime.handle().clone(),
    );
    assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::Configuration));
}

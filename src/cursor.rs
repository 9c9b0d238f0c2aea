//! This module provides `ResultCursor`, the row-by-row reader over a whole
//! result: the inline first chunk followed by every remote chunk in order.
//!
//! Chunks are retained once delivered so that `rewind` can walk back across
//! chunk boundaries. Retention is unbounded until `close`: a cursor holds
//! every row it has read, so the prefetch limit only bounds chunks that are
//! downloaded ahead of the reader, not the cursor's own footprint.
//!
//! Cell access goes through the codec with the column's declared type and
//! scale; typed getters return `Ok(None)` for SQL NULL.
//!
//! A chunk that fails to download or to match the declared columns stops the
//! cursor. Every later `next` reports that failure again rather than skipping
//! to the following chunk; rows already read can still be rewound over.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use hashbrown::HashMap;
use rust_decimal::Decimal;
use tokio::runtime::Handle;

use crate::chunk::{ChunkMeta, ResultChunk};
use crate::codec::{self, RawCell};
use crate::config::ChunkConfig;
use crate::downloader::{ChunkDownloader, ChunkFetcher, DownloadPlan};
use crate::error::{ChunkError, ErrorKind, Result};
use crate::parser::ChunkParser;
use crate::response::QueryResultResponse;
use crate::types::{CellValue, ColumnMeta, NativeType};

pub struct ResultCursor {
    columns: Arc<[ColumnMeta]>,
    /// Lower-cased column name to its first position.
    by_name: HashMap<String, usize>,
    retained: Vec<Box<dyn ResultChunk>>,
    current: usize,
    downloader: Option<ChunkDownloader>,
    /// No chunk remains to be delivered.
    exhausted: bool,
    row_count_hint: usize,
    closed: bool,
    /// Class and message of the chunk failure that stopped forward movement.
    failed: Option<(ErrorKind, String)>,
}

impl ResultCursor {
    /// Opens a cursor over `response`.
    ///
    /// Column types are resolved and the inline chunk is parsed before this
    /// returns; remote chunks start downloading according to `config`.
    pub fn open(
        response: &QueryResultResponse,
        config: &ChunkConfig,
        fetcher: Arc<dyn ChunkFetcher>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let columns: Arc<[ColumnMeta]> = response.columns()?.into();
        let format = response.query_result_format;

        let mut retained = Vec::new();
        if let Some(payload) = response.inline_payload()? {
            let mut meta = ChunkMeta::inline();
            meta.index = 0;
            let chunk = ChunkParser::new(config.chunk_parser_version).parse_chunk(
                payload.as_slice(),
                format,
                meta,
                &columns,
            )?;
            check_shape(chunk.as_ref(), &columns)?;
            retained.push(chunk);
        }
        let inline_rows = retained.first().map_or(0, |c| c.row_count());

        let remote = response.remote_chunks();
        let downloader = if remote.is_empty() {
            None
        } else {
            Some(ChunkDownloader::start(
                config,
                DownloadPlan {
                    chunks: remote,
                    format,
                    columns: columns.clone(),
                    headers: response.chunk_headers(),
                },
                fetcher,
                runtime,
            )?)
        };

        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            by_name.entry(column.name.to_lowercase()).or_insert(i);
        }

        log::debug!(
            "opened result {}: {} columns, {} inline rows, {} remote chunks",
            response.query_id.as_deref().unwrap_or("<unknown>"),
            columns.len(),
            inline_rows,
            response.chunks.len()
        );
        Ok(Self {
            row_count_hint: response.declared_rows(inline_rows),
            columns,
            by_name,
            retained,
            current: 0,
            exhausted: downloader.is_none(),
            downloader,
            closed: false,
            failed: None,
        })
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Position of the column named `name`, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    /// Rows in the inline chunk plus the rows declared for the remote ones.
    pub fn row_count_hint(&self) -> usize {
        self.row_count_hint
    }

    pub fn has_rows(&self) -> bool {
        self.row_count_hint > 0
    }

    //==================================================================================
    // Movement
    //==================================================================================

    /// Advances through chunks already delivered. `None` means the next
    /// chunk has to be pulled from the downloader.
    fn advance_retained(&mut self) -> Option<bool> {
        while let Some(chunk) = self.retained.get_mut(self.current) {
            if chunk.next() {
                return Some(true);
            }
            if self.current + 1 >= self.retained.len() {
                break;
            }
            self.current += 1;
        }
        if self.exhausted {
            Some(false)
        } else {
            None
        }
    }

    fn accept(&mut self, chunk: Option<Box<dyn ResultChunk>>) -> Result<()> {
        match chunk {
            Some(chunk) => {
                check_shape(chunk.as_ref(), &self.columns)?;
                self.current = self.retained.len();
                self.retained.push(chunk);
            }
            None => self.exhausted = true,
        }
        Ok(())
    }

    /// Records `err` as the failure that stops the cursor and hands it back.
    fn halt(&mut self, err: ChunkError) -> ChunkError {
        log::warn!("result cursor stopped: {}", err);
        self.failed = Some((err.kind(), err.to_string()));
        err
    }

    fn ensure_moving(&self) -> Result<()> {
        self.ensure_open()?;
        match &self.failed {
            Some((kind, message)) => Err(ChunkError::of_kind(
                *kind,
                format!("the result cursor stopped on an earlier chunk failure: {}", message),
            )),
            None => Ok(()),
        }
    }

    /// Moves to the next row, blocking while its chunk downloads. Must not be
    /// called from inside an async task; use `next_async` there.
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_moving()?;
        loop {
            if let Some(moved) = self.advance_retained() {
                return Ok(moved);
            }
            let pulled = match self.downloader.as_mut() {
                Some(downloader) => downloader.next_chunk(),
                None => Ok(None),
            };
            if let Err(err) = pulled.and_then(|chunk| self.accept(chunk)) {
                return Err(self.halt(err));
            }
        }
    }

    pub async fn next_async(&mut self) -> Result<bool> {
        self.ensure_moving()?;
        loop {
            if let Some(moved) = self.advance_retained() {
                return Ok(moved);
            }
            let pulled = match self.downloader.as_mut() {
                Some(downloader) => downloader.next_chunk_async().await,
                None => Ok(None),
            };
            if let Err(err) = pulled.and_then(|chunk| self.accept(chunk)) {
                return Err(self.halt(err));
            }
        }
    }

    /// Moves to the previous row, crossing back into earlier chunks.
    pub fn rewind(&mut self) -> Result<bool> {
        self.ensure_open()?;
        loop {
            let Some(chunk) = self.retained.get_mut(self.current) else {
                return Ok(false);
            };
            if chunk.rewind() {
                return Ok(true);
            }
            if self.current == 0 {
                return Ok(false);
            }
            self.current -= 1;
        }
    }

    /// Stops background downloads and releases every retained chunk.
    pub fn close(&mut self) {
        if let Some(downloader) = self.downloader.take() {
            downloader.cancel();
        }
        for chunk in &mut self.retained {
            chunk.clear();
        }
        self.retained.clear();
        self.closed = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ChunkError::CursorState("the result cursor is closed".to_string()));
        }
        Ok(())
    }

    //==================================================================================
    // Cell access
    //==================================================================================

    fn column(&self, col: usize) -> Result<&ColumnMeta> {
        self.columns.get(col).ok_or_else(|| {
            ChunkError::IndexRange(format!(
                "column {} is outside a result of {} columns",
                col,
                self.columns.len()
            ))
        })
    }

    /// The undecoded cell of column `col` in the current row.
    pub fn raw_cell(&self, col: usize) -> Result<RawCell<'_>> {
        self.ensure_open()?;
        self.column(col)?;
        match self.retained.get(self.current) {
            Some(chunk) => chunk.extract_cell(col),
            None => Err(ChunkError::CursorState(
                "the cursor is not positioned on a row".to_string(),
            )),
        }
    }

    pub fn is_null(&self, col: usize) -> Result<bool> {
        Ok(self.raw_cell(col)?.is_null())
    }

    /// The cell in its declared type's default native form.
    pub fn get_value(&self, col: usize) -> Result<CellValue> {
        let column = self.column(col)?;
        codec::decode_default(self.raw_cell(col)?, column.logical_type, column.scale)
    }

    pub fn get_value_as(&self, col: usize, target: NativeType) -> Result<CellValue> {
        let column = self.column(col)?;
        codec::decode(self.raw_cell(col)?, column.logical_type, column.scale, target)
    }

    fn typed<T>(
        &self,
        col: usize,
        target: NativeType,
        pick: impl FnOnce(CellValue) -> Option<T>,
    ) -> Result<Option<T>> {
        let value = self.get_value_as(col, target)?;
        if value.is_null() {
            return Ok(None);
        }
        let shape = value.type_name();
        pick(value).map(Some).ok_or_else(|| {
            ChunkError::Internal(format!("codec produced {} for target {}", shape, target))
        })
    }

    pub fn get_bool(&self, col: usize) -> Result<Option<bool>> {
        self.typed(col, NativeType::Boolean, |v| match v {
            CellValue::Boolean(b) => Some(b),
            _ => None,
        })
    }

    pub fn get_i8(&self, col: usize) -> Result<Option<i8>> {
        self.typed(col, NativeType::Int8, |v| match v {
            CellValue::Int(i) => i8::try_from(i).ok(),
            _ => None,
        })
    }

    pub fn get_i16(&self, col: usize) -> Result<Option<i16>> {
        self.typed(col, NativeType::Int16, |v| match v {
            CellValue::Int(i) => i16::try_from(i).ok(),
            _ => None,
        })
    }

    pub fn get_i32(&self, col: usize) -> Result<Option<i32>> {
        self.typed(col, NativeType::Int32, |v| match v {
            CellValue::Int(i) => i32::try_from(i).ok(),
            _ => None,
        })
    }

    pub fn get_i64(&self, col: usize) -> Result<Option<i64>> {
        self.typed(col, NativeType::Int64, |v| match v {
            CellValue::Int(i) => Some(i),
            _ => None,
        })
    }

    pub fn get_decimal(&self, col: usize) -> Result<Option<Decimal>> {
        self.typed(col, NativeType::Decimal, |v| match v {
            CellValue::Decimal(d) => Some(d),
            _ => None,
        })
    }

    pub fn get_f64(&self, col: usize) -> Result<Option<f64>> {
        self.typed(col, NativeType::Double, |v| match v {
            CellValue::Double(f) => Some(f),
            _ => None,
        })
    }

    pub fn get_string(&self, col: usize) -> Result<Option<String>> {
        self.typed(col, NativeType::String, |v| match v {
            CellValue::Text(s) => Some(s),
            _ => None,
        })
    }

    pub fn get_date(&self, col: usize) -> Result<Option<NaiveDate>> {
        self.typed(col, NativeType::Date, |v| match v {
            CellValue::Date(d) => Some(d),
            _ => None,
        })
    }

    pub fn get_time(&self, col: usize) -> Result<Option<NaiveTime>> {
        self.typed(col, NativeType::Time, |v| match v {
            CellValue::Time(t) => Some(t),
            _ => None,
        })
    }

    pub fn get_datetime(&self, col: usize) -> Result<Option<NaiveDateTime>> {
        self.typed(col, NativeType::DateTime, |v| match v {
            CellValue::Timestamp(ts) => Some(ts),
            _ => None,
        })
    }

    pub fn get_datetime_offset(&self, col: usize) -> Result<Option<DateTime<FixedOffset>>> {
        self.typed(col, NativeType::DateTimeOffset, |v| match v {
            CellValue::TimestampOffset(ts) => Some(ts),
            _ => None,
        })
    }

    /// Copies up to `length` bytes of the field, starting at `field_offset`,
    /// into `buffer[buffer_offset..]` and returns the number copied. Without a
    /// buffer, returns the full field length. NULL reads as zero bytes.
    pub fn get_bytes(
        &self,
        col: usize,
        field_offset: usize,
        buffer: Option<&mut [u8]>,
        buffer_offset: usize,
        length: usize,
    ) -> Result<usize> {
        let Some(field) = self.typed(col, NativeType::Bytes, |v| match v {
            CellValue::Binary(bytes) => Some(bytes),
            _ => None,
        })?
        else {
            return Ok(0);
        };
        let Some(buffer) = buffer else {
            return Ok(field.len());
        };
        if field_offset >= field.len() {
            return Ok(0);
        }
        let count = length.min(field.len() - field_offset);
        let end = buffer_offset
            .checked_add(count)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                ChunkError::IndexRange(format!(
                    "copying {} bytes at offset {} overruns a buffer of {}",
                    count,
                    buffer_offset,
                    buffer.len()
                ))
            })?;
        buffer[buffer_offset..end].copy_from_slice(&field[field_offset..field_offset + count]);
        Ok(count)
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if let Some(downloader) = &self.downloader {
            downloader.cancel();
        }
    }
}

/// A non-empty chunk must carry exactly the declared columns.
fn check_shape(chunk: &dyn ResultChunk, columns: &[ColumnMeta]) -> Result<()> {
    if chunk.row_count() > 0 && chunk.column_count() != columns.len() {
        return Err(ChunkError::StructuralParse(format!(
            "chunk {} has {} columns but the result declares {}",
            chunk.chunk_index(),
            chunk.column_count(),
            columns.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::writer::StreamWriter;
    use arrow::record_batch::RecordBatch;
    use async_trait::async_trait;
    use base64::Engine;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::ChunkDownloaderVersion;
    use crate::downloader::ChunkRequest;

    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, Bytes>,
        calls: AtomicUsize,
    }

    impl MapFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies
                .insert(url.to_string(), Bytes::copy_from_slice(body.as_bytes()));
            self
        }
    }

    #[async_trait]
    impl ChunkFetcher for MapFetcher {
        async fn fetch(&self, request: &ChunkRequest, _cancel: &CancellationToken) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .get(&request.url)
                .cloned()
                .ok_or_else(|| ChunkError::TransientIo(format!("no body for {}", request.url)))
        }
    }

    const RESPONSE: &str = r#"{
        "rowtype": [
            {"name": "Id", "type": "FIXED", "scale": 0},
            {"name": "Amount", "type": "FIXED", "scale": 2},
            {"name": "Label", "type": "TEXT"}
        ],
        "rowset": [["1", "12.34", "one"]],
        "chunks": [
            {"url": "c1", "rowCount": 2},
            {"url": "c2", "rowCount": 0},
            {"url": "c3", "rowCount": 2}
        ],
        "queryId": "q-1"
    }"#;

    fn fetcher() -> MapFetcher {
        MapFetcher::default()
            .with("c1", r#"["2","-0.50","two"],["3",null,"three"]"#)
            .with("c2", "")
            .with("c3", r#"["4","100.00",null],["5","0.01","five"]"#)
    }

    fn open_with(config: &ChunkConfig, response: &str, fetcher: Arc<MapFetcher>, runtime: &tokio::runtime::Runtime) -> Result<ResultCursor> {
        let response = QueryResultResponse::from_json_str(response)?;
        ResultCursor::open(&response, config, fetcher, runtime.handle().clone())
    }

    fn ids(cursor: &ResultCursor) -> i64 {
        cursor.get_i64(0).unwrap().unwrap()
    }

    #[test]
    fn test_cursor_walks_inline_and_remote_chunks_both_ways() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        for strategy in [
            ChunkDownloaderVersion::OnDemand,
            ChunkDownloaderVersion::Concurrent,
            ChunkDownloaderVersion::Prefetch,
        ] {
            let config = ChunkConfig {
                chunk_downloader_version: strategy,
                ..ChunkConfig::default()
            };
            let mut cursor = open_with(&config, RESPONSE, Arc::new(fetcher()), &runtime).unwrap();
            assert!(cursor.has_rows());
            assert_eq!(cursor.row_count_hint(), 5);

            let mut forward = Vec::new();
            while cursor.next().unwrap() {
                forward.push(ids(&cursor));
            }
            assert_eq!(forward, vec![1, 2, 3, 4, 5], "{:?}", strategy);
            assert!(!cursor.next().unwrap());

            let mut backward = Vec::new();
            while cursor.rewind().unwrap() {
                backward.push(ids(&cursor));
            }
            assert_eq!(backward, vec![5, 4, 3, 2, 1]);
            assert!(!cursor.rewind().unwrap());
        }
    }

    #[test]
    fn test_typed_getters_follow_declared_types() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut cursor = open_with(&ChunkConfig::default(), RESPONSE, Arc::new(fetcher()), &runtime).unwrap();

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_value(0).unwrap(), CellValue::Int(1));
        assert_eq!(cursor.get_i8(0).unwrap(), Some(1));
        assert_eq!(cursor.get_decimal(1).unwrap(), Some(Decimal::new(1234, 2)));
        assert_eq!(cursor.get_value(1).unwrap(), CellValue::Decimal(Decimal::new(1234, 2)));
        assert_eq!(cursor.get_string(2).unwrap().as_deref(), Some("one"));
        assert_eq!(cursor.get_f64(1).unwrap(), Some(12.34));

        assert!(cursor.next().unwrap());
        assert!(cursor.next().unwrap());
        assert!(cursor.is_null(1).unwrap());
        assert_eq!(cursor.get_decimal(1).unwrap(), None);
        assert_eq!(cursor.get_value(1).unwrap(), CellValue::Null);

        let err = cursor.get_date(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cursor = open_with(&ChunkConfig::default(), RESPONSE, Arc::new(fetcher()), &runtime).unwrap();
        assert_eq!(cursor.column_index("AMOUNT"), Some(1));
        assert_eq!(cursor.column_index("label"), Some(2));
        assert_eq!(cursor.column_index("missing"), None);
        assert_eq!(cursor.columns().len(), 3);
    }

    #[test]
    fn test_cell_access_needs_a_row_and_a_valid_column() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut cursor = open_with(&ChunkConfig::default(), RESPONSE, Arc::new(fetcher()), &runtime).unwrap();
        assert_eq!(cursor.get_value(0).unwrap_err().kind(), ErrorKind::CursorState);

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_value(3).unwrap_err().kind(), ErrorKind::IndexRange);

        assert!(!cursor.rewind().unwrap());
        assert_eq!(cursor.get_value(0).unwrap_err().kind(), ErrorKind::CursorState);
    }

    #[test]
    fn test_unknown_type_fails_before_any_fetch() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(fetcher());
        let response = RESPONSE.replace(r#""type": "TEXT""#, r#""type": "GEOGRAPHY""#);
        let err = open_with(&ChunkConfig::default(), &response, fetcher.clone(), &runtime)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remote_chunk_with_wrong_width_is_rejected() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let broken = MapFetcher::default()
            .with("c1", r#"["2","1.00"],["3","2.00"]"#)
            .with("c2", "")
            .with("c3", "");
        let mut cursor = open_with(&ChunkConfig::default(), RESPONSE, Arc::new(broken), &runtime).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.next().unwrap_err().kind(), ErrorKind::StructuralParse);
        assert_eq!(cursor.next().unwrap_err().kind(), ErrorKind::StructuralParse);
    }

    #[test]
    fn test_failed_chunk_stops_the_cursor_instead_of_skipping_rows() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        for strategy in [
            ChunkDownloaderVersion::OnDemand,
            ChunkDownloaderVersion::Concurrent,
            ChunkDownloaderVersion::Prefetch,
        ] {
            let config = ChunkConfig {
                chunk_downloader_version: strategy,
                max_retries: 0,
                ..ChunkConfig::default()
            };
            // c1 declares two rows but carries one.
            let short = fetcher().with("c1", r#"["2","-0.50","two"]"#);
            let mut cursor = open_with(&config, RESPONSE, Arc::new(short), &runtime).unwrap();
            assert!(cursor.next().unwrap());
            assert_eq!(ids(&cursor), 1);

            let first = cursor.next().unwrap_err();
            assert_eq!(first.kind(), ErrorKind::StructuralParse, "{:?}", strategy);
            for _ in 0..3 {
                let again = cursor.next().unwrap_err();
                assert_eq!(again.kind(), ErrorKind::StructuralParse);
                assert!(again.to_string().contains("earlier chunk failure"));
            }

            assert!(cursor.rewind().unwrap());
            assert_eq!(ids(&cursor), 1);
            assert!(!cursor.rewind().unwrap());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_chunk_stops_async_iteration() {
        let response = QueryResultResponse::from_json_str(RESPONSE).unwrap();
        let short = fetcher().with("c1", r#"["2","-0.50","two"]"#);
        let config = ChunkConfig {
            max_retries: 0,
            ..ChunkConfig::default()
        };
        let mut cursor = ResultCursor::open(&response, &config, Arc::new(short), Handle::current()).unwrap();

        let mut seen = Vec::new();
        let failure = loop {
            match cursor.next_async().await {
                Ok(true) => seen.push(ids(&cursor)),
                Ok(false) => panic!("iteration ended after {:?}", seen),
                Err(err) => break err,
            }
        };
        assert_eq!(seen, vec![1]);
        assert_eq!(failure.kind(), ErrorKind::StructuralParse);
        assert_eq!(cursor.next_async().await.unwrap_err().kind(), ErrorKind::StructuralParse);
    }

    #[test]
    fn test_get_bytes_copies_windows_of_the_field() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let response = r#"{
            "rowtype": [{"name": "B", "type": "BINARY"}],
            "rowset": [["48656C6C6F"], [null]]
        }"#;
        let mut cursor = open_with(&ChunkConfig::default(), response, Arc::new(MapFetcher::default()), &runtime).unwrap();
        assert!(cursor.next().unwrap());

        assert_eq!(cursor.get_bytes(0, 0, None, 0, 0).unwrap(), 5);
        let mut buffer = [0u8; 8];
        assert_eq!(cursor.get_bytes(0, 1, Some(&mut buffer), 2, 3).unwrap(), 3);
        assert_eq!(&buffer[2..5], b"ell");
        assert_eq!(cursor.get_bytes(0, 3, Some(&mut buffer), 0, 10).unwrap(), 2);
        assert_eq!(&buffer[..2], b"lo");
        assert_eq!(cursor.get_bytes(0, 9, Some(&mut buffer), 0, 1).unwrap(), 0);
        assert_eq!(
            cursor.get_bytes(0, 0, Some(&mut buffer), 6, 5).unwrap_err().kind(),
            ErrorKind::IndexRange
        );

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_bytes(0, 0, None, 0, 0).unwrap(), 0);
    }

    #[test]
    fn test_timestamps_read_from_text_cells() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let response = r#"{
            "rowtype": [
                {"name": "NTZ", "type": "TIMESTAMP_NTZ", "scale": 3},
                {"name": "TZ", "type": "TIMESTAMP_TZ", "scale": 3},
                {"name": "D", "type": "DATE"}
            ],
            "rowset": [["1689292800.500", "1689292800.500 1500", "1689292800000"]]
        }"#;
        let mut cursor = open_with(&ChunkConfig::default(), response, Arc::new(MapFetcher::default()), &runtime).unwrap();
        assert!(cursor.next().unwrap());

        let day = NaiveDate::from_ymd_opt(2023, 7, 14).unwrap();
        assert_eq!(
            cursor.get_datetime(0).unwrap(),
            Some(day.and_hms_milli_opt(0, 0, 0, 500).unwrap())
        );
        let tz = cursor.get_datetime_offset(1).unwrap().unwrap();
        assert_eq!(tz.timestamp(), 1_689_292_800);
        assert_eq!(tz.timestamp_subsec_millis(), 500);
        assert_eq!(tz.offset().local_minus_utc(), 3600);
        assert_eq!(cursor.get_date(2).unwrap(), Some(day));
    }

    #[test]
    fn test_arrow_inline_rowset() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("N", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![Some(7), None, Some(-9)]))],
        )
        .unwrap();
        let mut ipc = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut ipc, &schema).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }
        let response = format!(
            r#"{{"rowtype": [{{"name": "N", "type": "FIXED", "scale": 0}}],
                "queryResultFormat": "arrow",
                "rowsetBase64": "{}"}}"#,
            base64::engine::general_purpose::STANDARD.encode(&ipc)
        );

        let mut cursor = open_with(&ChunkConfig::default(), &response, Arc::new(MapFetcher::default()), &runtime).unwrap();
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push(cursor.get_i64(0).unwrap());
        }
        assert_eq!(seen, vec![Some(7), None, Some(-9)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_iteration_and_close() {
        let response = QueryResultResponse::from_json_str(RESPONSE).unwrap();
        let mut cursor = ResultCursor::open(
            &response,
            &ChunkConfig::default(),
            Arc::new(fetcher()),
            Handle::current(),
        )
        .unwrap();

        let mut count = 0;
        while cursor.next_async().await.unwrap() {
            count += 1;
        }
        assert_eq!(count, 5);

        cursor.close();
        assert_eq!(cursor.next_async().await.unwrap_err().kind(), ErrorKind::CursorState);
        assert_eq!(cursor.rewind().unwrap_err().kind(), ErrorKind::CursorState);
    }
}

//! This module turns a chunk body into a populated `ResultChunk`.
//!
//! The JSON dialect is handled by one of the configured parser versions; the
//! columnar dialect always goes through arrow IPC ingestion. Parsers only
//! establish row and column boundaries and null-vs-present status. Cell
//! content is validated later, by the codec, when it is read.

pub mod batch_ingest;
pub mod streaming;
pub mod whole_buffer;

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::chunk::{BatchChunk, ChunkMeta, ResultChunk, TextChunk};
use crate::config::ChunkParserVersion;
use crate::error::Result;
use crate::types::ColumnMeta;

/// The wire dialect of a result's chunks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Json,
    Arrow,
}

/// A chunk under construction, in the storage form of its dialect.
#[derive(Debug)]
pub enum ChunkBuffer {
    Text(TextChunk),
    Batch(BatchChunk),
}

impl ChunkBuffer {
    pub fn new(format: ResultFormat, meta: ChunkMeta) -> Self {
        match format {
            ResultFormat::Json => ChunkBuffer::Text(TextChunk::new(meta)),
            ResultFormat::Arrow => ChunkBuffer::Batch(BatchChunk::new(meta)),
        }
    }

    pub fn meta(&self) -> &ChunkMeta {
        match self {
            ChunkBuffer::Text(chunk) => chunk.meta(),
            ChunkBuffer::Batch(chunk) => chunk.meta(),
        }
    }

    /// Drops whatever a failed attempt left behind, keeping the allocation.
    pub fn reset(&mut self) {
        let meta = self.meta().clone();
        match self {
            ChunkBuffer::Text(chunk) => chunk.reset(meta),
            ChunkBuffer::Batch(chunk) => chunk.reset(meta),
        }
    }

    pub fn into_chunk(self) -> Box<dyn ResultChunk> {
        match self {
            ChunkBuffer::Text(chunk) => Box::new(chunk),
            ChunkBuffer::Batch(chunk) => Box::new(chunk),
        }
    }
}

/// The configured parser, selected once from `ChunkParserVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParser {
    version: ChunkParserVersion,
}

impl ChunkParser {
    pub fn new(version: ChunkParserVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> ChunkParserVersion {
        self.version
    }

    /// Parses `reader` into `buffer`. The buffer must be freshly created or reset.
    pub fn parse_into<R: Read>(
        &self,
        reader: R,
        columns: &[ColumnMeta],
        buffer: &mut ChunkBuffer,
    ) -> Result<()> {
        match buffer {
            ChunkBuffer::Batch(chunk) => batch_ingest::ingest(reader, columns, chunk),
            ChunkBuffer::Text(chunk) => match self.version {
                ChunkParserVersion::WholeBuffer => whole_buffer::parse(reader, chunk),
                ChunkParserVersion::Streaming => streaming::parse(reader, chunk),
                ChunkParserVersion::ReusableStreaming => {
                    let hint = usize::try_from(chunk.meta().uncompressed_size).unwrap_or(0);
                    chunk.reserve_bytes(hint);
                    streaming::parse(reader, chunk)
                }
            },
        }
    }

    /// Convenience for the inline and test paths: build, parse and box a chunk.
    pub fn parse_chunk<R: Read>(
        &self,
        reader: R,
        format: ResultFormat,
        meta: ChunkMeta,
        columns: &[ColumnMeta],
    ) -> Result<Box<dyn ResultChunk>> {
        let mut buffer = ChunkBuffer::new(format, meta);
        self.parse_into(reader, columns, &mut buffer)?;
        Ok(buffer.into_chunk())
    }
}

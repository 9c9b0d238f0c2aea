//! This module defines the `ResultChunk` contract: one contiguous slice of a
//! result's rows with a bidirectional cursor and raw cell extraction.
//!
//! Two storage forms implement it. `TextChunk` holds row-major byte spans
//! produced by the JSON parsers; `BatchChunk` holds arrow `RecordBatch`es
//! appended by the columnar ingester. Both share the cursor state machine
//!
//! ```text
//! BeforeFirst --next--> Positioned(0) --next--> ... Positioned(n-1) --next--> AfterLast
//!             <-rewind-                <-rewind- ...                <-rewind-
//! ```
//!
//! A chunk is written by exactly one parser and then read by exactly one
//! cursor; it is never shared between threads concurrently.

pub mod batch_chunk;
pub mod text_chunk;

pub use batch_chunk::BatchChunk;
pub use text_chunk::TextChunk;

use std::fmt;

use crate::codec::RawCell;
use crate::error::{ChunkError, Result};

/// Descriptor of a chunk's place in the result and its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkMeta {
    /// Position among the result's chunks; `-1` for the inline chunk.
    pub index: i32,
    /// Row count declared by the server. `None` when not known up front (inline rowsets).
    pub expected_rows: Option<usize>,
    pub uncompressed_size: u64,
    /// Empty for the inline chunk.
    pub url: String,
}

impl ChunkMeta {
    pub fn inline() -> Self {
        Self {
            index: -1,
            ..Self::default()
        }
    }

    pub fn remote(index: i32, url: impl Into<String>, rows: usize, uncompressed_size: u64) -> Self {
        Self {
            index,
            expected_rows: Some(rows),
            uncompressed_size,
            url: url.into(),
        }
    }
}

/// Where a chunk's cursor currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    BeforeFirst,
    Positioned(usize),
    AfterLast,
}

/// The storage-independent chunk contract consumed by `ResultCursor`.
pub trait ResultChunk: Send + fmt::Debug {
    fn meta(&self) -> &ChunkMeta;

    fn chunk_index(&self) -> i32 {
        self.meta().index
    }

    fn url(&self) -> &str {
        &self.meta().url
    }

    fn uncompressed_size(&self) -> u64 {
        self.meta().uncompressed_size
    }

    /// Logical rows held; empty batches contribute nothing.
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn cursor_state(&self) -> CursorState;

    /// Advances one row. Returns `false` (and stands after the last row) when
    /// no row follows.
    fn next(&mut self) -> bool;

    /// Steps back one row. Returns `false` (and stands before the first row)
    /// when no row precedes.
    fn rewind(&mut self) -> bool;

    fn current_row(&self) -> Option<usize> {
        match self.cursor_state() {
            CursorState::Positioned(row) => Some(row),
            _ => None,
        }
    }

    /// Raw cell at an absolute position; out-of-bounds is `IndexRange`.
    fn extract_cell_at(&self, row: usize, col: usize) -> Result<RawCell<'_>>;

    /// Raw cell in the current row; `CursorState` when no row is positioned.
    fn extract_cell(&self, col: usize) -> Result<RawCell<'_>> {
        match self.cursor_state() {
            CursorState::Positioned(row) => self.extract_cell_at(row, col),
            state => Err(ChunkError::CursorState(format!(
                "chunk {} has no current row ({:?})",
                self.chunk_index(),
                state
            ))),
        }
    }

    /// Drops all rows but keeps allocated storage, and takes on new metadata.
    /// The cursor returns to `BeforeFirst`.
    fn reset(&mut self, meta: ChunkMeta);

    /// Releases all storage.
    fn clear(&mut self);
}

/// The linear cursor shared by storage forms that address rows directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowCursor {
    /// `-1` before the first row, `rows` after the last.
    position: isize,
}

impl Default for RowCursor {
    fn default() -> Self {
        Self { position: -1 }
    }
}

impl RowCursor {
    pub(crate) fn state(&self, rows: usize) -> CursorState {
        if self.position < 0 {
            CursorState::BeforeFirst
        } else if self.position as usize >= rows {
            CursorState::AfterLast
        } else {
            CursorState::Positioned(self.position as usize)
        }
    }

    pub(crate) fn next(&mut self, rows: usize) -> bool {
        let rows = rows as isize;
        if self.position >= rows {
            return false;
        }
        self.position += 1;
        self.position < rows
    }

    pub(crate) fn rewind(&mut self, rows: usize) -> bool {
        if self.position < 0 {
            return false;
        }
        self.position = self.position.min(rows as isize) - 1;
        self.position >= 0
    }
}

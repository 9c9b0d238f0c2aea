//! Row-major storage for JSON-dialect chunks.
//!
//! All cell bytes live in one arena; each cell is a `(start, len)` span into
//! it, or `None` for SQL NULL. Spans are laid out `row * columns + col`.

use crate::chunk::{ChunkMeta, CursorState, ResultChunk, RowCursor};
use crate::codec::RawCell;
use crate::error::{ChunkError, Result};

#[derive(Debug, Default)]
pub struct TextChunk {
    meta: ChunkMeta,
    arena: Vec<u8>,
    cells: Vec<Option<(u32, u32)>>,
    /// Fixed by the first completed row.
    columns: Option<usize>,
    rows: usize,
    /// Start of the row being written, in `cells`.
    open_row: Option<usize>,
    cursor: RowCursor,
}

impl TextChunk {
    pub fn new(meta: ChunkMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    /// Pre-sizes the arena, typically from the declared uncompressed size.
    pub fn reserve_bytes(&mut self, bytes: usize) {
        self.arena.reserve(bytes);
    }

    pub fn begin_row(&mut self) -> Result<()> {
        if self.open_row.is_some() {
            return Err(ChunkError::Internal(
                "begin_row called while a row is still open".to_string(),
            ));
        }
        self.open_row = Some(self.cells.len());
        Ok(())
    }

    /// Appends one cell to the open row; `None` stores a NULL.
    pub fn push_cell(&mut self, value: Option<&[u8]>) -> Result<()> {
        if self.open_row.is_none() {
            return Err(ChunkError::Internal(
                "push_cell called outside of a row".to_string(),
            ));
        }
        let span = match value {
            None => None,
            Some(bytes) => {
                let too_large = || {
                    ChunkError::StructuralParse(format!(
                        "chunk {} exceeds the 4 GiB cell arena",
                        self.meta.index
                    ))
                };
                let start = u32::try_from(self.arena.len()).map_err(|_| too_large())?;
                let len = u32::try_from(bytes.len()).map_err(|_| too_large())?;
                start.checked_add(len).ok_or_else(too_large)?;
                self.arena.extend_from_slice(bytes);
                Some((start, len))
            }
        };
        self.cells.push(span);
        Ok(())
    }

    /// Closes the open row. Every row must be as wide as the first.
    pub fn end_row(&mut self) -> Result<()> {
        let start = self.open_row.take().ok_or_else(|| {
            ChunkError::Internal("end_row called without an open row".to_string())
        })?;
        let width = self.cells.len() - start;
        match self.columns {
            None => self.columns = Some(width),
            Some(columns) if columns != width => {
                return Err(ChunkError::StructuralParse(format!(
                    "row {} of chunk {} has {} cells, expected {}",
                    self.rows, self.meta.index, width, columns
                )))
            }
            Some(_) => {}
        }
        self.rows += 1;
        Ok(())
    }

    /// Validates the parsed shape against the declared one once the body is consumed.
    pub fn finish(&mut self) -> Result<()> {
        if self.open_row.is_some() {
            return Err(ChunkError::StructuralParse(format!(
                "chunk {} ended inside a row",
                self.meta.index
            )));
        }
        if let Some(expected) = self.meta.expected_rows {
            if expected != self.rows {
                return Err(ChunkError::StructuralParse(format!(
                    "chunk {} declared {} rows but contained {}",
                    self.meta.index, expected, self.rows
                )));
            }
        }
        Ok(())
    }

    /// Bytes currently held by the cell arena.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }
}

impl ResultChunk for TextChunk {
    fn meta(&self) -> &ChunkMeta {
        &self.meta
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column_count(&self) -> usize {
        self.columns.unwrap_or(0)
    }

    fn cursor_state(&self) -> CursorState {
        self.cursor.state(self.rows)
    }

    fn next(&mut self) -> bool {
        self.cursor.next(self.rows)
    }

    fn rewind(&mut self) -> bool {
        self.cursor.rewind(self.rows)
    }

    fn extract_cell_at(&self, row: usize, col: usize) -> Result<RawCell<'_>> {
        let columns = self.column_count();
        if row >= self.rows || col >= columns {
            return Err(ChunkError::IndexRange(format!(
                "cell ({}, {}) is outside chunk {} of {} rows x {} columns",
                row, col, self.meta.index, self.rows, columns
            )));
        }
        match self.cells[row * columns + col] {
            None => Ok(RawCell::Null),
            Some((start, len)) => {
                let start = start as usize;
                Ok(RawCell::Text(&self.arena[start..start + len as usize]))
            }
        }
    }

    fn reset(&mut self, meta: ChunkMeta) {
        self.meta = meta;
        self.arena.clear();
        self.cells.clear();
        self.columns = None;
        self.rows = 0;
        self.open_row = None;
        self.cursor = RowCursor::default();
    }

    fn clear(&mut self) {
        self.arena = Vec::new();
        self.cells = Vec::new();
        self.columns = None;
        self.rows = 0;
        self.open_row = None;
        self.cursor = RowCursor::default();
    }
}

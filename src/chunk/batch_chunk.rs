//! Columnar storage: an ordered list of arrow `RecordBatch`es.
//!
//! The cursor is a `(batch, row)` pair. Zero-row batches are kept (so batch
//! indices stay aligned with ingestion order) but are stepped over in both
//! directions.

use arrow::array::{Array, ArrayRef, AsArray, StructArray};
use arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type,
};
use arrow::record_batch::RecordBatch;

use crate::chunk::{ChunkMeta, CursorState, ResultChunk};
use crate::codec::temporal::MILLIS_PER_DAY;
use crate::codec::RawCell;
use crate::error::{ChunkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPosition {
    BeforeFirst,
    At { batch: usize, row: usize },
    AfterLast,
}

#[derive(Debug)]
pub struct BatchChunk {
    meta: ChunkMeta,
    batches: Vec<RecordBatch>,
    /// Global row index of each batch's first row.
    starts: Vec<usize>,
    total_rows: usize,
    position: BatchPosition,
}

impl BatchChunk {
    pub fn new(meta: ChunkMeta) -> Self {
        Self {
            meta,
            batches: Vec::new(),
            starts: Vec::new(),
            total_rows: 0,
            position: BatchPosition::BeforeFirst,
        }
    }

    /// Appends a batch. The cursor position over earlier batches is unchanged.
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            if first.num_columns() != batch.num_columns() {
                return Err(ChunkError::StructuralParse(format!(
                    "batch {} of chunk {} has {} columns, expected {}",
                    self.batches.len(),
                    self.meta.index,
                    batch.num_columns(),
                    first.num_columns()
                )));
            }
        }
        self.starts.push(self.total_rows);
        self.total_rows += batch.num_rows();
        self.batches.push(batch);
        Ok(())
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn finish(&self) -> Result<()> {
        match self.meta.expected_rows {
            Some(expected) if expected != self.total_rows => Err(ChunkError::StructuralParse(format!(
                "chunk {} declared {} rows but contained {}",
                self.meta.index, expected, self.total_rows
            ))),
            _ => Ok(()),
        }
    }

    fn first_row_from(&self, batch: usize) -> BatchPosition {
        (batch..self.batches.len())
            .find(|&b| self.batches[b].num_rows() > 0)
            .map_or(BatchPosition::AfterLast, |b| BatchPosition::At { batch: b, row: 0 })
    }

    fn last_row_before(&self, batch: usize) -> BatchPosition {
        (0..batch)
            .rev()
            .find(|&b| self.batches[b].num_rows() > 0)
            .map_or(BatchPosition::BeforeFirst, |b| BatchPosition::At {
                batch: b,
                row: self.batches[b].num_rows() - 1,
            })
    }
}

impl ResultChunk for BatchChunk {
    fn meta(&self) -> &ChunkMeta {
        &self.meta
    }

    fn row_count(&self) -> usize {
        self.total_rows
    }

    fn column_count(&self) -> usize {
        self.batches.first().map_or(0, |b| b.num_columns())
    }

    fn cursor_state(&self) -> CursorState {
        match self.position {
            BatchPosition::BeforeFirst => CursorState::BeforeFirst,
            BatchPosition::At { batch, row } => CursorState::Positioned(self.starts[batch] + row),
            BatchPosition::AfterLast => CursorState::AfterLast,
        }
    }

    fn next(&mut self) -> bool {
        self.position = match self.position {
            BatchPosition::BeforeFirst => self.first_row_from(0),
            BatchPosition::At { batch, row } if row + 1 < self.batches[batch].num_rows() => {
                BatchPosition::At { batch, row: row + 1 }
            }
            BatchPosition::At { batch, .. } => self.first_row_from(batch + 1),
            BatchPosition::AfterLast => BatchPosition::AfterLast,
        };
        matches!(self.position, BatchPosition::At { .. })
    }

    fn rewind(&mut self) -> bool {
        self.position = match self.position {
            BatchPosition::BeforeFirst => BatchPosition::BeforeFirst,
            BatchPosition::At { batch, row } if row > 0 => BatchPosition::At { batch, row: row - 1 },
            BatchPosition::At { batch, .. } => self.last_row_before(batch),
            BatchPosition::AfterLast => self.last_row_before(self.batches.len()),
        };
        matches!(self.position, BatchPosition::At { .. })
    }

    fn extract_cell_at(&self, row: usize, col: usize) -> Result<RawCell<'_>> {
        let columns = self.column_count();
        if row >= self.total_rows || col >= columns {
            return Err(ChunkError::IndexRange(format!(
                "cell ({}, {}) is outside chunk {} of {} rows x {} columns",
                row, col, self.meta.index, self.total_rows, columns
            )));
        }
        // Last batch starting at or before `row`; never an empty one, see `append_batch`.
        let batch = self.starts.partition_point(|&start| start <= row) - 1;
        arrow_cell(self.batches[batch].column(col), row - self.starts[batch])
    }

    fn reset(&mut self, meta: ChunkMeta) {
        self.meta = meta;
        self.batches.clear();
        self.starts.clear();
        self.total_rows = 0;
        self.position = BatchPosition::BeforeFirst;
    }

    fn clear(&mut self) {
        self.batches = Vec::new();
        self.starts = Vec::new();
        self.total_rows = 0;
        self.position = BatchPosition::BeforeFirst;
    }
}

//==================================================================================
// Arrow cell access
//==================================================================================

fn arrow_cell(array: &ArrayRef, row: usize) -> Result<RawCell<'_>> {
    if array.is_null(row) {
        return Ok(RawCell::Null);
    }
    let cell = match array.data_type() {
        DataType::Int8 => RawCell::Int(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => RawCell::Int(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => RawCell::Int(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => RawCell::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::Decimal128(_, _) => {
            RawCell::Decimal(array.as_primitive::<Decimal128Type>().value(row))
        }
        DataType::Boolean => RawCell::Bool(array.as_boolean().value(row)),
        DataType::Float64 => RawCell::Double(array.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => {
            RawCell::Double(array.as_primitive::<Float32Type>().value(row) as f64)
        }
        DataType::Utf8 => RawCell::Text(array.as_string::<i32>().value(row).as_bytes()),
        DataType::LargeUtf8 => RawCell::Text(array.as_string::<i64>().value(row).as_bytes()),
        DataType::Binary => RawCell::Binary(array.as_binary::<i32>().value(row)),
        DataType::LargeBinary => RawCell::Binary(array.as_binary::<i64>().value(row)),
        DataType::FixedSizeBinary(_) => RawCell::Binary(array.as_fixed_size_binary().value(row)),
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row) as i64;
            RawCell::Int(days * MILLIS_PER_DAY)
        }
        DataType::Struct(_) => timestamp_struct_cell(array.as_struct(), row)?,
        other => {
            return Err(ChunkError::StructuralParse(format!(
                "unsupported arrow column type {}",
                other
            )))
        }
    };
    Ok(cell)
}

fn struct_field<'a>(array: &'a StructArray, name: &str) -> Option<&'a ArrayRef> {
    array
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case(name))
        .map(|i| array.column(i))
}

fn int_field(array: &StructArray, name: &str, row: usize) -> Result<Option<i64>> {
    let Some(column) = struct_field(array, name) else {
        return Ok(None);
    };
    let value = match column.data_type() {
        DataType::Int64 => column.as_primitive::<Int64Type>().value(row),
        DataType::Int32 => column.as_primitive::<Int32Type>().value(row) as i64,
        other => {
            return Err(ChunkError::StructuralParse(format!(
                "timestamp field '{}' has arrow type {}",
                name, other
            )))
        }
    };
    Ok(Some(value))
}

fn narrow(value: i64, name: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        ChunkError::StructuralParse(format!("timestamp field '{}' value {} exceeds 32 bits", name, value))
    })
}

fn timestamp_struct_cell(array: &StructArray, row: usize) -> Result<RawCell<'static>> {
    let epoch = int_field(array, "epoch", row)?.ok_or_else(|| {
        ChunkError::StructuralParse("timestamp struct has no 'epoch' field".to_string())
    })?;
    let fraction = int_field(array, "fraction", row)?;
    let tz = int_field(array, "timezone", row)?;
    Ok(match (fraction, tz) {
        (Some(fraction), None) => RawCell::EpochFraction {
            epoch,
            fraction: narrow(fraction, "fraction")?,
        },
        (None, Some(tz)) => RawCell::ScaledWithOffset {
            value: epoch,
            tz: narrow(tz, "timezone")?,
        },
        (Some(fraction), Some(tz)) => RawCell::EpochFractionWithOffset {
            epoch,
            fraction: narrow(fraction, "fraction")?,
            tz: narrow(tz, "timezone")?,
        },
        (None, None) => RawCell::Int(epoch),
    })
}

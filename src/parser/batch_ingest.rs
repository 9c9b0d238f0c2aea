//! Columnar ingestion: read an arrow IPC stream and append its batches.

use std::io::Read;

use arrow_schema::Schema;
use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;

use crate::chunk::BatchChunk;
use crate::error::{ChunkError, Result};
use crate::types::ColumnMeta;

/// Checks that `schema` can carry the declared columns, field by field.
pub fn validate_schema(schema: &Schema, columns: &[ColumnMeta]) -> Result<()> {
    if schema.fields().len() != columns.len() {
        return Err(ChunkError::StructuralParse(format!(
            "batch has {} fields but the result declares {} columns",
            schema.fields().len(),
            columns.len()
        )));
    }
    for (field, column) in schema.fields().iter().zip(columns) {
        if !column
            .logical_type
            .accepts_arrow_type(field.data_type(), column.scale)
        {
            return Err(ChunkError::StructuralParse(format!(
                "column '{}' declared {} (scale {}) cannot be read from arrow type {}",
                column.name,
                column.logical_type,
                column.scale,
                field.data_type()
            )));
        }
    }
    Ok(())
}

/// Appends one decoded batch after validating it against the declared columns.
/// Zero-row batches are valid.
pub fn append_batch(batch: RecordBatch, columns: &[ColumnMeta], chunk: &mut BatchChunk) -> Result<()> {
    validate_schema(&batch.schema(), columns)?;
    chunk.append_batch(batch)
}

/// Reads a whole IPC stream into `chunk`.
pub fn ingest<R: Read>(reader: R, columns: &[ColumnMeta], chunk: &mut BatchChunk) -> Result<()> {
    let stream = StreamReader::try_new(reader, None)?;
    validate_schema(&stream.schema(), columns)?;
    for batch in stream {
        chunk.append_batch(batch?)?;
    }
    chunk.finish()
}

//! Parser version 1: materialize the whole body as a `serde_json::Value`, then
//! copy its leaves into the chunk.

use std::io::Read;

use serde_json::Value;

use crate::chunk::TextChunk;
use crate::error::{ChunkError, Result};

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn parse<R: Read>(mut reader: R, chunk: &mut TextChunk) -> Result<()> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    let document: Value = serde_json::from_slice(&body).map_err(|e| match e.classify() {
        serde_json::error::Category::Io => ChunkError::transient(e),
        _ => ChunkError::structural(e),
    })?;

    let Value::Array(rows) = &document else {
        return Err(ChunkError::StructuralParse(format!(
            "chunk body is a JSON {}, expected an array of rows",
            kind_of(&document)
        )));
    };

    for (row_index, row) in rows.iter().enumerate() {
        let Value::Array(cells) = row else {
            return Err(ChunkError::StructuralParse(format!(
                "row {} is a JSON {}, expected an array",
                row_index,
                kind_of(row)
            )));
        };
        chunk.begin_row()?;
        for (col, cell) in cells.iter().enumerate() {
            match cell {
                Value::Null => chunk.push_cell(None)?,
                Value::String(s) => chunk.push_cell(Some(s.as_bytes()))?,
                Value::Bool(b) => chunk.push_cell(Some(if *b { &b"true"[..] } else { &b"false"[..] }))?,
                Value::Number(n) => chunk.push_cell(Some(n.to_string().as_bytes()))?,
                Value::Array(_) | Value::Object(_) => {
                    return Err(ChunkError::StructuralParse(format!(
                        "cell ({}, {}) is a JSON {}, expected a scalar",
                        row_index,
                        col,
                        kind_of(cell)
                    )))
                }
            }
        }
        chunk.end_row()?;
    }
    chunk.finish()
}

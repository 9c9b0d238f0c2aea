//! The query result response envelope: column metadata, the inline first
//! chunk and the descriptors of the remote chunks.

use std::str::FromStr;

use base64::Engine;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::chunk::ChunkMeta;
use crate::error::Result;
use crate::parser::ResultFormat;
use crate::types::{ColumnMeta, LogicalType};

pub const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";
pub const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";
pub const SSE_C_ALGORITHM: &str = "AES256";

/// One entry of `rowtype`. The type name is kept as text so that an unknown
/// type surfaces as a configuration failure rather than a JSON error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub scale: Option<i32>,
    #[serde(default)]
    pub precision: Option<i32>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChunk {
    pub url: String,
    pub row_count: usize,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub compressed_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultResponse {
    #[serde(default)]
    pub rowtype: Vec<RowType>,
    #[serde(default)]
    pub rowset: Option<Box<RawValue>>,
    #[serde(default)]
    pub rowset_base64: Option<String>,
    #[serde(default)]
    pub query_result_format: ResultFormat,
    #[serde(default)]
    pub chunks: Vec<RemoteChunk>,
    #[serde(default)]
    pub chunk_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub qrmk: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub returned: Option<u64>,
    #[serde(default)]
    pub query_id: Option<String>,
}

impl QueryResultResponse {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves the declared columns. Fails on the first unknown type name.
    pub fn columns(&self) -> Result<Vec<ColumnMeta>> {
        self.rowtype
            .iter()
            .map(|row_type| -> Result<ColumnMeta> {
                Ok(ColumnMeta {
                    name: row_type.name.clone(),
                    logical_type: LogicalType::from_str(&row_type.type_name)?,
                    scale: row_type.scale.unwrap_or(0),
                    precision: row_type.precision,
                    length: row_type.length,
                    nullable: row_type.nullable,
                })
            })
            .collect()
    }

    /// Headers sent with every remote chunk GET.
    pub fn chunk_headers(&self) -> HashMap<String, String> {
        if let Some(headers) = &self.chunk_headers {
            return headers.clone();
        }
        let mut headers = HashMap::new();
        if let Some(qrmk) = &self.qrmk {
            headers.insert(SSE_C_ALGORITHM_HEADER.to_string(), SSE_C_ALGORITHM.to_string());
            headers.insert(SSE_C_KEY_HEADER.to_string(), qrmk.clone());
        }
        headers
    }

    /// Remote chunk descriptors. Indices start at 1; the inline chunk is 0.
    pub fn remote_chunks(&self) -> Vec<ChunkMeta> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                ChunkMeta::remote(i as i32 + 1, chunk.url.clone(), chunk.row_count, chunk.uncompressed_size)
            })
            .collect()
    }

    /// The inline first chunk in the bytes its parser reads: bracketed JSON
    /// text, or a decoded arrow IPC stream. `None` when the server sent none.
    pub fn inline_payload(&self) -> Result<Option<Vec<u8>>> {
        match self.query_result_format {
            ResultFormat::Json => Ok(self
                .rowset
                .as_ref()
                .map(|rowset| rowset.get().as_bytes().to_vec())),
            ResultFormat::Arrow => match self.rowset_base64.as_deref() {
                None | Some("") => Ok(None),
                Some(encoded) => {
                    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                    Ok(Some(decoded))
                }
            },
        }
    }

    /// Sum of the rows declared by the remote descriptors, plus `inline_rows`.
    pub fn declared_rows(&self, inline_rows: usize) -> usize {
        inline_rows + self.chunks.iter().map(|c| c.row_count).sum::<usize>()
    }
}

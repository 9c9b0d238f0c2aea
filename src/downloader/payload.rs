//! Turns a fetched body into the byte stream a parser reads.

use std::io::Read;

use bytes::Bytes;

use crate::chunk::ChunkMeta;
use crate::error::{ChunkError, Result};
use crate::parser::ResultFormat;

/// First four bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Decompresses zstd bodies and checks the decoded size against the descriptor.
pub fn decode_payload(body: Bytes, meta: &ChunkMeta) -> Result<Bytes> {
    let decoded = if body.starts_with(&ZSTD_MAGIC) {
        let mut out = Vec::with_capacity(usize::try_from(meta.uncompressed_size).unwrap_or(0));
        let mut decoder = zstd::stream::Decoder::new(&body[..]).map_err(ChunkError::transient)?;
        // A truncated frame is most likely a cut-off download; let the retry loop see it.
        std::io::copy(&mut decoder, &mut out).map_err(|e| {
            ChunkError::TransientIo(format!("chunk {} failed to decompress: {}", meta.index, e))
        })?;
        Bytes::from(out)
    } else {
        body
    };

    if meta.uncompressed_size != 0 && decoded.len() as u64 != meta.uncompressed_size {
        log::warn!(
            "chunk {} decoded to {} bytes, descriptor declared {}",
            meta.index,
            decoded.len(),
            meta.uncompressed_size
        );
    }
    Ok(decoded)
}

/// Remote JSON chunks arrive as `[..],[..]`; `wrap_json` supplies the enclosing brackets.
pub fn body_reader(body: &[u8], format: ResultFormat, wrap_json: bool) -> Box<dyn Read + '_> {
    match format {
        ResultFormat::Json if wrap_json => Box::new((&b"["[..]).chain(body).chain(&b"]"[..])),
        _ => Box::new(body),
    }
}

// In: src/error.rs

//! This module defines the single, unified error type for the entire chunkwire library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Every failure maps to one `ChunkError` value carrying a stable numeric code
//! (`ChunkError::code`) and a taxonomy class (`ChunkError::kind`). Callers that
//! need to branch on the failure should match on `kind()`, not on the message.

use std::fmt;

use thiserror::Error;

/// Result type alias used throughout chunkwire.
pub type Result<T> = std::result::Result<T, ChunkError>;

//==================================================================================
// I. Error Taxonomy
//==================================================================================

/// The failure classes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed numeric or textual cell content.
    Format,
    /// A value outside the representable range of the requested target.
    Overflow,
    /// A wire payload that does not follow the chunk dialect's grammar.
    StructuralParse,
    /// Row or column access outside the chunk bounds.
    IndexRange,
    /// Cursor-relative access while no row is positioned.
    CursorState,
    /// A retryable network or storage fault.
    TransientIo,
    /// Unsupported parser/downloader version, unknown column type, bad settings.
    Configuration,
    /// The declared column type cannot produce the requested native type.
    Conversion,
    /// The operation was cancelled through the result's cancellation token.
    Cancelled,
    /// Violated internal invariant (this is a bug or a misuse of a low-level API).
    Internal,
}

/// Stable machine-readable error codes. These values are part of the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const FORMAT: ErrorCode = ErrorCode(270_001);
    pub const OVERFLOW: ErrorCode = ErrorCode(270_002);
    pub const STRUCTURAL_PARSE: ErrorCode = ErrorCode(270_003);
    pub const INDEX_RANGE: ErrorCode = ErrorCode(270_004);
    pub const CURSOR_STATE: ErrorCode = ErrorCode(270_005);
    pub const TRANSIENT_IO: ErrorCode = ErrorCode(270_006);
    pub const CONFIGURATION: ErrorCode = ErrorCode(270_007);
    pub const CONVERSION: ErrorCode = ErrorCode(270_008);
    pub const CANCELLED: ErrorCode = ErrorCode(270_009);
    pub const INTERNAL: ErrorCode = ErrorCode(270_010);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//==================================================================================
// II. The Unified Error
//==================================================================================

#[derive(Error, Debug)]
pub enum ChunkError {
    // =========================================================================
    // === Cell Decoding Errors
    // =========================================================================
    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Value out of range: {0}")]
    Overflow(String),

    #[error("Invalid conversion: {0}")]
    Conversion(String),

    // =========================================================================
    // === Chunk & Cursor Errors
    // =========================================================================
    #[error("Chunk parse failed: {0}")]
    StructuralParse(String),

    #[error("Index out of range: {0}")]
    IndexRange(String),

    #[error("Invalid cursor state: {0}")]
    CursorState(String),

    // =========================================================================
    // === Download & Configuration Errors
    // =========================================================================
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library while reading a columnar chunk.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while reading the response envelope.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ChunkError {
    /// The taxonomy class of this error. Wrapped library errors are classified
    /// by where they can occur: I/O is transient, arrow and JSON are content defects.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChunkError::Format(_) => ErrorKind::Format,
            ChunkError::Overflow(_) => ErrorKind::Overflow,
            ChunkError::Conversion(_) => ErrorKind::Conversion,
            ChunkError::StructuralParse(_) => ErrorKind::StructuralParse,
            ChunkError::IndexRange(_) => ErrorKind::IndexRange,
            ChunkError::CursorState(_) => ErrorKind::CursorState,
            ChunkError::TransientIo(_) => ErrorKind::TransientIo,
            ChunkError::Configuration(_) => ErrorKind::Configuration,
            ChunkError::Cancelled(_) => ErrorKind::Cancelled,
            ChunkError::Internal(_) => ErrorKind::Internal,
            ChunkError::Arrow(_) | ChunkError::SerdeJson(_) => ErrorKind::StructuralParse,
            ChunkError::Io(_) => ErrorKind::TransientIo,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self.kind() {
            ErrorKind::Format => ErrorCode::FORMAT,
            ErrorKind::Overflow => ErrorCode::OVERFLOW,
            ErrorKind::StructuralParse => ErrorCode::STRUCTURAL_PARSE,
            ErrorKind::IndexRange => ErrorCode::INDEX_RANGE,
            ErrorKind::CursorState => ErrorCode::CURSOR_STATE,
            ErrorKind::TransientIo => ErrorCode::TRANSIENT_IO,
            ErrorKind::Configuration => ErrorCode::CONFIGURATION,
            ErrorKind::Conversion => ErrorCode::CONVERSION,
            ErrorKind::Cancelled => ErrorCode::CANCELLED,
            ErrorKind::Internal => ErrorCode::INTERNAL,
        }
    }

    /// Only transient I/O failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    /// Builds an error of the given class carrying `message`.
    pub fn of_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Format => ChunkError::Format(message),
            ErrorKind::Overflow => ChunkError::Overflow(message),
            ErrorKind::Conversion => ChunkError::Conversion(message),
            ErrorKind::StructuralParse => ChunkError::StructuralParse(message),
            ErrorKind::IndexRange => ChunkError::IndexRange(message),
            ErrorKind::CursorState => ChunkError::CursorState(message),
            ErrorKind::TransientIo => ChunkError::TransientIo(message),
            ErrorKind::Configuration => ChunkError::Configuration(message),
            ErrorKind::Cancelled => ChunkError::Cancelled(message),
            ErrorKind::Internal => ChunkError::Internal(message),
        }
    }

    #[inline]
    pub fn structural<E: fmt::Display>(err: E) -> Self {
        ChunkError::StructuralParse(err.to_string())
    }

    #[inline]
    pub fn transient<E: fmt::Display>(err: E) -> Self {
        ChunkError::TransientIo(err.to_string())
    }
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<base64::DecodeError> for ChunkError {
    fn from(err: base64::DecodeError) -> Self {
        ChunkError::StructuralParse(format!("inline rowset is not valid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for ChunkError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ChunkError::Cancelled("chunk download task was cancelled".to_string())
        } else {
            ChunkError::Internal(format!("chunk download task panicked: {}", err))
        }
    }
}

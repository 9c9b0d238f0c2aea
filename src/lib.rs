//! This file is the root of the `chunkwire` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`codec`, `chunk`,
//!     `parser`, `downloader`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the public surface a driver needs to read a query result:
//!     the response model, the configuration, the cursor and the fetch seam.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
pub mod observability; // Make macros available throughout the crate

pub mod chunk;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod downloader;
pub mod error;
pub mod parser;
pub mod response;
pub mod types;

#[doc(hidden)]
pub use log as __log;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use chunk::{ChunkMeta, CursorState, ResultChunk};
pub use codec::{RawCell, WireValue};
pub use config::{ChunkConfig, ChunkDownloaderVersion, ChunkParserVersion};
pub use cursor::ResultCursor;
pub use downloader::{ChunkDownloader, ChunkFetcher, ChunkRequest};
pub use error::{ChunkError, ErrorCode, ErrorKind, Result};
pub use observability::init_logging;
pub use parser::{ChunkParser, ResultFormat};
pub use response::QueryResultResponse;
pub use types::{CellValue, ColumnMeta, LogicalType, NativeType};

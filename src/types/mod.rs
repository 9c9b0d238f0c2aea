//! This module defines the core, strongly-typed data representations used
//! throughout chunkwire.
//!
//! It includes the canonical `LogicalType` enum (the server's declared column
//! types), the per-column metadata, the native conversion targets and the
//! decoded cell value.

pub mod cell_value;
pub mod column;
pub mod logical_type;

// Re-export the main type(s) for easier access.
pub use cell_value::{CellValue, NativeType};
pub use column::ColumnMeta;
pub use logical_type::LogicalType;

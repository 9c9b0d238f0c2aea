//! This module defines the canonical, type-safe representation of the column
//! types a server declares for a result.

use std::fmt;
use std::str::FromStr;

use arrow_schema::{DataType as ArrowDataType, Fields};
use serde::{Deserialize, Serialize};

use crate::error::ChunkError;
use crate::types::cell_value::NativeType;

/// The declared logical type of a result column.
///
/// The declared type is authoritative: a cell is always decoded according to
/// its column's `LogicalType`, never according to what its raw bytes look like.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum LogicalType {
    Fixed,
    Boolean,
    Real,
    Text,
    Array,
    Variant,
    Object,
    Binary,
    Date,
    Time,
    TimestampTz,
    TimestampLtz,
    TimestampNtz,
}

impl LogicalType {
    /// All declared types, in wire order.
    pub const ALL: [LogicalType; 13] = [
        Self::Fixed,
        Self::Boolean,
        Self::Real,
        Self::Text,
        Self::Array,
        Self::Variant,
        Self::Object,
        Self::Binary,
        Self::Date,
        Self::Time,
        Self::TimestampTz,
        Self::TimestampLtz,
        Self::TimestampNtz,
    ];

    /// The wire-format name of the type.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Boolean => "BOOLEAN",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Array => "ARRAY",
            Self::Variant => "VARIANT",
            Self::Object => "OBJECT",
            Self::Binary => "BINARY",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::TimestampTz => "TIMESTAMP_TZ",
            Self::TimestampLtz => "TIMESTAMP_LTZ",
            Self::TimestampNtz => "TIMESTAMP_NTZ",
        }
    }

    /// Returns `true` for the types carried as opaque text at this layer.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Array | Self::Variant | Self::Object)
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(
            self,
            Self::TimestampTz | Self::TimestampLtz | Self::TimestampNtz
        )
    }

    /// The native type produced when the caller does not ask for a specific one.
    /// FIXED is resolved per value (see `TypeCodec::decode_default`).
    pub fn default_native(&self) -> NativeType {
        match self {
            Self::Fixed => NativeType::Decimal,
            Self::Boolean => NativeType::Boolean,
            Self::Real => NativeType::Double,
            Self::Text | Self::Array | Self::Variant | Self::Object => NativeType::String,
            Self::Binary => NativeType::Bytes,
            Self::Date => NativeType::Date,
            Self::Time => NativeType::Time,
            Self::TimestampNtz => NativeType::DateTime,
            Self::TimestampLtz | Self::TimestampTz => NativeType::DateTimeOffset,
        }
    }

    /// Whether a columnar batch column of `arrow_type` can carry this declared type.
    pub fn accepts_arrow_type(&self, arrow_type: &ArrowDataType, scale: i32) -> bool {
        use ArrowDataType as A;
        match self {
            Self::Fixed => matches!(
                arrow_type,
                A::Int8 | A::Int16 | A::Int32 | A::Int64 | A::Decimal128(_, _)
            ),
            Self::Boolean => matches!(arrow_type, A::Boolean),
            Self::Real => matches!(arrow_type, A::Float64 | A::Float32),
            Self::Text | Self::Array | Self::Variant | Self::Object => {
                matches!(arrow_type, A::Utf8 | A::LargeUtf8)
            }
            Self::Binary => matches!(
                arrow_type,
                A::Binary | A::LargeBinary | A::FixedSizeBinary(_)
            ),
            Self::Date => matches!(arrow_type, A::Date32),
            Self::Time => matches!(arrow_type, A::Int32 | A::Int64),
            Self::TimestampNtz | Self::TimestampLtz => match arrow_type {
                A::Int64 => scale <= 3,
                A::Struct(fields) => {
                    has_struct_fields(fields, &["epoch", "fraction"]) && fields.len() == 2
                }
                _ => false,
            },
            Self::TimestampTz => match arrow_type {
                A::Struct(fields) if scale <= 3 => {
                    has_struct_fields(fields, &["epoch", "timezone"]) && fields.len() == 2
                }
                A::Struct(fields) => {
                    has_struct_fields(fields, &["epoch", "fraction", "timezone"])
                        && fields.len() == 3
                }
                _ => false,
            },
        }
    }
}

fn has_struct_fields(fields: &Fields, names: &[&str]) -> bool {
    names
        .iter()
        .all(|name| fields.iter().any(|f| f.name().eq_ignore_ascii_case(name)))
}

impl FromStr for LogicalType {
    type Err = ChunkError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        LogicalType::ALL
            .iter()
            .copied()
            .find(|t| t.wire_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ChunkError::Configuration(format!("Unknown column type: {}", name)))
    }
}

impl TryFrom<String> for LogicalType {
    type Error = ChunkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogicalType> for String {
    fn from(value: LogicalType) -> String {
        value.wire_name().to_string()
    }
}

/// Provides the canonical wire-format name for a `LogicalType`.
impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

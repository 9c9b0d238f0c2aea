//! The decoded, native form of a cell and the set of native conversion targets.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// The native types a caller can ask a cell to be decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    String,
    Bytes,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
}

impl NativeType {
    /// Inclusive range of the signed integer targets, `None` for the rest.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            Self::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Boolean(bool),
    /// Any signed integer target; the value is guaranteed to fit the requested width.
    Int(i64),
    Decimal(Decimal),
    Double(f64),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// A wall-clock timestamp without zone (TIMESTAMP_NTZ, or LTZ read as local naive time).
    Timestamp(NaiveDateTime),
    /// An instant with an explicit offset (TIMESTAMP_TZ, or LTZ in the local zone).
    TimestampOffset(DateTime<FixedOffset>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "Null",
            CellValue::Boolean(_) => "Boolean",
            CellValue::Int(_) => "Int64",
            CellValue::Decimal(_) => "Decimal",
            CellValue::Double(_) => "Double",
            CellValue::Text(_) => "String",
            CellValue::Binary(_) => "Bytes",
            CellValue::Date(_) => "Date",
            CellValue::Time(_) => "Time",
            CellValue::Timestamp(_) => "DateTime",
            CellValue::TimestampOffset(_) => "DateTimeOffset",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Boolean(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Decimal(v) => write!(f, "{}", v),
            CellValue::Double(v) => write!(f, "{}", v),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Binary(v) => {
                for byte in v {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            CellValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            CellValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            CellValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            CellValue::TimestampOffset(v) => {
                write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f %:z"))
            }
        }
    }
}

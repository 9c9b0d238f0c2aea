//! The undecoded forms of a cell.
//!
//! `RawCell` borrows from chunk storage and is what a chunk hands out on
//! extraction. `WireValue` is the owned result of encoding a native value for
//! upload. Both carry exactly one of the wire shapes a declared type can use;
//! the declared type and scale travel separately in `ColumnMeta`.

/// A borrowed, still-encoded cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawCell<'a> {
    Null,
    /// A JSON-dialect cell: the string content with escapes already resolved.
    Text(&'a [u8]),
    Bool(bool),
    /// An unscaled integer (FIXED, DATE milliseconds, TIME or single-field timestamps).
    Int(i64),
    /// An unscaled 128-bit integer (FIXED from a `Decimal128` column).
    Decimal(i128),
    Double(f64),
    Binary(&'a [u8]),
    /// Two-field timestamp: seconds since epoch and nanoseconds at tick resolution.
    EpochFraction { epoch: i64, fraction: i32 },
    /// TIMESTAMP_TZ at scale <= 3: scaled instant plus biased offset.
    ScaledWithOffset { value: i64, tz: i32 },
    /// TIMESTAMP_TZ at scale > 3.
    EpochFractionWithOffset { epoch: i64, fraction: i32, tz: i32 },
}

impl RawCell<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, RawCell::Null)
    }

    /// Short name of the wire shape, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            RawCell::Null => "null",
            RawCell::Text(_) => "text",
            RawCell::Bool(_) => "boolean",
            RawCell::Int(_) => "integer",
            RawCell::Decimal(_) => "decimal",
            RawCell::Double(_) => "double",
            RawCell::Binary(_) => "binary",
            RawCell::EpochFraction { .. } => "epoch/fraction",
            RawCell::ScaledWithOffset { .. } => "value/timezone",
            RawCell::EpochFractionWithOffset { .. } => "epoch/fraction/timezone",
        }
    }
}

/// An owned, encoded cell produced by `type_codec::encode`.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Text(String),
    Bool(bool),
    Int(i64),
    Decimal(i128),
    Double(f64),
    Binary(Vec<u8>),
    EpochFraction { epoch: i64, fraction: i32 },
    ScaledWithOffset { value: i64, tz: i32 },
    EpochFractionWithOffset { epoch: i64, fraction: i32, tz: i32 },
}

impl WireValue {
    /// Borrows the encoded value as a cell, so it can be fed back through decode.
    pub fn as_raw(&self) -> RawCell<'_> {
        match self {
            WireValue::Null => RawCell::Null,
            WireValue::Text(s) => RawCell::Text(s.as_bytes()),
            WireValue::Bool(v) => RawCell::Bool(*v),
            WireValue::Int(v) => RawCell::Int(*v),
            WireValue::Decimal(v) => RawCell::Decimal(*v),
            WireValue::Double(v) => RawCell::Double(*v),
            WireValue::Binary(v) => RawCell::Binary(v),
            WireValue::EpochFraction { epoch, fraction } => RawCell::EpochFraction {
                epoch: *epoch,
                fraction: *fraction,
            },
            WireValue::ScaledWithOffset { value, tz } => RawCell::ScaledWithOffset {
                value: *value,
                tz: *tz,
            },
            WireValue::EpochFractionWithOffset { epoch, fraction, tz } => {
                RawCell::EpochFractionWithOffset {
                    epoch: *epoch,
                    fraction: *fraction,
                    tz: *tz,
                }
            }
        }
    }
}

//! The bidirectional conversion between wire cells and native values.
//!
//! `decode` is driven entirely by the declared `LogicalType` and scale; the raw
//! cell's shape only selects which of the type's encodings is being read.
//! `encode` is the exact inverse used for bind parameters, and
//! `encode_bind_text` renders the text form of the same value.

use chrono::{Local, NaiveTime};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use crate::codec::numeric;
use crate::codec::raw::{RawCell, WireValue};
use crate::codec::temporal;
use crate::error::{ChunkError, Result};
use crate::types::{CellValue, LogicalType, NativeType};

/// FIXED columns can declare up to 38 digits of scale.
const MAX_FIXED_SCALE: i32 = 38;

//==================================================================================
// 1. Conversion Matrix
//==================================================================================

/// Whether `logical` can be read as `target`.
pub fn supports(logical: LogicalType, target: NativeType) -> bool {
    use LogicalType as L;
    use NativeType as N;
    if target == N::String {
        return true;
    }
    match logical {
        L::Fixed => matches!(
            target,
            N::Int8 | N::Int16 | N::Int32 | N::Int64 | N::Decimal | N::Double
        ),
        L::Boolean => target == N::Boolean,
        L::Real => matches!(target, N::Double | N::Decimal),
        L::Text | L::Array | L::Variant | L::Object => target == N::Bytes,
        L::Binary => target == N::Bytes,
        L::Date => matches!(target, N::Date | N::DateTime),
        L::Time => target == N::Time,
        L::TimestampNtz => target == N::DateTime,
        L::TimestampLtz => matches!(target, N::DateTimeOffset | N::DateTime),
        L::TimestampTz => target == N::DateTimeOffset,
    }
}

fn invalid_conversion(logical: LogicalType, target: NativeType) -> ChunkError {
    ChunkError::Conversion(format!("Invalid conversion from {} to {}", logical, target))
}

fn shape_mismatch(logical: LogicalType, raw: &RawCell<'_>) -> ChunkError {
    ChunkError::Conversion(format!(
        "a {} cell cannot carry a {} value",
        raw.shape(),
        logical
    ))
}

//==================================================================================
// 2. Decode
//==================================================================================

/// Decodes `raw` as declared type `logical` at `scale` into `target`.
///
/// The conversion matrix is checked before the cell is looked at, so an
/// incompatible target fails the same way for null and non-null cells.
pub fn decode(
    raw: RawCell<'_>,
    logical: LogicalType,
    scale: i32,
    target: NativeType,
) -> Result<CellValue> {
    if !supports(logical, target) {
        return Err(invalid_conversion(logical, target));
    }
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    if target == NativeType::String {
        return decode_string(raw, logical, scale);
    }

    match logical {
        LogicalType::Fixed => decode_fixed(raw, scale, target),
        LogicalType::Boolean => decode_boolean(raw).map(CellValue::Boolean),
        LogicalType::Real => decode_real(raw, target),
        LogicalType::Text | LogicalType::Array | LogicalType::Variant | LogicalType::Object => {
            match raw {
                RawCell::Text(bytes) => Ok(CellValue::Binary(bytes.to_vec())),
                other => Err(shape_mismatch(logical, &other)),
            }
        }
        LogicalType::Binary => decode_binary(raw).map(CellValue::Binary),
        LogicalType::Date => {
            let date = temporal::millis_to_date(date_millis(raw)?)?;
            Ok(match target {
                NativeType::DateTime => CellValue::Timestamp(date.and_time(NaiveTime::MIN)),
                _ => CellValue::Date(date),
            })
        }
        LogicalType::Time => {
            let ticks = match raw {
                RawCell::Text(bytes) => temporal::parse_seconds_text(bytes, scale)?,
                RawCell::Int(value) => temporal::scaled_to_ticks(value, scale)?,
                other => return Err(shape_mismatch(logical, &other)),
            };
            temporal::ticks_to_time(ticks).map(CellValue::Time)
        }
        LogicalType::TimestampNtz => {
            let ticks = instant_ticks(raw, logical, scale)?;
            temporal::ticks_to_naive(ticks).map(CellValue::Timestamp)
        }
        LogicalType::TimestampLtz => {
            let ticks = instant_ticks(raw, logical, scale)?;
            let local = temporal::ticks_to_utc(ticks)?.with_timezone(&Local);
            Ok(match target {
                NativeType::DateTime => CellValue::Timestamp(local.naive_local()),
                _ => CellValue::TimestampOffset(local.fixed_offset()),
            })
        }
        LogicalType::TimestampTz => {
            let (ticks, tz) = zoned_ticks(raw, scale)?;
            let offset = temporal::decode_tz_offset(tz)?;
            let instant = temporal::ticks_to_utc(ticks)?.with_timezone(&offset);
            Ok(CellValue::TimestampOffset(instant))
        }
    }
}

/// Decodes into the declared type's natural native type. FIXED resolves per
/// value: scale 0 values that fit 64 bits become `Int`, everything else `Decimal`.
pub fn decode_default(raw: RawCell<'_>, logical: LogicalType, scale: i32) -> Result<CellValue> {
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    if logical == LogicalType::Fixed && scale == 0 {
        return match raw {
            RawCell::Int(value) => Ok(CellValue::Int(value)),
            RawCell::Decimal(value) => match i64::try_from(value) {
                Ok(v) => Ok(CellValue::Int(v)),
                Err(_) => unscaled_to_decimal(value, 0).map(CellValue::Decimal),
            },
            RawCell::Text(bytes) if !bytes.contains(&b'.') => {
                match numeric::parse_i64(bytes, 0, bytes.len()) {
                    Ok(v) => Ok(CellValue::Int(v)),
                    Err(ChunkError::Overflow(_)) => {
                        numeric::parse_decimal(bytes, 0, bytes.len()).map(CellValue::Decimal)
                    }
                    Err(e) => Err(e),
                }
            }
            other => decode_fixed(other, scale, NativeType::Decimal),
        };
    }
    decode(raw, logical, scale, logical.default_native())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        ChunkError::Format(format!("cell is not valid UTF-8: {}", e))
    })
}

/// Text cells of the literal types are returned as sent; everything else is
/// rendered from its decoded value.
fn decode_string(raw: RawCell<'_>, logical: LogicalType, scale: i32) -> Result<CellValue> {
    let literal = logical.is_textual()
        || matches!(
            logical,
            LogicalType::Fixed | LogicalType::Real | LogicalType::Boolean | LogicalType::Binary
        );
    match raw {
        RawCell::Text(bytes) if literal => utf8(bytes).map(CellValue::Text),
        other => Ok(CellValue::Text(
            decode_default(other, logical, scale)?.to_string(),
        )),
    }
}

// --- FIXED ---

fn fixed_scale(scale: i32) -> Result<u32> {
    if (0..=MAX_FIXED_SCALE).contains(&scale) {
        Ok(scale as u32)
    } else {
        Err(ChunkError::Format(format!(
            "FIXED scale {} is outside 0..={}",
            scale, MAX_FIXED_SCALE
        )))
    }
}

fn decode_fixed(raw: RawCell<'_>, scale: i32, target: NativeType) -> Result<CellValue> {
    match raw {
        RawCell::Text(bytes) => fixed_from_text(bytes, target),
        RawCell::Int(value) => fixed_from_unscaled(value as i128, fixed_scale(scale)?, target),
        RawCell::Decimal(value) => fixed_from_unscaled(value, fixed_scale(scale)?, target),
        other => Err(shape_mismatch(LogicalType::Fixed, &other)),
    }
}

fn fixed_from_text(bytes: &[u8], target: NativeType) -> Result<CellValue> {
    let len = bytes.len();
    match target {
        NativeType::Double => numeric::parse_f64(bytes, 0, len).map(CellValue::Double),
        NativeType::Decimal => numeric::parse_decimal(bytes, 0, len).map(CellValue::Decimal),
        _ if bytes.contains(&b'.') => {
            decimal_to_int(numeric::parse_decimal(bytes, 0, len)?, target)
        }
        NativeType::Int8 => numeric::parse_i8(bytes, 0, len).map(|v| CellValue::Int(v as i64)),
        NativeType::Int16 => numeric::parse_i16(bytes, 0, len).map(|v| CellValue::Int(v as i64)),
        NativeType::Int32 => numeric::parse_i32(bytes, 0, len).map(|v| CellValue::Int(v as i64)),
        _ => numeric::parse_i64(bytes, 0, len).map(CellValue::Int),
    }
}

fn int_in_bounds(value: i128, target: NativeType, shown: &dyn std::fmt::Display) -> Result<CellValue> {
    let (lo, hi) = target.integer_bounds().unwrap_or((i64::MIN, i64::MAX));
    if value < lo as i128 || value > hi as i128 {
        return Err(ChunkError::Overflow(format!(
            "{} does not fit in {}",
            shown, target
        )));
    }
    Ok(CellValue::Int(value as i64))
}

fn decimal_to_int(value: Decimal, target: NativeType) -> Result<CellValue> {
    if !value.fract().is_zero() {
        return Err(ChunkError::Overflow(format!(
            "{} has a fractional part and cannot be read as {}",
            value, target
        )));
    }
    let whole = value
        .to_i128()
        .ok_or_else(|| ChunkError::Overflow(format!("{} does not fit in {}", value, target)))?;
    int_in_bounds(whole, target, &value)
}

fn fixed_from_unscaled(unscaled: i128, scale: u32, target: NativeType) -> Result<CellValue> {
    match target {
        NativeType::Decimal => unscaled_to_decimal(unscaled, scale).map(CellValue::Decimal),
        NativeType::Double => Ok(CellValue::Double(
            unscaled as f64 / 10f64.powi(scale as i32),
        )),
        _ => {
            let unit = 10i128.pow(scale);
            if unscaled % unit != 0 {
                return Err(ChunkError::Overflow(format!(
                    "{} has a fractional part and cannot be read as {}",
                    format_unscaled(unscaled, scale),
                    target
                )));
            }
            int_in_bounds(unscaled / unit, target, &format_unscaled(unscaled, scale))
        }
    }
}

/// `unscaled / 10^scale` as an exact `Decimal`, splitting off the integral part
/// when the mantissa alone exceeds 96 bits.
fn unscaled_to_decimal(unscaled: i128, scale: u32) -> Result<Decimal> {
    if let Ok(value) = Decimal::try_from_i128_with_scale(unscaled, scale) {
        return Ok(value);
    }
    let overflow = || {
        ChunkError::Overflow(format!(
            "{} exceeds the decimal range",
            format_unscaled(unscaled, scale)
        ))
    };
    let unit = 10i128.pow(scale);
    let whole = Decimal::try_from_i128_with_scale(unscaled / unit, 0).map_err(|_| overflow())?;
    let fraction = numeric::decimal_from_parts(unscaled % unit, scale).ok_or_else(overflow)?;
    whole.checked_add(fraction).ok_or_else(overflow)
}

fn format_unscaled(unscaled: i128, scale: u32) -> String {
    let sign = if unscaled < 0 { "-" } else { "" };
    let magnitude = unscaled.unsigned_abs();
    if scale == 0 {
        return format!("{}{}", sign, magnitude);
    }
    let unit = 10u128.pow(scale);
    format!(
        "{}{}.{:0width$}",
        sign,
        magnitude / unit,
        magnitude % unit,
        width = scale as usize
    )
}

// --- BOOLEAN, REAL, BINARY ---

/// `1`, `t` and `T` are true; every other text is false.
fn decode_boolean(raw: RawCell<'_>) -> Result<bool> {
    match raw {
        RawCell::Text(bytes) => Ok(matches!(bytes.first(), Some(b'1' | b't' | b'T'))),
        RawCell::Bool(value) => Ok(value),
        other => Err(shape_mismatch(LogicalType::Boolean, &other)),
    }
}

fn decode_real(raw: RawCell<'_>, target: NativeType) -> Result<CellValue> {
    let value = match raw {
        RawCell::Text(bytes) => numeric::parse_f64(bytes, 0, bytes.len())?,
        RawCell::Double(value) => value,
        other => return Err(shape_mismatch(LogicalType::Real, &other)),
    };
    match target {
        NativeType::Decimal => Decimal::try_from(value)
            .map(CellValue::Decimal)
            .map_err(|_| ChunkError::Overflow(format!("{} cannot be read as Decimal", value))),
        _ => Ok(CellValue::Double(value)),
    }
}

fn decode_binary(raw: RawCell<'_>) -> Result<Vec<u8>> {
    match raw {
        RawCell::Text(hex) => decode_hex(hex),
        RawCell::Binary(bytes) => Ok(bytes.to_vec()),
        other => Err(shape_mismatch(LogicalType::Binary, &other)),
    }
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    fn nibble(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }
    let invalid = || {
        ChunkError::Format(format!(
            "'{}' is not valid hexadecimal",
            String::from_utf8_lossy(hex)
        ))
    };
    if hex.len() % 2 != 0 {
        return Err(invalid());
    }
    hex.chunks_exact(2)
        .map(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(invalid)
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

// --- DATE, TIME, TIMESTAMP ---

fn date_millis(raw: RawCell<'_>) -> Result<i64> {
    match raw {
        RawCell::Text(bytes) => numeric::parse_i64(bytes, 0, bytes.len()),
        RawCell::Int(millis) => Ok(millis),
        other => Err(shape_mismatch(LogicalType::Date, &other)),
    }
}

fn instant_ticks(raw: RawCell<'_>, logical: LogicalType, scale: i32) -> Result<i64> {
    match raw {
        RawCell::Text(bytes) => temporal::parse_seconds_text(bytes, scale),
        RawCell::Int(value) => temporal::scaled_to_ticks(value, scale),
        RawCell::EpochFraction { epoch, fraction } => {
            temporal::epoch_fraction_to_ticks(epoch, fraction)
        }
        other => Err(shape_mismatch(logical, &other)),
    }
}

fn zoned_ticks(raw: RawCell<'_>, scale: i32) -> Result<(i64, i32)> {
    match raw {
        RawCell::Text(bytes) => {
            let (seconds, tz) = temporal::split_tz_text(bytes)?;
            Ok((temporal::parse_seconds_text(seconds, scale)?, tz))
        }
        RawCell::ScaledWithOffset { value, tz } => {
            Ok((temporal::scaled_to_ticks(value, scale)?, tz))
        }
        RawCell::EpochFractionWithOffset { epoch, fraction, tz } => {
            Ok((temporal::epoch_fraction_to_ticks(epoch, fraction)?, tz))
        }
        other => Err(shape_mismatch(LogicalType::TimestampTz, &other)),
    }
}

//==================================================================================
// 3. Encode
//==================================================================================

/// Encodes a native value into the wire shape `decode` reads for `logical` at `scale`.
pub fn encode(value: &CellValue, logical: LogicalType, scale: i32) -> Result<WireValue> {
    use LogicalType as L;
    let wire = match (logical, value) {
        (_, CellValue::Null) => WireValue::Null,

        (L::Fixed, CellValue::Int(v)) => {
            let scale = fixed_scale(scale)?;
            let unscaled = (*v as i128).checked_mul(10i128.pow(scale)).ok_or_else(|| {
                ChunkError::Overflow(format!("{} does not fit FIXED at scale {}", v, scale))
            })?;
            fixed_wire(unscaled)
        }
        (L::Fixed, CellValue::Decimal(d)) => fixed_wire(rescale_decimal(d, fixed_scale(scale)?)?),
        (L::Fixed, CellValue::Text(s)) => {
            let d = numeric::parse_decimal(s.as_bytes(), 0, s.len())?;
            fixed_wire(rescale_decimal(&d, fixed_scale(scale)?)?)
        }

        (L::Boolean, CellValue::Boolean(b)) => WireValue::Bool(*b),

        (L::Real, CellValue::Double(v)) => WireValue::Double(*v),
        (L::Real, CellValue::Int(v)) => WireValue::Double(*v as f64),
        (L::Real, CellValue::Decimal(d)) => WireValue::Double(d.to_f64().ok_or_else(|| {
            ChunkError::Overflow(format!("{} cannot be represented as a double", d))
        })?),

        (t, CellValue::Text(s)) if t.is_textual() => WireValue::Text(s.clone()),
        (L::Binary, CellValue::Binary(b)) => WireValue::Binary(b.clone()),

        (L::Date, CellValue::Date(d)) => WireValue::Int(temporal::date_to_millis(d)),
        (L::Date, CellValue::Timestamp(dt)) => WireValue::Int(temporal::date_to_millis(&dt.date())),

        (L::Time, CellValue::Time(t)) => {
            WireValue::Int(temporal::ticks_to_scaled(temporal::time_to_ticks(t), scale)?)
        }

        (L::TimestampNtz, CellValue::Timestamp(dt)) => {
            instant_wire(temporal::naive_to_ticks(dt)?, scale)?
        }
        (L::TimestampLtz, CellValue::TimestampOffset(dt)) => {
            instant_wire(temporal::instant_to_ticks(dt)?, scale)?
        }
        (L::TimestampTz, CellValue::TimestampOffset(dt)) => {
            let ticks = temporal::truncate_ticks(temporal::instant_to_ticks(dt)?, scale)?;
            let tz = temporal::encode_tz_offset(dt.offset());
            if scale <= temporal::SINGLE_FIELD_MAX_SCALE {
                WireValue::ScaledWithOffset {
                    value: temporal::ticks_to_scaled(ticks, scale)?,
                    tz,
                }
            } else {
                let (epoch, fraction) = temporal::ticks_to_epoch_fraction(ticks);
                WireValue::EpochFractionWithOffset { epoch, fraction, tz }
            }
        }

        (logical, other) => {
            return Err(ChunkError::Conversion(format!(
                "Invalid conversion from {} to {}",
                other.type_name(),
                logical
            )))
        }
    };
    Ok(wire)
}

fn fixed_wire(unscaled: i128) -> WireValue {
    match i64::try_from(unscaled) {
        Ok(v) => WireValue::Int(v),
        Err(_) => WireValue::Decimal(unscaled),
    }
}

/// The unscaled integer of `value` at exactly `scale` fractional digits.
fn rescale_decimal(value: &Decimal, scale: u32) -> Result<i128> {
    let mantissa = value.mantissa();
    let current = value.scale();
    if current > scale {
        let unit = 10i128.pow(current - scale);
        if mantissa % unit != 0 {
            return Err(ChunkError::Overflow(format!(
                "{} has more than {} fractional digits",
                value, scale
            )));
        }
        Ok(mantissa / unit)
    } else {
        mantissa
            .checked_mul(10i128.pow(scale - current))
            .ok_or_else(|| {
                ChunkError::Overflow(format!("{} does not fit FIXED at scale {}", value, scale))
            })
    }
}

fn instant_wire(ticks: i64, scale: i32) -> Result<WireValue> {
    let ticks = temporal::truncate_ticks(ticks, scale)?;
    if scale <= temporal::SINGLE_FIELD_MAX_SCALE {
        Ok(WireValue::Int(temporal::ticks_to_scaled(ticks, scale)?))
    } else {
        let (epoch, fraction) = temporal::ticks_to_epoch_fraction(ticks);
        Ok(WireValue::EpochFraction { epoch, fraction })
    }
}

/// Renders the text form of a bind value; `None` binds SQL NULL.
pub fn encode_bind_text(value: &CellValue, logical: LogicalType, scale: i32) -> Result<Option<String>> {
    let text = match encode(value, logical, scale)? {
        WireValue::Null => return Ok(None),
        WireValue::Text(s) => s,
        WireValue::Bool(b) => b.to_string(),
        WireValue::Double(v) => v.to_string(),
        WireValue::Binary(bytes) => encode_hex(&bytes),
        WireValue::Decimal(unscaled) => format_unscaled(unscaled, fixed_scale(scale)?),
        WireValue::Int(v) => match logical {
            LogicalType::Fixed => format_unscaled(v as i128, fixed_scale(scale)?),
            LogicalType::Date => v.to_string(),
            _ => temporal::format_seconds_text(temporal::scaled_to_ticks(v, scale)?, scale)?,
        },
        WireValue::EpochFraction { epoch, fraction } => temporal::format_seconds_text(
            temporal::epoch_fraction_to_ticks(epoch, fraction)?,
            scale,
        )?,
        WireValue::ScaledWithOffset { value, tz } => format!(
            "{} {}",
            temporal::format_seconds_text(temporal::scaled_to_ticks(value, scale)?, scale)?,
            tz
        ),
        WireValue::EpochFractionWithOffset { epoch, fraction, tz } => format!(
            "{} {}",
            temporal::format_seconds_text(temporal::epoch_fraction_to_ticks(epoch, fraction)?, scale)?,
            tz
        ),
    };
    Ok(Some(text))
}

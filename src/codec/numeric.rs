//! This module contains the pure, allocation-free kernels that parse integers
//! and decimals directly out of a byte range of a chunk buffer.
//!
//! Grammar: an optional leading `-`, one or more ASCII digits and, for decimals
//! only, one optional `.` followed by one or more digits. Malformed input is a
//! `Format` failure; a well-formed value that does not fit its target is an
//! `Overflow` failure. Format is checked over the whole range before any
//! accumulation, so a malformed value never reports overflow.

use num_traits::PrimInt;
use rust_decimal::Decimal;

use crate::error::{ChunkError, Result};

/// Largest scale a `Decimal` can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

//==================================================================================
// 1. Range Validation
//==================================================================================

/// Resolves `[offset, offset + length)` inside `buf`.
///
/// An empty buffer or a range that escapes the buffer is a caller bug, reported
/// as `Internal` with the offending coordinates instead of panicking on a slice index.
fn checked_range(buf: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
    if buf.is_empty() {
        return Err(ChunkError::Internal(format!(
            "numeric parser received an empty buffer (offset {}, length {})",
            offset, length
        )));
    }
    let end = offset.checked_add(length).ok_or_else(|| {
        ChunkError::Internal(format!(
            "numeric range overflows usize (offset {}, length {})",
            offset, length
        ))
    })?;
    buf.get(offset..end).ok_or_else(|| {
        ChunkError::Internal(format!(
            "numeric range [{}, {}) is outside a buffer of {} bytes",
            offset,
            end,
            buf.len()
        ))
    })
}

fn split_sign(bytes: &[u8]) -> (bool, &[u8]) {
    match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    }
}

fn describe(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

//==================================================================================
// 2. Integer Parsing
//==================================================================================

/// Parses a signed integer of width `T` from `buf[offset..offset + length]`.
///
/// Overflow is detected digit by digit with checked arithmetic in `T` itself;
/// negative values accumulate downward so `T::min_value()` parses exactly.
pub fn parse_int<T>(buf: &[u8], offset: usize, length: usize) -> Result<T>
where
    T: PrimInt,
{
    let bytes = checked_range(buf, offset, length)?;
    let (negative, digits) = split_sign(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ChunkError::Format(format!(
            "'{}' is not a valid integer",
            describe(bytes)
        )));
    }

    let ten = T::from(10u8)
        .ok_or_else(|| ChunkError::Internal("integer target cannot hold 10".to_string()))?;
    let overflow = || {
        ChunkError::Overflow(format!(
            "'{}' does not fit in a {}-bit integer",
            describe(bytes),
            std::mem::size_of::<T>() * 8
        ))
    };

    let mut acc = T::zero();
    for &b in digits {
        let digit = T::from(b - b'0')
            .ok_or_else(|| ChunkError::Internal("integer target cannot hold a digit".to_string()))?;
        acc = acc.checked_mul(&ten).ok_or_else(overflow)?;
        acc = if negative {
            acc.checked_sub(&digit)
        } else {
            acc.checked_add(&digit)
        }
        .ok_or_else(overflow)?;
    }
    Ok(acc)
}

pub fn parse_i8(buf: &[u8], offset: usize, length: usize) -> Result<i8> {
    parse_int::<i8>(buf, offset, length)
}

pub fn parse_i16(buf: &[u8], offset: usize, length: usize) -> Result<i16> {
    parse_int::<i16>(buf, offset, length)
}

pub fn parse_i32(buf: &[u8], offset: usize, length: usize) -> Result<i32> {
    parse_int::<i32>(buf, offset, length)
}

pub fn parse_i64(buf: &[u8], offset: usize, length: usize) -> Result<i64> {
    parse_int::<i64>(buf, offset, length)
}

//==================================================================================
// 3. Decimal Parsing
//==================================================================================

/// Parses an exact base-10 fixed-point value from `buf[offset..offset + length]`.
///
/// The integral part may exceed the 64-bit range; digits accumulate into an
/// `i128` mantissa. Fraction digits beyond what a `Decimal` can carry are
/// truncated. A value whose integral part exceeds the 96-bit `Decimal`
/// mantissa is an `Overflow`.
pub fn parse_decimal(buf: &[u8], offset: usize, length: usize) -> Result<Decimal> {
    let bytes = checked_range(buf, offset, length)?;
    let (negative, body) = split_sign(bytes);

    let (integral, fraction) = match body.iter().position(|&b| b == b'.') {
        Some(dot) => (&body[..dot], Some(&body[dot + 1..])),
        None => (body, None),
    };
    let well_formed = !integral.is_empty()
        && integral.iter().all(u8::is_ascii_digit)
        && fraction.map_or(true, |f| !f.is_empty() && f.iter().all(u8::is_ascii_digit));
    if !well_formed {
        return Err(ChunkError::Format(format!(
            "'{}' is not a valid decimal",
            describe(bytes)
        )));
    }

    let overflow = || ChunkError::Overflow(format!("'{}' exceeds the decimal range", describe(bytes)));

    let mut mantissa: i128 = 0;
    for &b in integral {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((b - b'0') as i128))
            .ok_or_else(overflow)?;
    }

    let mut scale: u32 = 0;
    for &b in fraction.unwrap_or(&[]) {
        if scale == MAX_DECIMAL_SCALE {
            break;
        }
        match mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((b - b'0') as i128))
        {
            Some(m) => {
                mantissa = m;
                scale += 1;
            }
            None => break,
        }
    }

    if negative {
        mantissa = -mantissa;
    }
    decimal_from_parts(mantissa, scale).ok_or_else(overflow)
}

/// Builds a `Decimal` from an unscaled mantissa, dropping fraction digits
/// (truncation toward zero) until the mantissa fits 96 bits.
pub(crate) fn decimal_from_parts(mut mantissa: i128, mut scale: u32) -> Option<Decimal> {
    loop {
        if let Ok(value) = Decimal::try_from_i128_with_scale(mantissa, scale) {
            return Some(value);
        }
        if scale == 0 {
            return None;
        }
        mantissa /= 10;
        scale -= 1;
    }
}

//==================================================================================
// 4. Floating Point
//==================================================================================

/// Parses a REAL cell. Unlike the integer and decimal kernels, `NaN`, infinities
/// and magnitudes beyond the `f64` range are accepted (the latter become ±inf).
pub fn parse_f64(buf: &[u8], offset: usize, length: usize) -> Result<f64> {
    let bytes = checked_range(buf, offset, length)?;
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ChunkError::Format(format!("'{}' is not valid UTF-8", describe(bytes))))?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| ChunkError::Format(format!("'{}' is not a valid double", text)))
}

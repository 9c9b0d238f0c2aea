//! Scale, tick and timezone-offset rules for DATE, TIME and TIMESTAMP_* cells.
//!
//! Every temporal value passes through one canonical unit: ticks of 100
//! nanoseconds since the Unix epoch (or since midnight for TIME). A cell with
//! scale `s` carries `ticks / 10^(7-s)` for `s <= 7` and `ticks * 10^(s-7)`
//! for `s > 7`. Sub-tick digits are truncated toward negative infinity so
//! pre-epoch instants stay ordered.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::codec::numeric;
use crate::error::{ChunkError, Result};

//==================================================================================
// 0. Constants
//==================================================================================

pub const TICKS_PER_SECOND: i64 = 10_000_000;
pub const NANOS_PER_TICK: i64 = 100;
pub const TICKS_PER_DAY: i64 = 86_400 * TICKS_PER_SECOND;
pub const MILLIS_PER_DAY: i64 = 86_400_000;
/// Timezone offsets travel as `1440 + offsetMinutes` so -24h..+24h stay non-negative.
pub const TZ_OFFSET_BIAS: i32 = 1440;
/// Highest scale whose single-integer timestamp encoding is used; above it the
/// value is split into `(epochSeconds, fraction)`.
pub const SINGLE_FIELD_MAX_SCALE: i32 = 3;
pub const MAX_SCALE: i32 = 9;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

//==================================================================================
// 1. Scale Rules
//==================================================================================

fn check_scale(scale: i32) -> Result<u32> {
    if (0..=MAX_SCALE).contains(&scale) {
        Ok(scale as u32)
    } else {
        Err(ChunkError::Format(format!(
            "temporal scale {} is outside 0..={}",
            scale, MAX_SCALE
        )))
    }
}

fn tick_overflow(raw: i64, scale: i32) -> ChunkError {
    ChunkError::Overflow(format!(
        "value {} at scale {} exceeds the tick range",
        raw, scale
    ))
}

/// Converts a scaled integer to ticks: `raw * 10^(7-scale)` or `raw / 10^(scale-7)`.
pub fn scaled_to_ticks(raw: i64, scale: i32) -> Result<i64> {
    let scale = check_scale(scale)? as i32;
    if scale <= 7 {
        raw.checked_mul(10i64.pow((7 - scale) as u32))
            .ok_or_else(|| tick_overflow(raw, scale))
    } else {
        Ok(raw.div_euclid(10i64.pow((scale - 7) as u32)))
    }
}

/// The exact inverse of `scaled_to_ticks` for values representable at `scale`.
pub fn ticks_to_scaled(ticks: i64, scale: i32) -> Result<i64> {
    let scale = check_scale(scale)? as i32;
    if scale <= 7 {
        Ok(ticks.div_euclid(10i64.pow((7 - scale) as u32)))
    } else {
        ticks
            .checked_mul(10i64.pow((scale - 7) as u32))
            .ok_or_else(|| tick_overflow(ticks, scale))
    }
}

/// Drops the digits of `ticks` finer than `scale`. Scales of 7 and above
/// are at or below tick resolution and leave `ticks` unchanged.
pub fn truncate_ticks(ticks: i64, scale: i32) -> Result<i64> {
    let scale = check_scale(scale)?;
    if scale >= 7 {
        return Ok(ticks);
    }
    let unit = 10i64.pow(7 - scale);
    Ok(ticks - ticks.rem_euclid(unit))
}

/// Two-field encoding: `(epochSeconds, fraction)` where `fraction` is
/// `100 * (ticks mod 10^7)`, i.e. nanoseconds at tick resolution.
pub fn ticks_to_epoch_fraction(ticks: i64) -> (i64, i32) {
    let epoch = ticks.div_euclid(TICKS_PER_SECOND);
    let fraction = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    (epoch, fraction as i32)
}

pub fn epoch_fraction_to_ticks(epoch: i64, fraction: i32) -> Result<i64> {
    if !(0..1_000_000_000).contains(&fraction) {
        return Err(ChunkError::Format(format!(
            "timestamp fraction {} is outside 0..1e9",
            fraction
        )));
    }
    epoch
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(fraction as i64 / NANOS_PER_TICK))
        .ok_or_else(|| {
            ChunkError::Overflow(format!("epoch {} exceeds the tick range", epoch))
        })
}

//==================================================================================
// 2. Timezone Offsets
//==================================================================================

/// Maps the biased wire value (`offsetMinutes + 1440`) to an offset. The
/// exact +/-24h ends (`tz` 0 and 2880) are rejected: `FixedOffset` only
/// holds offsets strictly inside a day.
pub fn decode_tz_offset(tz: i32) -> Result<FixedOffset> {
    let minutes = tz - TZ_OFFSET_BIAS;
    FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
        ChunkError::Format(format!(
            "timezone value {} maps to an offset of {} minutes, outside +/-24h",
            tz, minutes
        ))
    })
}

pub fn encode_tz_offset(offset: &FixedOffset) -> i32 {
    offset.local_minus_utc() / 60 + TZ_OFFSET_BIAS
}

//==================================================================================
// 3. Chrono Conversions
//==================================================================================

pub fn ticks_to_utc(ticks: i64) -> Result<DateTime<chrono::Utc>> {
    let (secs, nanos) = ticks_to_epoch_fraction(ticks);
    DateTime::from_timestamp(secs, nanos as u32).ok_or_else(|| {
        ChunkError::Overflow(format!("{} ticks is outside the supported date range", ticks))
    })
}

pub fn ticks_to_naive(ticks: i64) -> Result<NaiveDateTime> {
    Ok(ticks_to_utc(ticks)?.naive_utc())
}

pub fn naive_to_ticks(value: &NaiveDateTime) -> Result<i64> {
    let utc = value.and_utc();
    utc.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(utc.timestamp_subsec_nanos() as i64 / NANOS_PER_TICK))
        .ok_or_else(|| ChunkError::Overflow(format!("{} exceeds the tick range", value)))
}

pub fn instant_to_ticks<Tz: chrono::TimeZone>(value: &DateTime<Tz>) -> Result<i64> {
    naive_to_ticks(&value.naive_utc())
}

pub fn ticks_to_time(ticks: i64) -> Result<NaiveTime> {
    if !(0..TICKS_PER_DAY).contains(&ticks) {
        return Err(ChunkError::Overflow(format!(
            "{} ticks is not a time of day",
            ticks
        )));
    }
    let secs = (ticks / TICKS_PER_SECOND) as u32;
    let nanos = ((ticks % TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| ChunkError::Overflow(format!("{} ticks is not a time of day", ticks)))
}

pub fn time_to_ticks(value: &NaiveTime) -> i64 {
    // Leap-second nanos (>= 1e9) clamp into the last tick of the second.
    let nanos = value.nanosecond().min(999_999_999) as i64;
    value.num_seconds_from_midnight() as i64 * TICKS_PER_SECOND + nanos / NANOS_PER_TICK
}

fn unix_epoch_date() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

/// DATE cells carry the milliseconds of the date's midnight since the epoch.
pub fn millis_to_date(millis: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            ChunkError::Overflow(format!("{} ms is outside the supported date range", millis))
        })
}

pub fn date_to_millis(value: &NaiveDate) -> i64 {
    value.signed_duration_since(unix_epoch_date()).num_days() * MILLIS_PER_DAY
}

//==================================================================================
// 4. Text Forms
//==================================================================================

/// Parses `[-]seconds[.fraction]` into ticks, truncating the fraction to
/// `scale` digits first.
pub fn parse_seconds_text(bytes: &[u8], scale: i32) -> Result<i64> {
    let scale = check_scale(scale)?;
    let (negative, body) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    let (integral, fraction) = match body.iter().position(|&b| b == b'.') {
        Some(dot) => (&body[..dot], &body[dot + 1..]),
        None => (body, &[][..]),
    };
    if integral.is_empty()
        || !integral.iter().all(u8::is_ascii_digit)
        || !fraction.iter().all(u8::is_ascii_digit)
    {
        return Err(ChunkError::Format(format!(
            "'{}' is not a valid seconds value",
            String::from_utf8_lossy(bytes)
        )));
    }
    let seconds = numeric::parse_i64(integral, 0, integral.len())? as i128;

    let kept = &fraction[..fraction.len().min(scale as usize)];
    let mut nanos: i128 = 0;
    for (i, &b) in kept.iter().enumerate() {
        nanos += (b - b'0') as i128 * 10i128.pow(8 - i as u32);
    }

    let magnitude = seconds * NANOS_PER_SECOND + nanos;
    let total = if negative { -magnitude } else { magnitude };
    let ticks = total.div_euclid(NANOS_PER_TICK as i128);
    i64::try_from(ticks).map_err(|_| {
        ChunkError::Overflow(format!(
            "'{}' exceeds the tick range",
            String::from_utf8_lossy(bytes)
        ))
    })
}

/// Renders ticks as `[-]seconds[.fraction]` with exactly `scale` fraction digits.
pub fn format_seconds_text(ticks: i64, scale: i32) -> Result<String> {
    let scale = check_scale(scale)?;
    let total_nanos = ticks as i128 * NANOS_PER_TICK as i128;
    let scaled = total_nanos.div_euclid(10i128.pow(9 - scale));
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    if scale == 0 {
        return Ok(format!("{}{}", sign, magnitude));
    }
    let unit = 10u128.pow(scale);
    Ok(format!(
        "{}{}.{:0width$}",
        sign,
        magnitude / unit,
        magnitude % unit,
        width = scale as usize
    ))
}

/// Splits a TIMESTAMP_TZ text cell `"<seconds>[.<fraction>] <tz>"`.
pub fn split_tz_text(bytes: &[u8]) -> Result<(&[u8], i32)> {
    let space = bytes.iter().position(|&b| b == b' ').ok_or_else(|| {
        ChunkError::Format(format!(
            "'{}' is missing its timezone component",
            String::from_utf8_lossy(bytes)
        ))
    })?;
    let tz_part = &bytes[space + 1..];
    if tz_part.is_empty() {
        return Err(ChunkError::Format(format!(
            "'{}' has an empty timezone component",
            String::from_utf8_lossy(bytes)
        )));
    }
    let tz = numeric::parse_i32(tz_part, 0, tz_part.len())?;
    Ok((&bytes[..space], tz))
}

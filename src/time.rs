// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Epoch-second helpers and caller timezone handling.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{ReplayError, Result};

pub const HOUR_SECS: i64 = 3600;

/// Current wall-clock time as epoch seconds.
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Start of the UTC hour containing `ts`.
pub fn floor_hour(ts: f64) -> i64 {
    (ts.floor() as i64).div_euclid(HOUR_SECS) * HOUR_SECS
}

/// Start of the UTC minute containing `ts`.
pub fn floor_minute(ts: f64) -> i64 {
    (ts.floor() as i64).div_euclid(60) * 60
}

/// Caller timezone: a fixed UTC offset or an IANA zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallerZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl CallerZone {
    /// Parse `utc`, `+05:30`, `-0800`, `+2` or an IANA name such as
    /// `America/New_York`. A `,` may stand in for `/` so the name fits in a
    /// single path segment (`America,New_York`).
    pub fn parse(tz: &str) -> Result<Self> {
        let tz = tz.trim();
        if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") {
            return Ok(CallerZone::Fixed(Utc.fix()));
        }
        if tz.starts_with('+') || tz.starts_with('-') {
            return parse_fixed(tz).map(CallerZone::Fixed);
        }
        tz.replace(',', "/")
            .parse::<Tz>()
            .map(CallerZone::Named)
            .map_err(|_| unsupported(tz))
    }

    /// Offset in effect at epoch second `ts`.
    pub fn offset_at(&self, ts: f64) -> FixedOffset {
        match self {
            CallerZone::Fixed(offset) => *offset,
            CallerZone::Named(tz) => tz
                .timestamp_opt(ts.floor() as i64, 0)
                .single()
                .map(|dt| dt.offset().fix())
                .unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Offset in effect at a local wall-clock time. Ambiguous times take the
    /// earlier instant, skipped times have none.
    fn offset_at_local(&self, local: &NaiveDateTime) -> Option<FixedOffset> {
        match self {
            CallerZone::Fixed(offset) => Some(*offset),
            CallerZone::Named(tz) => tz.from_local_datetime(local).earliest().map(|dt| dt.offset().fix()),
        }
    }
}

fn unsupported(tz: &str) -> ReplayError {
    ReplayError::invalid(format!("Unsupported timezone '{tz}'"))
}

/// Offset of `tz` right now. Accepts everything [`CallerZone::parse`] does.
pub fn parse_utc_offset(tz: &str) -> Result<FixedOffset> {
    Ok(CallerZone::parse(tz)?.offset_at(now_epoch()))
}

/// `+05:30`, `-0800` or `+2`.
fn parse_fixed(tz: &str) -> Result<FixedOffset> {
    let bad = || unsupported(tz);
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(bad()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().map_err(|_| bad())?, 0)
    } else {
        let split = digits.len() - 2;
        (
            digits[..split].parse::<i32>().map_err(|_| bad())?,
            digits[split..].parse::<i32>().map_err(|_| bad())?,
        )
    };
    if hours > 14 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

/// Sub-hour part of an offset, in minutes.
///
/// Whole hours do not move hour-bucket boundaries, only the minutes do
/// (e.g. `+05:30` gives 30, `-03:30` gives -30).
pub fn minute_modifier(offset: &FixedOffset) -> i64 {
    let secs = offset.local_minus_utc() as i64;
    (secs / 60) % 60
}

/// `[start, end]` covering one local hour, given as `YYYY-MM`, day and hour.
///
/// The end is one millisecond before the next hour so adjacent hours never
/// share a boundary segment.
pub fn hour_window(year_month: &str, day: u32, hour: u32, zone: &CallerZone) -> Result<(f64, f64)> {
    let bad = || ReplayError::invalid(format!("Invalid date {year_month}-{day} {hour}:00"));
    let (year, month) = year_month.split_once('-').ok_or_else(bad)?;
    let year: i32 = year.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or_else(bad)?;
    let offset = zone.offset_at_local(&naive).ok_or_else(bad)?;
    let local = offset.from_local_datetime(&naive).single().ok_or_else(bad)?;
    let start = local.with_timezone(&Utc).timestamp() as f64;
    Ok((start, start + HOUR_SECS as f64 - 0.001))
}

/// `YYYY-MM-DD HH` label of the local hour containing `ts`.
pub fn local_hour_label(ts: f64, offset: &FixedOffset) -> String {
    let secs = ts.floor() as i64;
    match offset.timestamp_opt(secs, 0).single() {
        Some(dt) => format!("{} {:02}", dt.format("%Y-%m-%d"), dt.hour()),
        None => String::new(),
    }
}

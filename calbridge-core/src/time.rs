//! Date/time input normalization.
//!
//! Tool callers send times in whatever shape they like: RFC 3339, ISO-8601
//! without seconds, a space instead of `T`, iCalendar basic format, or a bare
//! date. Everything is normalized to a UTC instant here. Text without zone
//! information is read in the caller's zone hint, or UTC when there is none.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{BridgeError, BridgeResult};

/// Formats for text that carries a numeric offset (a trailing `Z` is rewritten to `+00:00` first).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y%m%dT%H%M%S%:z",
];

/// Formats for text without zone information.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
];

/// True for exactly `YYYY-MM-DD` (no time component).
pub fn is_date_only(text: &str) -> bool {
    let bytes = text.trim().as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> BridgeResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| BridgeError::MalformedTimestamp(text.to_string()))
}

/// Resolve an IANA zone identifier.
pub fn resolve_zone(name: &str) -> BridgeResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| BridgeError::UnknownTimeZone(name.to_string()))
}

/// Parse date/time text into a UTC instant.
///
/// Returns `Ok(None)` for empty input so callers can fall back to their own
/// default. A zone identifier may be appended in brackets
/// (`2024-03-01T09:00[Europe/Paris]`) and wins over `zone_hint`. Date-only
/// text is read as local midnight. `zone_hint` is only resolved for text
/// without an offset of its own.
pub fn parse(text: Option<&str>, zone_hint: Option<&str>) -> BridgeResult<Option<DateTime<Utc>>> {
    let Some(raw) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let (value, suffix_zone) = split_zone_suffix(raw)?;
    let suffix_zone = suffix_zone.map(resolve_zone).transpose()?;

    if let Some(with_offset) = parse_with_offset(value) {
        return Ok(Some(with_offset.with_timezone(&Utc)));
    }

    let zone = match suffix_zone {
        Some(tz) => Some(tz),
        None => zone_hint
            .filter(|z| !z.trim().is_empty())
            .map(resolve_zone)
            .transpose()?,
    };

    let naive = if is_date_only(value) {
        parse_date(value)?.and_time(chrono::NaiveTime::MIN)
    } else {
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .ok_or_else(|| BridgeError::MalformedTimestamp(raw.to_string()))?
    };

    localize(naive, zone, raw).map(Some)
}

/// Interpret a wall-clock time in `zone` (UTC when absent).
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// do not exist (DST gap) are rejected.
pub fn localize(naive: NaiveDateTime, zone: Option<Tz>, original: &str) -> BridgeResult<DateTime<Utc>> {
    match zone {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| BridgeError::MalformedTimestamp(original.to_string())),
        None => Ok(naive.and_utc()),
    }
}

fn split_zone_suffix(text: &str) -> BridgeResult<(&str, Option<&str>)> {
    match text.strip_suffix(']') {
        Some(rest) => {
            let (value, zone) = rest
                .rsplit_once('[')
                .ok_or_else(|| BridgeError::MalformedTimestamp(text.to_string()))?;
            Ok((value.trim(), Some(zone)))
        }
        None => Ok((text, None)),
    }
}

fn parse_with_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }

    let normalized = match text.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => text.to_string(),
    };

    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_empty_input_is_absent_not_error() {
        assert_eq!(parse(Some(""), None).unwrap(), None);
        assert_eq!(parse(Some("   "), None).unwrap(), None);
        assert_eq!(parse(None, Some("Europe/Paris")).unwrap(), None);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse(Some("not-a-date"), None),
            Err(BridgeError::MalformedTimestamp(_))
        ));
        assert!(matches!(
            parse(Some("2024-13-01T10:00:00"), None),
            Err(BridgeError::MalformedTimestamp(_))
        ));
        assert!(matches!(
            parse(Some("2024-02-30"), None),
            Err(BridgeError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_explicit_offsets() {
        assert_eq!(
            parse(Some("2024-01-01T09:00:00Z"), None).unwrap(),
            Some(utc(2024, 1, 1, 9, 0))
        );
        assert_eq!(
            parse(Some("2024-01-01T09:00+02:00"), Some("America/New_York")).unwrap(),
            Some(utc(2024, 1, 1, 7, 0))
        );
        assert_eq!(
            parse(Some("20240101T090000Z"), None).unwrap(),
            Some(utc(2024, 1, 1, 9, 0))
        );
        assert_eq!(
            parse(Some("2024-01-01T09:00Z"), None).unwrap(),
            Some(utc(2024, 1, 1, 9, 0))
        );
    }

    #[test]
    fn test_naive_time_uses_hint_then_utc() {
        assert_eq!(
            parse(Some("2024-01-01T09:00:00"), None).unwrap(),
            Some(utc(2024, 1, 1, 9, 0))
        );
        assert_eq!(
            parse(Some("2024-01-01 09:00"), Some("Europe/Berlin")).unwrap(),
            Some(utc(2024, 1, 1, 8, 0))
        );
    }

    #[test]
    fn test_bracketed_zone_overrides_hint() {
        assert_eq!(
            parse(Some("2024-07-01T09:00[Europe/Paris]"), Some("Asia/Tokyo")).unwrap(),
            Some(utc(2024, 7, 1, 7, 0))
        );
    }

    #[test]
    fn test_unknown_zone() {
        assert!(matches!(
            parse(Some("2024-01-01T09:00"), Some("Mars/Olympus")),
            Err(BridgeError::UnknownTimeZone(z)) if z == "Mars/Olympus"
        ));
        assert!(matches!(
            parse(Some("2024-01-01T09:00Z[Mars/Olympus]"), None),
            Err(BridgeError::UnknownTimeZone(_))
        ));
    }

    #[test]
    fn test_hint_is_ignored_when_offset_is_explicit() {
        assert_eq!(
            parse(Some("2024-01-01T10:00:00Z"), Some("Mars/Base")).unwrap(),
            Some(utc(2024, 1, 1, 10, 0))
        );
        assert_eq!(
            parse(Some("2024-01-01T10:00+01:00"), Some("Mars/Base")).unwrap(),
            Some(utc(2024, 1, 1, 9, 0))
        );
    }

    #[test]
    fn test_date_only_is_local_midnight() {
        assert!(is_date_only("2024-01-01"));
        assert!(!is_date_only("2024-01-01T00:00"));
        assert!(!is_date_only("20240101"));
        assert_eq!(
            parse(Some("2024-01-01"), Some("Asia/Tokyo")).unwrap(),
            Some(utc(2023, 12, 31, 15, 0))
        );
    }

    #[test]
    fn test_dst_gap_is_rejected() {
        // 02:30 does not exist in Berlin on 2024-03-31
        assert!(matches!(
            parse(Some("2024-03-31T02:30"), Some("Europe/Berlin")),
            Err(BridgeError::MalformedTimestamp(_))
        ));
    }
}

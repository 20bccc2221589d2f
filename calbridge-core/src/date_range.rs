//! Date range for filtering events.

use chrono::{DateTime, Duration, Utc};

use crate::draft::check_order;
use crate::error::BridgeResult;
use crate::event::TimingSpec;
use crate::time;

pub const DEFAULT_PAST_DAYS: i64 = 7;
pub const DEFAULT_FUTURE_DAYS: i64 = 30;

/// Date range for filtering events.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// How far the default window reaches from now.
#[derive(Debug, Clone, Copy)]
pub struct RangeDefaults {
    pub past_days: i64,
    pub future_days: i64,
}

impl RangeDefaults {
    /// `now` minus `past_days`, `None` when that is not representable.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_days(self.past_days).and_then(|d| now.checked_sub_signed(d))
    }

    /// `now` plus `future_days`, `None` when that is not representable.
    pub fn window_end(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_days(self.future_days).and_then(|d| now.checked_add_signed(d))
    }
}

impl Default for RangeDefaults {
    fn default() -> Self {
        RangeDefaults {
            past_days: DEFAULT_PAST_DAYS,
            future_days: DEFAULT_FUTURE_DAYS,
        }
    }
}

impl Default for DateRange {
    /// Default range: the last week and the next 30 days
    fn default() -> Self {
        DateRange::around(Utc::now(), RangeDefaults::default())
    }
}

impl DateRange {
    pub fn unbounded() -> Self {
        DateRange { from: None, to: None }
    }

    pub fn around(now: DateTime<Utc>, defaults: RangeDefaults) -> Self {
        DateRange {
            from: defaults.window_start(now),
            to: defaults.window_end(now),
        }
    }

    /// Build a range from tool arguments.
    /// - `from`: "start" for unbounded, or any timestamp the normalizer accepts
    /// - `to`: any timestamp; a bare date includes that whole day
    /// - text without zone information is read in `zone` (UTC when absent)
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        zone: Option<&str>,
        defaults: RangeDefaults,
        now: DateTime<Utc>,
    ) -> BridgeResult<Self> {
        let from_dt = match from.map(str::trim) {
            Some("start") => None,
            other => time::parse(other, zone)?.or_else(|| defaults.window_start(now)),
        };

        let to_dt = match to.map(str::trim).filter(|t| !t.is_empty()) {
            Some(s) if time::is_date_only(s) => time::parse(Some(s), zone)?.map(|d| d + Duration::days(1)),
            Some(s) => time::parse(Some(s), zone)?,
            None => defaults.window_end(now),
        };

        if let (Some(f), Some(t)) = (from_dt, to_dt) {
            check_order(f, t)?;
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// True when the event's span touches the range.
    pub fn overlaps(&self, timing: &TimingSpec) -> bool {
        let start = timing.start_utc();
        let end = timing.end_utc().max(start);

        let after_from = match self.from {
            Some(from) if end == start => start >= from,
            Some(from) => end > from,
            None => true,
        };
        let before_to = match self.to {
            Some(to) => start < to,
            None => true,
        };

        after_from && before_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap()
    }

    fn timed(start_hour: u32, end_hour: u32) -> TimingSpec {
        TimingSpec::Timed {
            start: Utc.with_ymd_and_hms(2024, 4, 20, start_hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 4, 20, end_hour, 0, 0).unwrap(),
            zone: None,
        }
    }

    #[test]
    fn test_defaults_reach_a_week_back_and_a_month_ahead() {
        let range = DateRange::from_args(None, None, None, RangeDefaults::default(), now()).unwrap();
        assert_eq!(range.from, Some(Utc.with_ymd_and_hms(2024, 4, 8, 12, 0, 0).unwrap()));
        assert_eq!(range.to, Some(Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_bare_end_date_includes_the_whole_day() {
        let range = DateRange::from_args(
            Some("2024-04-20"),
            Some("2024-04-20"),
            Some("Europe/Berlin"),
            RangeDefaults::default(),
            now(),
        )
        .unwrap();

        assert_eq!(range.from, Some(Utc.with_ymd_and_hms(2024, 4, 19, 22, 0, 0).unwrap()));
        assert_eq!(range.to, Some(Utc.with_ymd_and_hms(2024, 4, 20, 22, 0, 0).unwrap()));
        assert!(range.overlaps(&timed(21, 23)));
        assert!(!range.overlaps(&timed(22, 23)));
    }

    #[test]
    fn test_unrepresentable_window_is_open_ended() {
        let huge = RangeDefaults {
            past_days: 9_999_999_999,
            future_days: 9_999_999_999,
        };
        assert_eq!(DateRange::around(now(), huge), DateRange::unbounded());

        let range = DateRange::from_args(Some("2024-04-01"), None, None, huge, now()).unwrap();
        assert_eq!(range.from, Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()));
        assert_eq!(range.to, None);
    }

    #[test]
    fn test_start_keyword_is_unbounded() {
        let range = DateRange::from_args(Some("start"), None, None, RangeDefaults::default(), now()).unwrap();
        assert_eq!(range.from, None);
        assert!(range.overlaps(&TimingSpec::AllDay {
            start: NaiveDate::from_ymd_opt(1999, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(1999, 1, 2).unwrap(),
        }));
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let result = DateRange::from_args(
            Some("2024-05-01T00:00:00Z"),
            Some("2024-04-01T00:00:00Z"),
            None,
            RangeDefaults::default(),
            now(),
        );
        assert!(matches!(result, Err(BridgeError::InvalidTimeRange { .. })));
    }

    #[test]
    fn test_overlap_edges() {
        let range = DateRange {
            from: Some(Utc.with_ymd_and_hms(2024, 4, 20, 10, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 4, 20, 12, 0, 0).unwrap()),
        };

        assert!(!range.overlaps(&timed(8, 10)));
        assert!(range.overlaps(&timed(9, 11)));
        assert!(range.overlaps(&timed(11, 14)));
        assert!(!range.overlaps(&timed(12, 13)));
        assert!(range.overlaps(&timed(10, 10)));
        assert!(DateRange::unbounded().overlaps(&timed(0, 1)));
    }
}

//! RRULE expansion for range queries over recurring events.

use calbridge_core::date_range::DateRange;
use calbridge_core::event::{RecurrenceRule, TimingSpec};
use calbridge_core::time;
use chrono::{DateTime, Duration, Utc};
use rrule::{RRuleError, RRuleSet};

/// Occurrences examined past the lower edge of the range
const LOOKAHEAD: u16 = 16;

/// Build an iCalendar-format RRULE string for the rrule crate parser.
fn build_rrule_string(timing: &TimingSpec, rule: &RecurrenceRule) -> String {
    // The rrule crate needs a datetime, so all-day dates become midnight UTC
    let dtstart = match timing {
        TimingSpec::AllDay { start, .. } => format!("DTSTART:{}T000000Z", start.format("%Y%m%d")),
        TimingSpec::Timed { start, zone, .. } => {
            match zone.as_deref().and_then(|z| time::resolve_zone(z).ok()) {
                Some(tz) => format!(
                    "DTSTART;TZID={}:{}",
                    tz.name(),
                    start.with_timezone(&tz).format("%Y%m%dT%H%M%S")
                ),
                None => format!("DTSTART:{}", start.format("%Y%m%dT%H%M%SZ")),
            }
        }
    };

    format!("{dtstart}\nRRULE:{}", rule.as_str())
}

/// True when some occurrence of the series starting at `timing` overlaps `range`.
pub fn series_overlaps(timing: &TimingSpec, rule: &RecurrenceRule, range: &DateRange) -> Result<bool, RRuleError> {
    let mut rrule_set: RRuleSet = build_rrule_string(timing, rule).parse()?;
    let length = (timing.end_utc() - timing.start_utc()).max(Duration::zero());

    // after/before are exclusive; an occurrence starting `length` before the
    // range still reaches into it
    let tz: rrule::Tz = Utc.into();
    if let Some(after) = range
        .from
        .and_then(|from| from.checked_sub_signed(length))
        .and_then(|from| from.checked_sub_signed(Duration::seconds(1)))
    {
        rrule_set = rrule_set.after(after.with_timezone(&tz));
    }
    if let Some(to) = range.to {
        rrule_set = rrule_set.before(to.with_timezone(&tz));
    }

    let result = rrule_set.all(LOOKAHEAD);
    Ok(result.dates.iter().any(|occurrence| {
        let start: DateTime<Utc> = occurrence.with_timezone(&Utc);
        range.overlaps(&TimingSpec::Timed {
            start,
            end: start + length,
            zone: None,
        })
    }))
}

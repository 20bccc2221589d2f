//! VTIMEZONE generation from the IANA database, and reading of the
//! VTIMEZONE definitions a calendar carries for non-IANA TZIDs.
//!
//! chrono-tz does not expose its transition table, so the transitions of the
//! event's year are found by probing the zone's UTC offset hour by hour and
//! narrowing each change down to the minute.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::{OffsetComponents, Tz};
use icalendar::parser::Component;
use rrule::RRuleSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("zone '{0}' is not in the IANA database")]
    UnknownZone(String),

    #[error("year {0} is out of range")]
    YearOutOfRange(i32),

    #[error("calendar has no VEVENT to anchor the VTIMEZONE")]
    NoEventBlock,

    #[error("zone '{zone}' has no yearly transition pattern around {year}")]
    IrregularTransitions { zone: String, year: i32 },
}

/// A change of UTC offset
#[derive(Debug, Clone, PartialEq)]
struct Transition {
    at: DateTime<Utc>,
    from: i32,
    to: i32,
    daylight: bool,
}

/// Insert a VTIMEZONE for `zone` in front of the VEVENT block of `ics`.
///
/// A `recurring` event gets yearly RRULE observances so occurrences after the
/// start year resolve to the right offsets. Zones whose transitions do not
/// follow a yearly weekday pattern are refused for recurring events.
pub fn insert_vtimezone(
    ics: &str,
    zone: &str,
    start: &DateTime<Utc>,
    recurring: bool,
) -> Result<String, EnrichmentError> {
    let tz: Tz = zone
        .parse()
        .map_err(|_| EnrichmentError::UnknownZone(zone.to_string()))?;
    let year = start.with_timezone(&tz).year();
    let block = vtimezone_block(tz, year, recurring)?;

    let position = ics
        .find("BEGIN:VEVENT")
        .ok_or(EnrichmentError::NoEventBlock)?;

    let mut enriched = String::with_capacity(ics.len() + block.len());
    enriched.push_str(&ics[..position]);
    enriched.push_str(&block);
    enriched.push_str(&ics[position..]);
    Ok(enriched)
}

fn vtimezone_block(tz: Tz, year: i32, recurring: bool) -> Result<String, EnrichmentError> {
    let year_start = year_start(year)?;
    let initial = tz.offset_from_utc_datetime(&year_start.naive_utc());
    let initial_secs = initial.fix().local_minus_utc();
    let initial_daylight = !initial.dst_offset().is_zero();

    let mut lines = vec![
        "BEGIN:VTIMEZONE".to_string(),
        format!("TZID:{}", tz.name()),
    ];
    push_observance(
        &mut lines,
        initial_daylight,
        "19700101T000000".to_string(),
        initial_secs,
        initial_secs,
        None,
    );

    let transitions = transitions_in_year(tz, year)?;
    let rules = if recurring && !transitions.is_empty() {
        yearly_rules(tz, year, &transitions)?
    } else {
        Vec::new()
    };

    for (i, transition) in transitions.iter().enumerate() {
        let onset = transition.local_onset().format("%Y%m%dT%H%M%S").to_string();
        push_observance(
            &mut lines,
            transition.daylight,
            onset,
            transition.from,
            transition.to,
            rules.get(i).map(String::as_str),
        );
    }

    lines.push("END:VTIMEZONE".to_string());

    let mut block = lines.join("\r\n");
    block.push_str("\r\n");
    Ok(block)
}

impl Transition {
    /// Wall-clock time of the transition in the offset it leaves.
    fn local_onset(&self) -> NaiveDateTime {
        (self.at + Duration::seconds(self.from.into())).naive_utc()
    }
}

/// `FREQ=YEARLY;BYMONTH=..;BYDAY=..` for each transition of `year`, checked
/// against the transitions of the following year.
fn yearly_rules(tz: Tz, year: i32, transitions: &[Transition]) -> Result<Vec<String>, EnrichmentError> {
    let irregular = || EnrichmentError::IrregularTransitions {
        zone: tz.name().to_string(),
        year,
    };
    if transitions.len() != 2 {
        return Err(irregular());
    }

    let next_year = transitions_in_year(tz, year + 1)?;
    if next_year.len() != transitions.len() {
        return Err(irregular());
    }

    let mut rules = Vec::with_capacity(transitions.len());
    for (this, next) in transitions.iter().zip(&next_year) {
        let onset = this.local_onset();
        let ordinal = weekday_ordinal(onset.date());
        let expected = nth_weekday(year + 1, onset.month(), onset.weekday(), ordinal)
            .map(|date| date.and_time(onset.time()));

        let repeats = expected == Some(next.local_onset())
            && (this.from, this.to, this.daylight) == (next.from, next.to, next.daylight);
        if !repeats {
            return Err(irregular());
        }

        rules.push(format!(
            "FREQ=YEARLY;BYMONTH={};BYDAY={}{}",
            onset.month(),
            ordinal,
            weekday_code(onset.weekday())
        ));
    }
    Ok(rules)
}

/// Position of `date` among the same weekdays of its month: -1 for the last
/// one, otherwise 1 to 4.
fn weekday_ordinal(date: NaiveDate) -> i8 {
    let day = date.day();
    if day + 7 > days_in_month(date.year(), date.month()) {
        -1
    } else {
        ((day - 1) / 7 + 1) as i8
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, ordinal: i8) -> Option<NaiveDate> {
    if ordinal > 0 {
        return NaiveDate::from_weekday_of_month_opt(year, month, weekday, ordinal as u8);
    }
    let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))?;
    let back = (last.weekday().num_days_from_monday() + 7 - weekday.num_days_from_monday()) % 7;
    last.checked_sub_signed(Duration::days(back.into()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// A STANDARD or DAYLIGHT observance of an embedded VTIMEZONE
struct Observance {
    start: NaiveDateTime,
    rule: Option<String>,
    from: i32,
    to: i32,
}

impl Observance {
    fn read(component: &Component) -> Option<Self> {
        let prop = |name: &str| component.find_prop(name).map(|p| p.val.as_ref().trim());
        let start = prop("DTSTART")?;
        let start = NaiveDateTime::parse_from_str(start.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()?;
        Some(Observance {
            start,
            rule: prop("RRULE").map(str::to_string),
            from: parse_offset(prop("TZOFFSETFROM")?)?,
            to: parse_offset(prop("TZOFFSETTO")?)?,
        })
    }

    /// The last onset of this observance at or before `local`.
    fn latest_onset(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.start > local {
            return None;
        }
        let Some(ref rule) = self.rule else {
            return Some(self.start);
        };

        // Local wall-clock times are expanded as if they were UTC
        let text = format!("DTSTART:{}Z\nRRULE:{}", self.start.format("%Y%m%dT%H%M%S"), rule);
        let set: RRuleSet = match text.parse() {
            Ok(set) => set,
            Err(err) => {
                tracing::debug!(rule = %rule, error = %err, "unreadable observance RRULE, using its DTSTART");
                return Some(self.start);
            }
        };

        let tz: rrule::Tz = Utc.into();
        let before = (local + Duration::seconds(1)).and_utc().with_timezone(&tz);
        set.before(before)
            .all(u16::MAX)
            .dates
            .last()
            .map(|onset| onset.naive_utc())
    }
}

/// UTC offset in seconds that the calendar's own VTIMEZONE named `tzid`
/// assigns to the wall-clock time `local`. `None` when no such VTIMEZONE is
/// present or it has no readable observance.
pub(crate) fn embedded_offset(zones: &[Component], tzid: &str, local: NaiveDateTime) -> Option<i32> {
    let vtimezone = zones.iter().find(|c| {
        c.name == "VTIMEZONE"
            && c.find_prop("TZID")
                .is_some_and(|p| p.val.as_ref().trim().trim_matches('"') == tzid)
    })?;

    let observances: Vec<Observance> = vtimezone
        .components
        .iter()
        .filter(|c| c.name == "STANDARD" || c.name == "DAYLIGHT")
        .filter_map(Observance::read)
        .collect();

    let current = observances
        .iter()
        .filter_map(|o| o.latest_onset(local).map(|onset| (onset, o.to)))
        .max_by_key(|(onset, _)| *onset);

    match current {
        Some((_, offset)) => Some(offset),
        // Before the first onset the offset in force is what that onset changes from
        None => observances.iter().min_by_key(|o| o.start).map(|o| o.from),
    }
}

/// `+0100`, `-0530`, `+053000`
fn parse_offset(value: &str) -> Option<i32> {
    let (sign, digits) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    if !matches!(digits.len(), 4 | 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let seconds: i32 = if digits.len() == 6 { digits[4..6].parse().ok()? } else { 0 };
    Some(sign * (hours * 3600 + minutes * 60 + seconds))
}

fn push_observance(
    lines: &mut Vec<String>,
    daylight: bool,
    onset: String,
    from: i32,
    to: i32,
    rule: Option<&str>,
) {
    let kind = if daylight { "DAYLIGHT" } else { "STANDARD" };
    lines.push(format!("BEGIN:{kind}"));
    lines.push(format!("DTSTART:{onset}"));
    lines.push(format!("TZOFFSETFROM:{}", format_offset(from)));
    lines.push(format!("TZOFFSETTO:{}", format_offset(to)));
    if let Some(rule) = rule {
        lines.push(format!("RRULE:{rule}"));
    }
    lines.push(format!("END:{kind}"));
}

fn transitions_in_year(tz: Tz, year: i32) -> Result<Vec<Transition>, EnrichmentError> {
    let end = year_start(year + 1)?;
    let mut probe = year_start(year)?;
    let mut current = offset_secs(tz, &probe);
    let mut transitions = Vec::new();

    while probe < end {
        let next = probe + Duration::hours(1);
        let next_offset = offset_secs(tz, &next);

        if next_offset != current {
            // offset at probe + lo minutes is still `current`, at probe + hi it has changed
            let (mut lo, mut hi) = (0_i64, 60_i64);
            while hi - lo > 1 {
                let mid = (lo + hi) / 2;
                if offset_secs(tz, &(probe + Duration::minutes(mid))) == current {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }

            let at = probe + Duration::minutes(hi);
            let daylight = !tz
                .offset_from_utc_datetime(&at.naive_utc())
                .dst_offset()
                .is_zero();
            transitions.push(Transition {
                at,
                from: current,
                to: next_offset,
                daylight,
            });
            current = next_offset;
        }

        probe = next;
    }

    Ok(transitions)
}

fn year_start(year: i32) -> Result<DateTime<Utc>, EnrichmentError> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or(EnrichmentError::YearOutOfRange(year))
}

fn offset_secs(tz: Tz, instant: &DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&instant.naive_utc())
        .fix()
        .local_minus_utc()
}

/// `+0100`, `-0530`
fn format_offset(secs: i32) -> String {
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{sign}{:02}{:02}", secs / 3600, (secs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_berlin_has_two_transitions() {
        let transitions = transitions_in_year(chrono_tz::Europe::Berlin, 2024).unwrap();
        assert_eq!(transitions.len(), 2);

        // Clocks go forward at 01:00 UTC on the last Sunday of March
        assert_eq!(
            transitions[0].at,
            Utc.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap()
        );
        assert_eq!((transitions[0].from, transitions[0].to), (3600, 7200));
        assert!(transitions[0].daylight);

        assert_eq!(
            transitions[1].at,
            Utc.with_ymd_and_hms(2024, 10, 27, 1, 0, 0).unwrap()
        );
        assert!(!transitions[1].daylight);
    }

    #[test]
    fn test_block_for_zone_without_dst() {
        let block = vtimezone_block(chrono_tz::Asia::Tokyo, 2024, false).unwrap();
        assert_eq!(
            block,
            "BEGIN:VTIMEZONE\r\nTZID:Asia/Tokyo\r\nBEGIN:STANDARD\r\nDTSTART:19700101T000000\r\n\
             TZOFFSETFROM:+0900\r\nTZOFFSETTO:+0900\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n"
        );
    }

    #[test]
    fn test_berlin_daylight_onset_is_local_time() {
        let block = vtimezone_block(chrono_tz::Europe::Berlin, 2024, false).unwrap();
        assert!(block.contains(
            "BEGIN:DAYLIGHT\r\nDTSTART:20240331T020000\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200"
        ));
        assert!(block.contains("DTSTART:20241027T030000\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100"));
        assert!(!block.contains("RRULE"));
    }

    #[test]
    fn test_recurring_block_has_yearly_observances() {
        let block = vtimezone_block(chrono_tz::Europe::Berlin, 2024, true).unwrap();
        assert!(
            block.contains(
                "BEGIN:DAYLIGHT\r\nDTSTART:20240331T020000\r\nTZOFFSETFROM:+0100\r\n\
                 TZOFFSETTO:+0200\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU\r\nEND:DAYLIGHT"
            ),
            "{block}"
        );
        assert!(block.contains("RRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU\r\nEND:STANDARD"), "{block}");

        let new_york = vtimezone_block(chrono_tz::America::New_York, 2024, true).unwrap();
        assert!(new_york.contains("RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU"), "{new_york}");
        assert!(new_york.contains("RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU"), "{new_york}");

        // Fixed-offset zones need no rules
        let tokyo = vtimezone_block(chrono_tz::Asia::Tokyo, 2024, true).unwrap();
        assert!(!tokyo.contains("RRULE"));
    }

    #[test]
    fn test_recurring_block_refuses_changing_rules() {
        // Samoa skipped DST from 2021 on, so 2020's pattern does not repeat
        assert!(matches!(
            vtimezone_block(chrono_tz::Pacific::Apia, 2020, true),
            Err(EnrichmentError::IrregularTransitions { .. })
        ));
    }

    #[test]
    fn test_weekday_ordinals() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(weekday_ordinal(date(2024, 3, 31)), -1);
        assert_eq!(weekday_ordinal(date(2024, 3, 10)), 2);
        assert_eq!(nth_weekday(2025, 3, Weekday::Sun, -1), Some(date(2025, 3, 30)));
        assert_eq!(nth_weekday(2025, 3, Weekday::Sun, 2), Some(date(2025, 3, 9)));
    }

    const WINDOWS_ZONE: &str = "BEGIN:VCALENDAR\r\nBEGIN:VTIMEZONE\r\nTZID:W. Europe Standard Time\r\n\
BEGIN:STANDARD\r\nDTSTART:16010101T030000\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100\r\n\
RRULE:FREQ=YEARLY;BYDAY=-1SU;BYMONTH=10\r\nEND:STANDARD\r\n\
BEGIN:DAYLIGHT\r\nDTSTART:16010101T020000\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\n\
RRULE:FREQ=YEARLY;BYDAY=-1SU;BYMONTH=3\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\nEND:VCALENDAR\r\n";

    #[test]
    fn test_embedded_offset_follows_observance_rules() {
        let calendar = icalendar::parser::read_calendar(WINDOWS_ZONE).unwrap();
        let local = |m, d, h| NaiveDate::from_ymd_opt(2024, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap();

        let winter = embedded_offset(&calendar.components, "W. Europe Standard Time", local(1, 10, 9));
        assert_eq!(winter, Some(3600));
        let summer = embedded_offset(&calendar.components, "W. Europe Standard Time", local(7, 1, 9));
        assert_eq!(summer, Some(7200));
        assert_eq!(embedded_offset(&calendar.components, "Other Zone", local(7, 1, 9)), None);
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+0100"), Some(3600));
        assert_eq!(parse_offset("-0530"), Some(-19800));
        assert_eq!(parse_offset("+053045"), Some(19845));
        assert_eq!(parse_offset("0100"), None);
    }

    #[test]
    fn test_insert_requires_event_block_and_known_zone() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            insert_vtimezone("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n", "Europe/Berlin", &start, false),
            Err(EnrichmentError::NoEventBlock)
        ));
        assert!(matches!(
            insert_vtimezone("BEGIN:VEVENT\r\n", "Nowhere/Special", &start, false),
            Err(EnrichmentError::UnknownZone(_))
        ));
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(3600), "+0100");
        assert_eq!(format_offset(-19800), "-0530");
        assert_eq!(format_offset(0), "+0000");
    }
}

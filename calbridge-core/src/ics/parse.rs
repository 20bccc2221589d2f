//! ICS decoding using the icalendar crate's parser.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use icalendar::parser::{Component, Property, read_calendar, unfold};

use crate::error::{BridgeError, BridgeResult};
use super::timezone;
use crate::event::{AlarmAction, Anchor, CustomProperty, NormalizedEvent, RecurrenceRule, ReminderSpec, TimingSpec};
use crate::reminder::DEFAULT_MESSAGE;
use crate::time;

const ICS_DATE: &str = "%Y%m%d";
const ICS_DATE_TIME: &str = "%Y%m%dT%H%M%S";

/// A DTSTART/DTEND value as found on the wire
#[derive(Debug, Clone, PartialEq)]
enum WireTime {
    Date(NaiveDate),
    Instant {
        at: DateTime<Utc>,
        zone: Option<String>,
    },
}

/// Decode a VCALENDAR holding exactly one VEVENT.
pub fn decode_event(content: &str) -> BridgeResult<NormalizedEvent> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| BridgeError::MalformedContainer(e.to_string()))?;

    let mut vevents = calendar.components.iter().filter(|c| c.name == "VEVENT");
    let vevent = vevents
        .next()
        .ok_or_else(|| BridgeError::MalformedContainer("no VEVENT found".into()))?;
    if vevents.next().is_some() {
        return Err(BridgeError::MalformedContainer(
            "more than one VEVENT found".into(),
        ));
    }

    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| BridgeError::MalformedContainer("VEVENT has no UID".into()))?;

    let timing = read_timing(vevent, &calendar.components)?;

    let summary = text_prop(vevent, "SUMMARY").unwrap_or_default();
    let description = text_prop(vevent, "DESCRIPTION");
    let location = text_prop(vevent, "LOCATION");
    let recurrence_rule = vevent
        .find_prop("RRULE")
        .map(|p| RecurrenceRule::new(p.val.as_ref()));

    let revision = match vevent.find_prop("SEQUENCE") {
        Some(p) => p.val.as_ref().trim().parse().unwrap_or_else(|_| {
            tracing::warn!(uid = %uid, value = p.val.as_ref(), "unreadable SEQUENCE, treating as 0");
            0
        }),
        None => 0,
    };

    let (creation_stamp, creation_recorded) = match vevent
        .find_prop("CREATED")
        .and_then(|p| parse_utc_stamp(p.val.as_ref()))
    {
        Some(stamp) => (stamp, true),
        None => (Utc::now(), false),
    };

    let event_start = timing.start_utc();
    let reminders = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(|alarm| read_reminder(alarm, event_start))
        .collect();

    // Custom X- properties, kept verbatim for round-tripping vendor data
    let custom_properties = vevent
        .properties
        .iter()
        .filter(|p| p.name.as_ref().starts_with("X-"))
        .map(|p| CustomProperty {
            name: p.name.to_string(),
            params: p
                .params
                .iter()
                .map(|param| (param.key.to_string(), param.val.as_ref().map(|v| v.to_string())))
                .collect(),
            value: p.val.to_string(),
        })
        .collect();

    Ok(NormalizedEvent {
        uid,
        summary,
        description,
        location,
        timing,
        recurrence_rule,
        reminders,
        revision,
        creation_stamp,
        creation_recorded,
        custom_properties,
    })
}

/// `zones` are the calendar's top-level components, searched for VTIMEZONE
/// definitions of TZIDs outside the IANA database.
fn read_timing(vevent: &Component, zones: &[Component]) -> BridgeResult<TimingSpec> {
    let start_prop = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| BridgeError::MalformedContainer("VEVENT has no DTSTART".into()))?;
    let start = read_wire_time(start_prop, zones)?;

    let end = match vevent.find_prop("DTEND") {
        Some(p) => read_wire_time(p, zones)?,
        None => implied_end(&start, vevent.find_prop("DURATION"))?,
    };

    match (start, end) {
        (WireTime::Date(start), WireTime::Date(end)) => {
            if end < start {
                return Err(BridgeError::InvalidTimeRange {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
            Ok(TimingSpec::AllDay { start, end })
        }
        (
            WireTime::Instant { at: start, zone },
            WireTime::Instant { at: end, zone: end_zone },
        ) => {
            if end < start {
                return Err(BridgeError::InvalidTimeRange {
                    start: start.to_rfc3339(),
                    end: end.to_rfc3339(),
                });
            }
            Ok(TimingSpec::Timed {
                start,
                end,
                zone: zone.or(end_zone),
            })
        }
        _ => Err(BridgeError::InconsistentTiming(
            "DTSTART and DTEND mix a bare date with a date-time".into(),
        )),
    }
}

/// End of an event without DTEND: DURATION if present, otherwise one day for
/// all-day events and zero length for timed ones (RFC 5545 §3.6.1).
fn implied_end(start: &WireTime, duration: Option<&Property>) -> BridgeResult<WireTime> {
    let duration = match duration {
        Some(p) => Some(parse_duration(p.val.as_ref()).ok_or_else(|| {
            BridgeError::MalformedContainer(format!("unreadable DURATION '{}'", p.val.as_ref()))
        })?),
        None => None,
    };

    let out_of_range = || BridgeError::MalformedContainer("DURATION puts the end out of range".into());
    Ok(match start {
        WireTime::Date(d) => {
            let days = duration.map(|d| d.num_days()).unwrap_or(1);
            let end = Duration::try_days(days)
                .and_then(|length| d.checked_add_signed(length))
                .ok_or_else(out_of_range)?;
            WireTime::Date(end)
        }
        WireTime::Instant { at, zone } => WireTime::Instant {
            at: at
                .checked_add_signed(duration.unwrap_or_else(Duration::zero))
                .ok_or_else(out_of_range)?,
            zone: zone.clone(),
        },
    })
}

/// Parse a DTSTART/DTEND property.
///
/// Handles:
/// - Bare dates: `DTSTART;VALUE=DATE:20240101` or `DTSTART:20240101`
/// - UTC: `DTSTART:20240101T090000Z`
/// - Zoned: `DTSTART;TZID=Europe/Berlin:20240101T090000`
/// - Zoned by the calendar's own VTIMEZONE: `DTSTART;TZID=W. Europe Standard Time:20240101T090000`
/// - Floating: `DTSTART:20240101T090000` (read as UTC)
fn read_wire_time(prop: &Property, zones: &[Component]) -> BridgeResult<WireTime> {
    let raw = prop.val.as_ref().trim();
    let malformed = || BridgeError::MalformedTimestamp(raw.to_string());

    let value_is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
    if value_is_date || !raw.contains('T') {
        return NaiveDate::parse_from_str(raw, ICS_DATE)
            .map(WireTime::Date)
            .map_err(|_| malformed());
    }

    if let Some(utc) = raw.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, ICS_DATE_TIME).map_err(|_| malformed())?;
        return Ok(WireTime::Instant {
            at: naive.and_utc(),
            zone: None,
        });
    }

    let naive = NaiveDateTime::parse_from_str(raw, ICS_DATE_TIME).map_err(|_| malformed())?;
    let Some(tzid) = param(prop, "TZID") else {
        return Ok(WireTime::Instant {
            at: naive.and_utc(),
            zone: None,
        });
    };

    let tzid = tzid.trim_matches('"');
    match time::resolve_zone(tzid) {
        Ok(tz) => Ok(WireTime::Instant {
            at: time::localize(naive, Some(tz), raw)?,
            zone: Some(tz.name().to_string()),
        }),
        Err(_) => {
            let at = match timezone::embedded_offset(zones, tzid, naive) {
                Some(offset) => naive
                    .checked_sub_signed(Duration::seconds(offset.into()))
                    .ok_or_else(malformed)?
                    .and_utc(),
                None => {
                    tracing::warn!(tzid, "unknown TZID without VTIMEZONE, reading {} as UTC", raw);
                    naive.and_utc()
                }
            };
            Ok(WireTime::Instant { at, zone: None })
        }
    }
}

/// Read one VALARM. Alarms without a usable TRIGGER are skipped.
fn read_reminder(alarm: &Component, event_start: DateTime<Utc>) -> Option<ReminderSpec> {
    let Some(trigger) = alarm.find_prop("TRIGGER") else {
        tracing::warn!("skipping VALARM without TRIGGER");
        return None;
    };
    let value = trigger.val.as_ref().trim();

    let is_absolute = param(trigger, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE-TIME"));
    let (offset_minutes, anchor) = if is_absolute {
        let Some(at) = parse_utc_stamp(value) else {
            tracing::warn!(trigger = value, "skipping VALARM with unreadable TRIGGER");
            return None;
        };
        ((event_start - at).num_minutes(), Anchor::Start)
    } else {
        let Some(minutes) = parse_trigger_minutes(value) else {
            tracing::warn!(trigger = value, "skipping VALARM with unreadable TRIGGER");
            return None;
        };
        let anchor = param(trigger, "RELATED")
            .and_then(|r| Anchor::parse(r).ok())
            .unwrap_or(Anchor::Start);
        (minutes, anchor)
    };

    let action = alarm
        .find_prop("ACTION")
        .map(|p| AlarmAction::parse(p.val.as_ref()))
        .unwrap_or(AlarmAction::Display);
    let message = text_prop(alarm, "DESCRIPTION")
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

    Some(ReminderSpec {
        offset_minutes,
        anchor,
        action,
        message,
    })
}

/// Parse TRIGGER value to minutes before the anchor (-PT30M, -P1D, PT5M, etc.)
fn parse_trigger_minutes(value: &str) -> Option<i64> {
    let is_before = value.starts_with('-');
    let minutes = parse_duration(value.trim_start_matches(['-', '+']))?.num_minutes();

    Some(if is_before { minutes } else { -minutes })
}

fn parse_duration(value: &str) -> Option<Duration> {
    let duration = iso8601::duration(value.trim()).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Parse a UTC stamp such as CREATED (`20240101T090000Z`; floating values are read as UTC).
fn parse_utc_stamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), ICS_DATE_TIME)
        .ok()
        .map(|naive| naive.and_utc())
}

fn param<'a>(prop: &'a Property, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref().map(|v| v.as_ref()))
}

fn text_prop(component: &Component, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
}

/// Undo RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

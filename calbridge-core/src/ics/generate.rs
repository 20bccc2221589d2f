//! ICS encoding.

use chrono::{DateTime, Utc};
use icalendar::{Alarm, Calendar, Component, EventLike, Property, Trigger, ValueType};

use super::timezone;
use crate::event::{Anchor, NormalizedEvent, ReminderSpec, TimingSpec};

/// Generate a VCALENDAR for `event`, stamped with `now` as DTSTAMP.
pub fn encode_event(event: &NormalizedEvent, product_id: &str, now: DateTime<Utc>) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    if !event.summary.is_empty() {
        ics_event.summary(&event.summary);
    }

    // DTSTAMP is the time this representation was produced, not the creation time
    ics_event.add_property("DTSTAMP", format_utc(&now));
    if event.creation_recorded {
        ics_event.add_property("CREATED", format_utc(&event.creation_stamp));
    }
    ics_event.add_property("SEQUENCE", event.revision.to_string());

    add_timing(&mut ics_event, &event.timing);

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    if let Some(ref rule) = event.recurrence_rule {
        ics_event.add_property("RRULE", rule.as_str());
    }

    for reminder in &event.reminders {
        ics_event.alarm(build_alarm(reminder));
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    let mut output = strip_ics_bloat(&cal.to_string(), product_id);
    if !event.custom_properties.is_empty() {
        output = insert_custom_properties(&output, event);
    }

    let TimingSpec::Timed {
        zone: Some(ref zone),
        ref start,
        ..
    } = event.timing
    else {
        return output;
    };

    // VTIMEZONE enrichment is optional: clients resolve IANA TZIDs on their own,
    // so a failure here leaves a calendar that is still valid.
    match timezone::insert_vtimezone(&output, zone, start, event.recurrence_rule.is_some()) {
        Ok(enriched) => enriched,
        Err(err) => {
            tracing::debug!(zone = %zone, error = %err, "skipping VTIMEZONE enrichment");
            output
        }
    }
}

/// Write the event's X- properties verbatim at the end of the VEVENT.
///
/// The icalendar builder keys properties by name, orders parameters and
/// escapes TEXT values, none of which may happen to vendor data.
fn insert_custom_properties(ics: &str, event: &NormalizedEvent) -> String {
    let mut block = String::new();
    for prop in &event.custom_properties {
        block.push_str(&fold_line(&prop.content_line()));
        block.push_str("\r\n");
    }

    let Some(position) = ics.rfind("END:VEVENT") else {
        return ics.to_string();
    };
    let mut result = String::with_capacity(ics.len() + block.len());
    result.push_str(&ics[..position]);
    result.push_str(&block);
    result.push_str(&ics[position..]);
    result
}

/// Fold a content line at 75 octets (RFC 5545 §3.1), never inside a UTF-8 character.
fn fold_line(line: &str) -> String {
    const LIMIT: usize = 75;
    let mut folded = String::with_capacity(line.len() + line.len() / LIMIT * 3);
    let mut rest = line;
    let mut limit = LIMIT;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        folded.push_str(&rest[..cut]);
        folded.push_str("\r\n ");
        rest = &rest[cut..];
        // continuation lines start with a space
        limit = LIMIT - 1;
    }
    folded.push_str(rest);
    folded
}

fn add_timing(ics_event: &mut icalendar::Event, timing: &TimingSpec) {
    match timing {
        TimingSpec::AllDay { start, end } => {
            for (name, date) in [("DTSTART", start), ("DTEND", end)] {
                let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
                prop.append_parameter(ValueType::Date);
                ics_event.append_property(prop);
            }
        }
        TimingSpec::Timed { start, end, zone } => {
            let tz = zone.as_deref().and_then(|z| z.parse::<chrono_tz::Tz>().ok());
            for (name, instant) in [("DTSTART", start), ("DTEND", end)] {
                match (tz, zone) {
                    (Some(tz), Some(tzid)) => {
                        // Datetime with TZID parameter, wall-clock time in that zone
                        let local = instant.with_timezone(&tz).naive_local();
                        let mut prop =
                            Property::new(name, local.format("%Y%m%dT%H%M%S").to_string());
                        prop.add_parameter("TZID", tzid);
                        ics_event.append_property(prop);
                    }
                    _ => {
                        ics_event.add_property(name, format_utc(instant));
                    }
                }
            }
        }
    }
}

fn build_alarm(reminder: &ReminderSpec) -> Alarm {
    let trigger = Trigger::before_start(chrono::Duration::minutes(reminder.offset_minutes));
    let mut alarm = Alarm::display(&reminder.message, trigger);
    alarm.add_property("ACTION", reminder.action.as_ics_str());

    // Written by hand so the value stays in minutes (-PT15M) and carries RELATED=END
    let mut trigger_prop = Property::new("TRIGGER", trigger_value(reminder.offset_minutes));
    if reminder.anchor == Anchor::End {
        trigger_prop.add_parameter("RELATED", Anchor::End.as_ics_str());
    }
    alarm.append_property(trigger_prop);
    alarm
}

/// TRIGGER duration for an offset before the anchor (negative offsets fire after it).
fn trigger_value(offset_minutes: i64) -> String {
    match offset_minutes {
        0 => "PT0M".to_string(),
        m if m > 0 => format!("-PT{m}M"),
        m => format!("PT{}M", -m),
    }
}

fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove DTSTAMP and UID inside VALARM sections (random per run, not required by RFC 5545)
fn strip_ics_bloat(ics: &str, product_id: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(product_id);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

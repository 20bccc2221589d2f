//! Normalized event types.
//!
//! Wire-level calendar objects are decoded into these types, and every other
//! part of calbridge (drafts, mutation planning, tools) works exclusively with
//! them.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// A calendar event, normalized from its iCalendar representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Globally stable identifier (`<token>@<namespace>`), never changed after creation
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timing: TimingSpec,
    /// RRULE value, carried verbatim
    pub recurrence_rule: Option<RecurrenceRule>,
    /// Reminders in wire order
    pub reminders: Vec<ReminderSpec>,
    /// Revision counter (SEQUENCE)
    pub revision: u32,
    /// Creation time (CREATED)
    pub creation_stamp: DateTime<Utc>,
    /// False when `creation_stamp` was inferred because the wire object had no CREATED.
    /// Inferred stamps are never written back.
    pub creation_recorded: bool,
    /// X- properties of the event, preserved for round-tripping vendor data
    pub custom_properties: Vec<CustomProperty>,
}

/// A vendor `X-` property kept exactly as read: parameters in wire order and
/// the value without any unescaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomProperty {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<(String, Option<String>)>,
    pub value: String,
}

impl CustomProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        CustomProperty {
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// The unfolded content line, `NAME;KEY=VAL:value`.
    pub fn content_line(&self) -> String {
        let mut line = self.name.clone();
        for (key, val) in &self.params {
            line.push(';');
            line.push_str(key);
            if let Some(val) = val {
                line.push('=');
                if val.contains([':', ';', ',']) {
                    line.push('"');
                    line.push_str(val);
                    line.push('"');
                } else {
                    line.push_str(val);
                }
            }
        }
        line.push(':');
        line.push_str(&self.value);
        line
    }
}

/// When an event happens. An event keeps its variant for its whole life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimingSpec {
    /// Bare calendar dates; `end` is exclusive as in RFC 5545
    AllDay { start: NaiveDate, end: NaiveDate },
    /// Zone-aware instants. `zone` is the IANA identifier used when encoding.
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        zone: Option<String>,
    },
}

impl TimingSpec {
    pub fn is_all_day(&self) -> bool {
        matches!(self, TimingSpec::AllDay { .. })
    }

    /// Start as a UTC instant (all-day dates start at midnight UTC).
    pub fn start_utc(&self) -> DateTime<Utc> {
        match self {
            TimingSpec::AllDay { start, .. } => start.and_time(chrono::NaiveTime::MIN).and_utc(),
            TimingSpec::Timed { start, .. } => *start,
        }
    }

    /// End as a UTC instant (all-day dates end at midnight UTC of the exclusive end date).
    pub fn end_utc(&self) -> DateTime<Utc> {
        match self {
            TimingSpec::AllDay { end, .. } => end.and_time(chrono::NaiveTime::MIN).and_utc(),
            TimingSpec::Timed { end, .. } => *end,
        }
    }

    /// ISO-8601 start: `YYYY-MM-DD` for all-day events, RFC 3339 in the event's zone otherwise.
    pub fn start_iso(&self) -> String {
        match self {
            TimingSpec::AllDay { start, .. } => start.format("%Y-%m-%d").to_string(),
            TimingSpec::Timed { start, zone, .. } => instant_iso(start, zone.as_deref()),
        }
    }

    pub fn end_iso(&self) -> String {
        match self {
            TimingSpec::AllDay { end, .. } => end.format("%Y-%m-%d").to_string(),
            TimingSpec::Timed { end, zone, .. } => instant_iso(end, zone.as_deref()),
        }
    }
}

fn instant_iso(instant: &DateTime<Utc>, zone: Option<&str>) -> String {
    match zone.and_then(|z| z.parse::<chrono_tz::Tz>().ok()) {
        Some(tz) => instant
            .with_timezone(&tz)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        None => instant.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// An RRULE value. Stored and emitted as-is, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecurrenceRule(String);

impl RecurrenceRule {
    pub fn new(rule: impl Into<String>) -> Self {
        RecurrenceRule(rule.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reminder (VALARM) attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSpec {
    /// Minutes before the anchor. Negative values (only produced when decoding
    /// foreign objects) trigger after the anchor.
    pub offset_minutes: i64,
    pub anchor: Anchor,
    pub action: AlarmAction,
    pub message: String,
}

/// Which edge of the event a reminder offset is measured from (TRIGGER;RELATED=)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Anchor {
    Start,
    End,
}

impl Anchor {
    /// Case-insensitive parse of `START` / `END`.
    pub fn parse(value: &str) -> BridgeResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(Anchor::Start),
            "END" => Ok(Anchor::End),
            _ => Err(BridgeError::InvalidAnchor(value.to_string())),
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Anchor::Start => "START",
            Anchor::End => "END",
        }
    }
}

/// VALARM ACTION. Unrecognized actions pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlarmAction {
    Display,
    Audio,
    Email,
    Other(String),
}

impl AlarmAction {
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "DISPLAY" => AlarmAction::Display,
            "AUDIO" => AlarmAction::Audio,
            "EMAIL" => AlarmAction::Email,
            _ => AlarmAction::Other(normalized),
        }
    }

    pub fn as_ics_str(&self) -> &str {
        match self {
            AlarmAction::Display => "DISPLAY",
            AlarmAction::Audio => "AUDIO",
            AlarmAction::Email => "EMAIL",
            AlarmAction::Other(action) => action,
        }
    }
}

impl From<String> for AlarmAction {
    fn from(value: String) -> Self {
        AlarmAction::parse(&value)
    }
}

impl From<AlarmAction> for String {
    fn from(action: AlarmAction) -> Self {
        action.as_ics_str().to_string()
    }
}

//! Partial updates of existing events.
//!
//! An update never edits a `NormalizedEvent` in place: the original wire text
//! is decoded, the requested fields are overlaid, and new wire text is encoded.
//! Identity (UID and creation stamp) always comes from the original, and the
//! revision advances by exactly one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::{check_order, non_empty};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{NormalizedEvent, RecurrenceRule, TimingSpec};
use crate::ics::IcsCodec;
use crate::reminder::{self, ReminderRequest};
use crate::time;

/// Fields a caller wants changed. Absent fields keep their original value.
///
/// Unknown keys are ignored when deserializing, including attempts to set
/// `uid` or a creation stamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOverlay {
    #[serde(default)]
    pub summary: Option<String>,
    /// Empty string clears the description
    #[serde(default)]
    pub description: Option<String>,
    /// Empty string clears the location
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Zone for `start`/`end` without zone information; on its own it re-labels
    /// the display zone of a timed event
    #[serde(default, alias = "timezone_name")]
    pub timezone: Option<String>,
    /// Empty string removes the recurrence
    #[serde(default, alias = "rrule")]
    pub recurrence_rule: Option<String>,
    /// Replaces all reminders (an empty list removes them)
    #[serde(default, alias = "alarm_configs")]
    pub reminders: Option<Vec<ReminderRequest>>,
    #[serde(default)]
    pub alarm_minutes_before: Option<i64>,
}

/// The result of planning an update.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub event: NormalizedEvent,
    pub ics: String,
}

/// Computes updated wire text for an existing event.
#[derive(Debug, Clone, Default)]
pub struct MutationPlanner {
    codec: IcsCodec,
}

impl MutationPlanner {
    pub fn new(codec: IcsCodec) -> Self {
        MutationPlanner { codec }
    }

    /// New wire text for `original` with `overlay` applied.
    pub fn plan_update(&self, original: &str, overlay: &EventOverlay) -> BridgeResult<String> {
        self.plan(original, overlay, Utc::now()).map(|planned| planned.ics)
    }

    /// Like [`plan_update`](Self::plan_update), also returning the updated event.
    pub fn plan(
        &self,
        original: &str,
        overlay: &EventOverlay,
        now: DateTime<Utc>,
    ) -> BridgeResult<PlannedUpdate> {
        let original = self
            .codec
            .decode(original)
            .map_err(|source| BridgeError::EventNotDecodable {
                source: Box::new(source),
            })?;

        let event = apply_overlay(original, overlay)?;
        let ics = self.codec.encode_at(&event, now);

        Ok(PlannedUpdate { event, ics })
    }
}

/// Overlay `overlay` on `original`, advancing the revision.
pub fn apply_overlay(original: NormalizedEvent, overlay: &EventOverlay) -> BridgeResult<NormalizedEvent> {
    let timing = overlay_timing(&original.timing, overlay)?;
    let reminders = reminder::from_requests(overlay.reminders.as_deref(), overlay.alarm_minutes_before)?;

    let mut event = original;
    event.timing = timing;
    event.revision = event.revision.saturating_add(1);

    if let Some(ref summary) = overlay.summary {
        event.summary = summary.clone();
    }
    if let Some(ref description) = overlay.description {
        event.description = non_empty(Some(description.clone()));
    }
    if let Some(ref location) = overlay.location {
        event.location = non_empty(Some(location.clone()));
    }
    if let Some(ref rule) = overlay.recurrence_rule {
        event.recurrence_rule = non_empty(Some(rule.clone())).map(RecurrenceRule::new);
    }
    if let Some(reminders) = reminders {
        event.reminders = reminders;
    }

    Ok(event)
}

/// New timing for an event. The timing class (all-day or timed) never changes.
fn overlay_timing(original: &TimingSpec, overlay: &EventOverlay) -> BridgeResult<TimingSpec> {
    let start = present(overlay.start.as_deref());
    let end = present(overlay.end.as_deref());
    let zone_override = non_empty(overlay.timezone.clone()).map(|z| z.trim().to_string());

    match original {
        TimingSpec::AllDay {
            start: orig_start,
            end: orig_end,
        } => {
            let read = |text: Option<&str>, fallback: NaiveDate| -> BridgeResult<NaiveDate> {
                match text {
                    Some(t) if time::is_date_only(t) => time::parse_date(t),
                    Some(_) => Err(BridgeError::InconsistentTiming(
                        "all-day event cannot take a date-time".into(),
                    )),
                    None => Ok(fallback),
                }
            };
            let start = read(start, *orig_start)?;
            let end = read(end, *orig_end)?;
            check_order(start, end)?;
            Ok(TimingSpec::AllDay { start, end })
        }
        TimingSpec::Timed {
            start: orig_start,
            end: orig_end,
            zone,
        } => {
            let zone = match zone_override {
                Some(z) => {
                    time::resolve_zone(&z)?;
                    Some(z)
                }
                None => zone.clone(),
            };
            let read = |text: Option<&str>, fallback: DateTime<Utc>| -> BridgeResult<DateTime<Utc>> {
                match text {
                    Some(t) if time::is_date_only(t) => Err(BridgeError::InconsistentTiming(
                        "timed event cannot take a bare date".into(),
                    )),
                    Some(t) => Ok(time::parse(Some(t), zone.as_deref())?.unwrap_or(fallback)),
                    None => Ok(fallback),
                }
            };
            let start = read(start, *orig_start)?;
            let end = read(end, *orig_end)?;
            check_order(start, end)?;
            Ok(TimingSpec::Timed { start, end, zone })
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

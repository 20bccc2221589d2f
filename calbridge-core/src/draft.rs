//! New events from tool arguments.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};
use crate::event::{NormalizedEvent, RecurrenceRule, TimingSpec};
use crate::reminder::{self, ReminderRequest};
use crate::time;

/// Arguments of the create-event tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "timezone_name")]
    pub timezone: Option<String>,
    #[serde(default, alias = "rrule")]
    pub recurrence_rule: Option<String>,
    #[serde(default, alias = "alarm_configs")]
    pub reminders: Option<Vec<ReminderRequest>>,
    #[serde(default)]
    pub alarm_minutes_before: Option<i64>,
}

/// Values a draft falls back on.
#[derive(Debug, Clone)]
pub struct DraftDefaults {
    /// Namespace part of generated UIDs
    pub uid_namespace: String,
    /// Zone for times without zone information when the draft names none
    pub timezone: Option<String>,
    /// Length of timed events created without an end
    pub duration: Duration,
}

impl Default for DraftDefaults {
    fn default() -> Self {
        DraftDefaults {
            uid_namespace: "calbridge".to_string(),
            timezone: None,
            duration: Duration::minutes(60),
        }
    }
}

impl EventDraft {
    /// Build a new event with a fresh UID, revision 0 and `now` as creation stamp.
    pub fn into_event(self, defaults: &DraftDefaults, now: DateTime<Utc>) -> BridgeResult<NormalizedEvent> {
        let zone = non_empty(self.timezone).or_else(|| defaults.timezone.clone());
        let timing = draft_timing(&self.start, self.end.as_deref(), zone, defaults.duration)?;

        let reminders = reminder::from_requests(self.reminders.as_deref(), self.alarm_minutes_before)?
            .unwrap_or_default();

        Ok(NormalizedEvent {
            uid: new_uid(&defaults.uid_namespace),
            summary: self.summary,
            description: non_empty(self.description),
            location: non_empty(self.location),
            timing,
            recurrence_rule: non_empty(self.recurrence_rule).map(RecurrenceRule::new),
            reminders,
            revision: 0,
            creation_stamp: now,
            creation_recorded: true,
            custom_properties: Vec::new(),
        })
    }
}

/// `<uuid>@<namespace>`
pub fn new_uid(namespace: &str) -> String {
    format!("{}@{}", Uuid::new_v4(), namespace)
}

fn draft_timing(
    start: &str,
    end: Option<&str>,
    zone: Option<String>,
    default_duration: Duration,
) -> BridgeResult<TimingSpec> {
    let end = end.map(str::trim).filter(|e| !e.is_empty());

    if time::is_date_only(start) {
        let start_date = time::parse_date(start)?;
        let end_date = match end {
            Some(e) if time::is_date_only(e) => time::parse_date(e)?,
            Some(_) => {
                return Err(BridgeError::InconsistentTiming(
                    "start is a date but end has a time".into(),
                ));
            }
            None => start_date + Duration::days(1),
        };
        check_order(start_date, end_date)?;
        return Ok(TimingSpec::AllDay {
            start: start_date,
            end: end_date,
        });
    }

    if end.is_some_and(time::is_date_only) {
        return Err(BridgeError::InconsistentTiming(
            "start has a time but end is a date".into(),
        ));
    }

    let start_at = time::parse(Some(start), zone.as_deref())?
        .ok_or_else(|| BridgeError::MalformedTimestamp(start.to_string()))?;
    let end_at = time::parse(end, zone.as_deref())?.unwrap_or(start_at + default_duration);
    check_order(start_at, end_at)?;

    Ok(TimingSpec::Timed {
        start: start_at,
        end: end_at,
        zone: zone.map(|z| z.trim().to_string()),
    })
}

pub(crate) fn check_order<T: PartialOrd + ToString>(start: T, end: T) -> BridgeResult<()> {
    if end < start {
        return Err(BridgeError::InvalidTimeRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AlarmAction, Anchor};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_timed_draft_defaults_to_one_hour() {
        let draft = EventDraft {
            summary: "Dentist".to_string(),
            start: "2024-05-10T09:00".to_string(),
            timezone: Some("Europe/Paris".to_string()),
            ..Default::default()
        };

        let event = draft.into_event(&DraftDefaults::default(), now()).unwrap();

        assert_eq!(
            event.timing,
            TimingSpec::Timed {
                start: Utc.with_ymd_and_hms(2024, 5, 10, 7, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap(),
                zone: Some("Europe/Paris".to_string()),
            }
        );
        assert_eq!(event.revision, 0);
        assert_eq!(event.creation_stamp, now());
        assert!(event.uid.ends_with("@calbridge"));
        assert!(event.reminders.is_empty());
    }

    #[test]
    fn test_date_only_draft_is_all_day() {
        let draft = EventDraft {
            summary: "Conference".to_string(),
            start: "2024-06-03".to_string(),
            end: Some("2024-06-06".to_string()),
            ..Default::default()
        };

        let event = draft.into_event(&DraftDefaults::default(), now()).unwrap();

        assert_eq!(
            event.timing,
            TimingSpec::AllDay {
                start: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 6, 6).unwrap(),
            }
        );
    }

    #[test]
    fn test_mixed_draft_is_rejected() {
        let draft = EventDraft {
            summary: "Broken".to_string(),
            start: "2024-06-03".to_string(),
            end: Some("2024-06-03T10:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            draft.into_event(&DraftDefaults::default(), now()),
            Err(BridgeError::InconsistentTiming(_))
        ));
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let draft = EventDraft {
            summary: "Backwards".to_string(),
            start: "2024-06-03T10:00:00Z".to_string(),
            end: Some("2024-06-03T09:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            draft.into_event(&DraftDefaults::default(), now()),
            Err(BridgeError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_draft_reminders_and_namespace() {
        let draft: EventDraft = serde_json::from_value(serde_json::json!({
            "summary": "Flight",
            "start": "2024-07-01T06:00:00Z",
            "rrule": "",
            "alarm_minutes_before": 120,
            "alarm_configs": [{"minutes_before": 180, "action": "audio", "related": "start"}]
        }))
        .unwrap();
        let defaults = DraftDefaults {
            uid_namespace: "example.org".to_string(),
            ..Default::default()
        };

        let event = draft.into_event(&defaults, now()).unwrap();

        assert!(event.uid.ends_with("@example.org"));
        assert_eq!(event.recurrence_rule, None);
        assert_eq!(event.reminders.len(), 1);
        assert_eq!(event.reminders[0].offset_minutes, 180);
        assert_eq!(event.reminders[0].action, AlarmAction::Audio);
        assert_eq!(event.reminders[0].anchor, Anchor::Start);
    }
}

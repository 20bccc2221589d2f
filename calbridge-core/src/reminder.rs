//! Reminder construction.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::event::{AlarmAction, Anchor, ReminderSpec};

pub const DEFAULT_MESSAGE: &str = "Reminder";

/// Build a reminder that fires `offset_minutes` before its anchor.
///
/// `action` and `anchor` are case-insensitive and default to `DISPLAY` and
/// `START`. Unknown actions are kept as-is; unknown anchors are rejected.
pub fn build(
    offset_minutes: i64,
    message: Option<&str>,
    action: Option<&str>,
    anchor: Option<&str>,
) -> BridgeResult<ReminderSpec> {
    if offset_minutes < 0 {
        return Err(BridgeError::InvalidReminderOffset(offset_minutes));
    }

    let anchor = match anchor.filter(|a| !a.trim().is_empty()) {
        Some(a) => Anchor::parse(a)?,
        None => Anchor::Start,
    };
    let action = action
        .filter(|a| !a.trim().is_empty())
        .map(AlarmAction::parse)
        .unwrap_or(AlarmAction::Display);
    let message = message
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MESSAGE)
        .to_string();

    Ok(ReminderSpec {
        offset_minutes,
        anchor,
        action,
        message,
    })
}

/// One entry of a structured reminder list in tool arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub minutes_before: i64,
    #[serde(default, alias = "description")]
    pub message: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, alias = "related")]
    pub anchor: Option<String>,
}

impl ReminderRequest {
    pub fn build(&self) -> BridgeResult<ReminderSpec> {
        build(
            self.minutes_before,
            self.message.as_deref(),
            self.action.as_deref(),
            self.anchor.as_deref(),
        )
    }
}

/// Resolve the two ways callers can ask for reminders.
///
/// A structured list wins over `alarm_minutes_before`; the two are never
/// combined. Returns `None` when the caller asked for neither.
pub fn from_requests(
    structured: Option<&[ReminderRequest]>,
    alarm_minutes_before: Option<i64>,
) -> BridgeResult<Option<Vec<ReminderSpec>>> {
    if let Some(list) = structured {
        if alarm_minutes_before.is_some() {
            tracing::debug!("alarm_minutes_before ignored: structured reminders take precedence");
        }
        return list
            .iter()
            .map(ReminderRequest::build)
            .collect::<BridgeResult<Vec<_>>>()
            .map(Some);
    }

    alarm_minutes_before
        .map(|minutes| build(minutes, None, None, None).map(|r| vec![r]))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let reminder = build(15, None, None, None).unwrap();
        assert_eq!(
            reminder,
            ReminderSpec {
                offset_minutes: 15,
                anchor: Anchor::Start,
                action: AlarmAction::Display,
                message: "Reminder".to_string(),
            }
        );
    }

    #[test]
    fn test_build_normalizes_case() {
        let reminder = build(5, Some("Leave now"), Some("audio"), Some("end")).unwrap();
        assert_eq!(reminder.action, AlarmAction::Audio);
        assert_eq!(reminder.anchor, Anchor::End);
        assert_eq!(reminder.message, "Leave now");
    }

    #[test]
    fn test_build_rejects_negative_offset_and_bad_anchor() {
        assert!(matches!(
            build(-1, None, None, None),
            Err(BridgeError::InvalidReminderOffset(-1))
        ));
        assert!(matches!(
            build(10, None, None, Some("NOON")),
            Err(BridgeError::InvalidAnchor(_))
        ));
    }

    #[test]
    fn test_structured_list_takes_precedence() {
        let list = vec![
            ReminderRequest {
                minutes_before: 60,
                ..Default::default()
            },
            ReminderRequest {
                minutes_before: 10,
                action: Some("email".to_string()),
                ..Default::default()
            },
        ];
        let reminders = from_requests(Some(&list), Some(5)).unwrap().unwrap();
        assert_eq!(reminders.len(), 2);
        assert_eq!(reminders[0].offset_minutes, 60);
        assert_eq!(reminders[1].action, AlarmAction::Email);
    }

    #[test]
    fn test_single_alarm_minutes() {
        let reminders = from_requests(None, Some(30)).unwrap().unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].offset_minutes, 30);
        assert_eq!(from_requests(None, None).unwrap(), None);
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let request: ReminderRequest = serde_json::from_str(
            r#"{"minutes_before": 20, "description": "Stand up", "related": "END"}"#,
        )
        .unwrap();
        let reminder = request.build().unwrap();
        assert_eq!(reminder.message, "Stand up");
        assert_eq!(reminder.anchor, Anchor::End);
    }
}

//! Calendar tools exposed to assistants.
//!
//! Every tool answers with a JSON object carrying `success`. Failures never
//! escape as errors: they become `{"success": false, "error": "..."}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::BridgeConfig;
use crate::date_range::{DateRange, RangeDefaults};
use crate::draft::{DraftDefaults, EventDraft};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{NormalizedEvent, ReminderSpec, TimingSpec};
use crate::ics::IcsCodec;
use crate::mutation::{EventOverlay, MutationPlanner};
use crate::store::{CalendarInfo, CalendarStore, PutMode, StoredEvent};

pub const TOOL_NAMES: &[&str] = &[
    "list_calendars",
    "list_events",
    "create_event",
    "update_event",
    "delete_event",
    "list_event_alarms",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsArgs {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub calendar_name: Option<String>,
    #[serde(default, alias = "timezone")]
    pub timezone_name: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventArgs {
    #[serde(default)]
    pub calendar_name: Option<String>,
    #[serde(flatten)]
    pub draft: EventDraft,
}

/// Identifies an existing event by UID or by its href.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRef {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default, alias = "url")]
    pub event_url: Option<String>,
    #[serde(default)]
    pub calendar_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEventArgs {
    #[serde(flatten)]
    pub target: EventRef,
    #[serde(flatten)]
    pub overlay: EventOverlay,
}

/// The tool set bound to one store.
pub struct Toolbox<S> {
    store: S,
    codec: IcsCodec,
    planner: MutationPlanner,
    draft_defaults: DraftDefaults,
    range_defaults: RangeDefaults,
}

impl<S: CalendarStore> Toolbox<S> {
    pub fn new(store: S, config: &BridgeConfig) -> Self {
        Toolbox {
            store,
            codec: config.codec(),
            planner: config.planner(),
            draft_defaults: config.draft_defaults(),
            range_defaults: config.range_defaults(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a tool by name with JSON arguments.
    pub async fn call(&self, tool: &str, args: Value) -> Value {
        tracing::info!(tool, "tool call");
        let args = if args.is_null() { json!({}) } else { args };

        match tool {
            "list_calendars" => self.list_calendars().await,
            "list_events" => match parse_args(args) {
                Ok(args) => self.list_events(args).await,
                Err(e) => reply(Err(e)),
            },
            "create_event" => match parse_args(args) {
                Ok(args) => self.create_event(args).await,
                Err(e) => reply(Err(e)),
            },
            "update_event" => match parse_args(args) {
                Ok(args) => self.update_event(args).await,
                Err(e) => reply(Err(e)),
            },
            "delete_event" => match parse_args(args) {
                Ok(args) => self.delete_event(args).await,
                Err(e) => reply(Err(e)),
            },
            "list_event_alarms" => match parse_args(args) {
                Ok(args) => self.list_event_alarms(args).await,
                Err(e) => reply(Err(e)),
            },
            other => reply(Err(BridgeError::Serialization(format!("Unknown tool '{other}'")))),
        }
    }

    pub async fn list_calendars(&self) -> Value {
        reply(self.store.calendars().await.map(|calendars| {
            json!({
                "count": calendars.len(),
                "calendars": calendars,
            })
        }))
    }

    pub async fn list_events(&self, args: ListEventsArgs) -> Value {
        reply(self.try_list_events(args, Utc::now()).await)
    }

    async fn try_list_events(&self, args: ListEventsArgs, now: DateTime<Utc>) -> BridgeResult<Value> {
        let range = DateRange::from_args(
            args.start.as_deref(),
            args.end.as_deref(),
            args.timezone_name.as_deref(),
            self.range_defaults,
            now,
        )?;

        let calendars = match present(args.calendar_name.as_deref()) {
            Some(name) => vec![self.store.find_calendar(name).await?],
            None => self.store.calendars().await?,
        };
        let single = calendars.len() == 1;

        let mut found: Vec<(NormalizedEvent, StoredEvent)> = Vec::new();
        for calendar in &calendars {
            let stored = match self.store.list_range(calendar, &range).await {
                Ok(stored) => stored,
                // One broken calendar should not hide the others
                Err(e) if !single => {
                    tracing::warn!(calendar = %calendar.name, error = %e, "skipping calendar");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for item in stored {
                match self.codec.decode(&item.data) {
                    Ok(event) => found.push((event, item)),
                    Err(e) => tracing::warn!(href = %item.href, error = %e, "skipping undecodable event"),
                }
            }
        }

        found.sort_by(|(a, _), (b, _)| {
            a.timing
                .start_utc()
                .cmp(&b.timing.start_utc())
                .then_with(|| a.summary.cmp(&b.summary))
        });
        if let Some(limit) = args.limit {
            found.truncate(limit.max(0) as usize);
        }

        let events: Vec<Value> = found
            .iter()
            .map(|(event, stored)| event_entry(event, stored))
            .collect();

        Ok(json!({
            "count": events.len(),
            "events": events,
            "date_range": {
                "start": range.from.map(|d| d.to_rfc3339()),
                "end": range.to.map(|d| d.to_rfc3339()),
            },
        }))
    }

    pub async fn create_event(&self, args: CreateEventArgs) -> Value {
        reply(self.try_create_event(args).await)
    }

    async fn try_create_event(&self, args: CreateEventArgs) -> BridgeResult<Value> {
        let calendar = self.resolve_calendar(args.calendar_name.as_deref()).await?;
        let now = Utc::now();
        let event = args.draft.into_event(&self.draft_defaults, now)?;
        let data = self.codec.encode_at(&event, now);

        let href = self
            .store
            .put(&calendar, &event.uid, &data, PutMode::Create)
            .await?;
        tracing::info!(uid = %event.uid, calendar = %calendar.name, "created event");

        let stored = StoredEvent {
            href: href.clone(),
            calendar: calendar.name,
            data,
        };
        Ok(json!({
            "uid": event.uid,
            "url": href,
            "event": event_entry(&event, &stored),
        }))
    }

    pub async fn update_event(&self, args: UpdateEventArgs) -> Value {
        reply(self.try_update_event(args).await)
    }

    async fn try_update_event(&self, args: UpdateEventArgs) -> BridgeResult<Value> {
        let (calendar, stored) = self.locate(&args.target).await?;
        let uid = uid_of(&args.target)?;

        let planned = self.planner.plan(&stored.data, &args.overlay, Utc::now())?;
        let href = self
            .store
            .put(&calendar, &uid, &planned.ics, PutMode::Update)
            .await?;
        tracing::info!(uid = %uid, revision = planned.event.revision, "updated event");

        let stored = StoredEvent {
            href: href.clone(),
            calendar: calendar.name,
            data: planned.ics,
        };
        Ok(json!({
            "uid": planned.event.uid,
            "url": href,
            "revision": planned.event.revision,
            "event": event_entry(&planned.event, &stored),
        }))
    }

    pub async fn delete_event(&self, target: EventRef) -> Value {
        reply(self.try_delete_event(target).await)
    }

    async fn try_delete_event(&self, target: EventRef) -> BridgeResult<Value> {
        let (calendar, stored) = self.locate(&target).await?;
        let uid = uid_of(&target)?;

        self.store.delete(&calendar, &uid).await?;
        tracing::info!(uid = %uid, calendar = %calendar.name, "deleted event");

        Ok(json!({
            "uid": uid,
            "url": stored.href,
            "deleted": true,
        }))
    }

    pub async fn list_event_alarms(&self, target: EventRef) -> Value {
        reply(self.try_list_event_alarms(target).await)
    }

    async fn try_list_event_alarms(&self, target: EventRef) -> BridgeResult<Value> {
        let (_, stored) = self.locate(&target).await?;
        let event = self.codec.decode(&stored.data)?;

        let alarms: Vec<Value> = event.reminders.iter().map(alarm_entry).collect();
        Ok(json!({
            "uid": event.uid,
            "count": alarms.len(),
            "alarms": alarms,
        }))
    }

    /// Named calendar, or the first one when no name is given.
    async fn resolve_calendar(&self, name: Option<&str>) -> BridgeResult<CalendarInfo> {
        match present(name) {
            Some(name) => self.store.find_calendar(name).await,
            None => self
                .store
                .calendars()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| BridgeError::CalendarNotFound("no calendars available".into())),
        }
    }

    /// Find the stored event, searching every calendar when none is named.
    async fn locate(&self, target: &EventRef) -> BridgeResult<(CalendarInfo, StoredEvent)> {
        let uid = uid_of(target)?;

        if let Some(name) = present(target.calendar_name.as_deref()) {
            let calendar = self.store.find_calendar(name).await?;
            let stored = self.store.fetch(&calendar, &uid).await?;
            return Ok((calendar, stored));
        }

        for calendar in self.store.calendars().await? {
            match self.store.fetch(&calendar, &uid).await {
                Ok(stored) => return Ok((calendar, stored)),
                Err(BridgeError::EventNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(BridgeError::EventNotFound(uid))
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> BridgeResult<T> {
    serde_json::from_value(args).map_err(|e| BridgeError::Serialization(e.to_string()))
}

fn reply(result: BridgeResult<Value>) -> Value {
    match result {
        Ok(Value::Object(mut body)) => {
            body.insert("success".to_string(), Value::Bool(true));
            Value::Object(body)
        }
        Ok(other) => json!({ "success": true, "result": other }),
        Err(e) => {
            tracing::warn!(error = %e, "tool failed");
            json!({ "success": false, "error": e.to_string() })
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn uid_of(target: &EventRef) -> BridgeResult<String> {
    if let Some(uid) = present(target.uid.as_deref()) {
        return Ok(uid.to_string());
    }
    present(target.event_url.as_deref())
        .and_then(uid_from_href)
        .ok_or_else(|| BridgeError::EventNotFound("no uid or event url given".into()))
}

/// Event hrefs end in `<uid>.ics`.
fn uid_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let filename = path.trim_end_matches('/').rsplit('/').next()?;
    let base = filename
        .strip_suffix(".ics")
        .or_else(|| filename.strip_suffix(".ICS"))
        .unwrap_or(filename);
    (!base.is_empty()).then(|| base.to_string())
}

fn event_entry(event: &NormalizedEvent, stored: &StoredEvent) -> Value {
    let zone = match event.timing {
        TimingSpec::Timed { ref zone, .. } => zone.clone(),
        TimingSpec::AllDay { .. } => None,
    };

    json!({
        "url": stored.href,
        "calendar_name": stored.calendar,
        "uid": event.uid,
        "summary": event.summary,
        "description": event.description,
        "location": event.location,
        "start": event.timing.start_iso(),
        "end": event.timing.end_iso(),
        "all_day": event.timing.is_all_day(),
        "timezone": zone,
        "rrule": event.recurrence_rule.as_ref().map(|r| r.as_str()),
        "alarm_count": event.reminders.len(),
    })
}

fn alarm_entry(reminder: &ReminderSpec) -> Value {
    json!({
        "minutes_before": reminder.offset_minutes,
        "related": reminder.anchor.as_ics_str(),
        "action": reminder.action.as_ics_str(),
        "description": reminder.message,
    })
}

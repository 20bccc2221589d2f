//! Calendar store backed by a local directory.
//!
//! Each subdirectory of the calendar directory is a calendar; each event is a
//! `<uid>.ics` file inside it.

use std::path::{Path, PathBuf};

use calbridge_core::date_range::DateRange;
use calbridge_core::error::{BridgeError, BridgeResult};
use calbridge_core::ics::IcsCodec;
use calbridge_core::store::{CalendarInfo, CalendarStore, PutMode, StoredEvent};

use crate::recurrence;

pub struct LocalStore {
    root: PathBuf,
    codec: IcsCodec,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, codec: IcsCodec) -> Self {
        LocalStore {
            root: root.into(),
            codec,
        }
    }

    fn calendar_path(&self, calendar: &CalendarInfo) -> PathBuf {
        PathBuf::from(&calendar.href)
    }

    /// The file holding `uid`: `<uid>.ics` when present, otherwise any file
    /// whose VEVENT carries that UID.
    async fn event_path(&self, calendar: &CalendarInfo, uid: &str) -> BridgeResult<Option<PathBuf>> {
        let dir = self.calendar_path(calendar);
        let direct = dir.join(filename_for(uid));
        if tokio::fs::try_exists(&direct).await? {
            return Ok(Some(direct));
        }

        for path in ics_files(&dir).await? {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if self.codec.decode(&content).is_ok_and(|e| e.uid == uid) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

impl CalendarStore for LocalStore {
    async fn calendars(&self) -> BridgeResult<Vec<CalendarInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut calendars = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            calendars.push(CalendarInfo {
                name,
                href: path.to_string_lossy().into_owned(),
            });
        }

        calendars.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(calendars)
    }

    /// Matches names case- and punctuation-insensitively ("Work Stuff" finds `work-stuff/`).
    async fn find_calendar(&self, name: &str) -> BridgeResult<CalendarInfo> {
        let wanted = slug::slugify(name);
        let calendars = self.calendars().await?;

        if let Some(exact) = calendars.iter().find(|c| c.name == name.trim()) {
            return Ok(exact.clone());
        }

        calendars
            .into_iter()
            .find(|c| slug::slugify(&c.name) == wanted)
            .ok_or_else(|| BridgeError::CalendarNotFound(name.to_string()))
    }

    async fn fetch(&self, calendar: &CalendarInfo, uid: &str) -> BridgeResult<StoredEvent> {
        let path = self
            .event_path(calendar, uid)
            .await?
            .ok_or_else(|| BridgeError::EventNotFound(uid.to_string()))?;
        let data = tokio::fs::read_to_string(&path).await?;

        Ok(StoredEvent {
            href: path.to_string_lossy().into_owned(),
            calendar: calendar.name.clone(),
            data,
        })
    }

    async fn put(&self, calendar: &CalendarInfo, uid: &str, data: &str, mode: PutMode) -> BridgeResult<String> {
        let existing = self.event_path(calendar, uid).await?;

        let path = match (mode, existing) {
            (PutMode::Create, Some(path)) => {
                return Err(BridgeError::Store(format!(
                    "An event with UID {uid} already exists at {}",
                    path.display()
                )));
            }
            (PutMode::Update, None) => return Err(BridgeError::EventNotFound(uid.to_string())),
            (PutMode::Update, Some(path)) => path,
            (PutMode::Create, None) => {
                let dir = self.calendar_path(calendar);
                tokio::fs::create_dir_all(&dir).await?;
                dir.join(filename_for(uid))
            }
        };

        tokio::fs::write(&path, data).await?;
        tracing::debug!(path = %path.display(), "wrote event");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn delete(&self, calendar: &CalendarInfo, uid: &str) -> BridgeResult<()> {
        let path = self
            .event_path(calendar, uid)
            .await?
            .ok_or_else(|| BridgeError::EventNotFound(uid.to_string()))?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    async fn list_range(&self, calendar: &CalendarInfo, range: &DateRange) -> BridgeResult<Vec<StoredEvent>> {
        let mut events = Vec::new();

        for path in ics_files(&self.calendar_path(calendar)).await? {
            let data = tokio::fs::read_to_string(&path).await?;
            let inside = match self.codec.decode(&data) {
                Ok(event) => match event.recurrence_rule {
                    Some(ref rule) => recurrence::series_overlaps(&event.timing, rule, range)
                        .unwrap_or_else(|err| {
                            tracing::warn!(path = %path.display(), error = %err, "cannot expand RRULE, listing the series");
                            true
                        }),
                    None => range.overlaps(&event.timing),
                },
                // Undecodable events are passed on for the caller to report
                Err(_) => true,
            };
            if !inside {
                continue;
            }
            events.push(StoredEvent {
                href: path.to_string_lossy().into_owned(),
                calendar: calendar.name.clone(),
                data,
            });
        }

        Ok(events)
    }
}

/// `<uid>.ics` with path separators replaced.
fn filename_for(uid: &str) -> String {
    let safe: String = uid
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    format!("{safe}.ics")
}

async fn ics_files(dir: &Path) -> BridgeResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "ics") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calbridge_core::config::BridgeConfig;
    use calbridge_core::tools::{ListEventsArgs, Toolbox};
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalStore {
        std::fs::create_dir_all(dir.path().join("work-stuff")).unwrap();
        std::fs::create_dir_all(dir.path().join("home")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        LocalStore::new(dir.path(), IcsCodec::default())
    }

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\nBEGIN:VEVENT\r\n\
UID:abc@example.org\r\nDTSTAMP:20240101T000000Z\r\nSUMMARY:Review\r\n\
DTSTART:20240420T090000Z\r\nDTEND:20240420T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[tokio::test]
    async fn test_calendars_are_visible_subdirectories() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let names: Vec<_> = store
            .calendars()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["home", "work-stuff"]);

        assert_eq!(store.find_calendar("Work Stuff").await.unwrap().name, "work-stuff");
        assert!(matches!(
            store.find_calendar("missing").await,
            Err(BridgeError::CalendarNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_fetch_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let home = store.find_calendar("home").await.unwrap();

        let href = store
            .put(&home, "abc@example.org", EVENT, PutMode::Create)
            .await
            .unwrap();
        assert!(href.ends_with("abc@example.org.ics"));

        assert!(matches!(
            store.put(&home, "abc@example.org", EVENT, PutMode::Create).await,
            Err(BridgeError::Store(_))
        ));

        let fetched = store.fetch(&home, "abc@example.org").await.unwrap();
        assert_eq!(fetched.data, EVENT);
        assert_eq!(fetched.calendar, "home");

        store.delete(&home, "abc@example.org").await.unwrap();
        assert!(matches!(
            store.fetch(&home, "abc@example.org").await,
            Err(BridgeError::EventNotFound(_))
        ));
        assert!(matches!(
            store.put(&home, "abc@example.org", EVENT, PutMode::Update).await,
            Err(BridgeError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_finds_file_by_uid_content() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(dir.path().join("home").join("2024-04-20__review.ics"), EVENT).unwrap();
        let home = store.find_calendar("home").await.unwrap();

        let fetched = store.fetch(&home, "abc@example.org").await.unwrap();
        assert!(fetched.href.ends_with("2024-04-20__review.ics"));
    }

    #[tokio::test]
    async fn test_list_range_filters_by_overlap() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(dir.path().join("home").join("abc.ics"), EVENT).unwrap();
        let home = store.find_calendar("home").await.unwrap();

        let april = DateRange::from_args(
            Some("2024-04-01"),
            Some("2024-04-30"),
            None,
            Default::default(),
            chrono::Utc::now(),
        )
        .unwrap();
        assert_eq!(store.list_range(&home, &april).await.unwrap().len(), 1);

        let may = DateRange::from_args(
            Some("2024-05-01"),
            Some("2024-05-31"),
            None,
            Default::default(),
            chrono::Utc::now(),
        )
        .unwrap();
        assert!(store.list_range(&home, &may).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_range_includes_recurring_series() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let weekly = EVENT
            .replace("DTSTART:20240420T090000Z", "DTSTART:20240101T090000Z")
            .replace("DTEND:20240420T100000Z", "DTEND:20240101T100000Z\r\nRRULE:FREQ=WEEKLY");
        std::fs::write(dir.path().join("home").join("weekly.ics"), weekly).unwrap();
        let home = store.find_calendar("home").await.unwrap();

        let april = DateRange::from_args(
            Some("2024-04-01"),
            Some("2024-04-30"),
            None,
            Default::default(),
            chrono::Utc::now(),
        )
        .unwrap();
        let listed = store.list_range(&home, &april).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].href.ends_with("weekly.ics"));

        let before_series = DateRange::from_args(
            Some("2023-04-01"),
            Some("2023-04-30"),
            None,
            Default::default(),
            chrono::Utc::now(),
        )
        .unwrap();
        assert!(store.list_range(&home, &before_series).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tools_over_directory() {
        let dir = TempDir::new().unwrap();
        let tools = Toolbox::new(store(&dir), &BridgeConfig::default());

        let created = tools
            .call(
                "create_event",
                json!({
                    "calendar_name": "Work Stuff",
                    "summary": "Offsite",
                    "start": "2024-09-02",
                    "end": "2024-09-04",
                    "alarm_minutes_before": 1440
                }),
            )
            .await;
        assert_eq!(created["success"], true, "{created}");
        let uid = created["uid"].as_str().unwrap().to_string();

        let updated = tools
            .call("update_event", json!({"uid": uid, "location": "Lisbon"}))
            .await;
        assert_eq!(updated["success"], true, "{updated}");
        assert_eq!(updated["revision"], 1);

        let listed = tools
            .list_events(ListEventsArgs {
                start: Some("2024-09-01".to_string()),
                end: Some("2024-09-30".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["events"][0]["location"], "Lisbon");
        assert_eq!(listed["events"][0]["all_day"], true);
        assert_eq!(listed["events"][0]["calendar_name"], "work-stuff");
    }
}

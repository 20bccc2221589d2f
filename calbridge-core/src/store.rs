//! Storage seam for calendars and their events.
//!
//! The engine never talks to a server or a disk itself. Tools are handed a
//! [`CalendarStore`] that keeps raw iCalendar text per event.

use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::BridgeResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub name: String,
    pub href: String,
}

/// Raw wire text of one event as it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub href: String,
    pub calendar: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fails when an event with the same UID exists
    Create,
    /// Fails when no event with the UID exists
    Update,
}

#[allow(async_fn_in_trait)]
pub trait CalendarStore {
    async fn calendars(&self) -> BridgeResult<Vec<CalendarInfo>>;

    /// Look up a calendar by display name (`CalendarNotFound` if missing).
    async fn find_calendar(&self, name: &str) -> BridgeResult<CalendarInfo>;

    /// `EventNotFound` if the calendar has no event with `uid`.
    async fn fetch(&self, calendar: &CalendarInfo, uid: &str) -> BridgeResult<StoredEvent>;

    /// Store `data` under `uid`, returning the event's href.
    async fn put(&self, calendar: &CalendarInfo, uid: &str, data: &str, mode: PutMode) -> BridgeResult<String>;

    async fn delete(&self, calendar: &CalendarInfo, uid: &str) -> BridgeResult<()>;

    /// Events whose span touches `range`.
    async fn list_range(&self, calendar: &CalendarInfo, range: &DateRange) -> BridgeResult<Vec<StoredEvent>>;
}

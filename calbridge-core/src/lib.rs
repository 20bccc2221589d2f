//! Core of calbridge: translation between assistant tool calls and iCalendar.
//!
//! This crate provides:
//! - `time` for normalizing loosely formatted date/time input
//! - `reminder` for building VALARM reminders
//! - `ics` for decoding and encoding VCALENDAR text
//! - `mutation` for partial updates that keep an event's identity
//! - `tools` for the assistant-facing tool set over a [`store::CalendarStore`]

pub mod config;
pub mod date_range;
pub mod draft;
pub mod error;
pub mod event;
pub mod ics;
pub mod mutation;
pub mod reminder;
pub mod store;
pub mod time;
pub mod tools;

pub use error::{BridgeError, BridgeResult};
pub use event::*;

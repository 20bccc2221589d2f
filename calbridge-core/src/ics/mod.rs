//! ICS encoding and decoding.
//!
//! This module converts between iCalendar text (RFC 5545) and
//! [`NormalizedEvent`].

mod generate;
mod parse;
mod timezone;

use chrono::{DateTime, Utc};

use crate::error::BridgeResult;
use crate::event::NormalizedEvent;

pub use generate::encode_event;
pub use parse::decode_event;
pub use timezone::EnrichmentError;

pub const DEFAULT_PRODUCT_ID: &str = "-//calbridge//EN";

/// Converts events to and from iCalendar text.
#[derive(Debug, Clone)]
pub struct IcsCodec {
    product_id: String,
}

impl Default for IcsCodec {
    fn default() -> Self {
        IcsCodec::new(DEFAULT_PRODUCT_ID)
    }
}

impl IcsCodec {
    pub fn new(product_id: impl Into<String>) -> Self {
        IcsCodec {
            product_id: product_id.into(),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn decode(&self, content: &str) -> BridgeResult<NormalizedEvent> {
        decode_event(content)
    }

    /// Encode with the current time as DTSTAMP.
    pub fn encode(&self, event: &NormalizedEvent) -> String {
        self.encode_at(event, Utc::now())
    }

    pub fn encode_at(&self, event: &NormalizedEvent, now: DateTime<Utc>) -> String {
        encode_event(event, &self.product_id, now)
    }
}

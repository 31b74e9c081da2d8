use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::events::EventType;

/// Header carrying the signing timestamp (ms since epoch).
pub const TIMESTAMP_HEADER: &str = "X-Biolink-Timestamp";

/// Header carrying `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Biolink-Signature";

pub const USER_AGENT: &str = "Biolink-Webhook/1.0";

/// Webhook body sent to endpoints.
///
/// Serialized once at emission time; the resulting string is what gets stored
/// on the delivery and replayed byte-for-byte on every attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub event: EventType,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    pub data: Value,
}

impl WebhookPayload {
    pub fn new(event: EventType, timestamp: OffsetDateTime, data: Value) -> Self {
        Self {
            event,
            timestamp,
            data,
        }
    }

    /// Payload for an event happening now.
    pub fn now(event: EventType, data: Value) -> Self {
        Self::new(event, OffsetDateTime::now_utc(), data)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

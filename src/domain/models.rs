use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

use super::events::EventType;

/// Upper bound on attempts within one delivery cycle.
pub const MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Endpoint
// ============================================================================

/// A user-registered HTTP destination subscribed to one or more event types.
///
/// Only an opaque `secret_ref` into the vault is held here; the signing
/// secret itself never lives in this row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,

    pub owner_id: String,

    pub url: String,

    pub events: BTreeSet<EventType>,

    pub secret_ref: String,

    pub is_active: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Endpoint {
    /// Build a new active endpoint, validating url and subscribed events.
    pub fn new(
        owner_id: String,
        url: String,
        events: BTreeSet<EventType>,
        secret_ref: String,
    ) -> Result<Self, EndpointValidationError> {
        let endpoint = Self {
            id: Uuid::new_v4(),
            owner_id,
            url,
            events,
            secret_ref,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Check the url is an absolute http(s) URL and that an active endpoint
    /// subscribes to at least one event.
    pub fn validate(&self) -> Result<(), EndpointValidationError> {
        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|e| EndpointValidationError::InvalidUrl(format!("{}: {e}", self.url)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EndpointValidationError::UnsupportedScheme(
                parsed.scheme().to_string(),
            ));
        }

        if parsed.host_str().is_none() {
            return Err(EndpointValidationError::InvalidUrl(format!(
                "{}: missing host",
                self.url
            )));
        }

        if self.is_active && self.events.is_empty() {
            return Err(EndpointValidationError::NoEvents);
        }

        Ok(())
    }

    /// Whether an emission of `event` should produce a delivery for this endpoint.
    pub fn subscribes_to(&self, event: EventType) -> bool {
        self.is_active && self.events.contains(&event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("An active endpoint must subscribe to at least one event")]
    NoEvents,
}

// ============================================================================
// Delivery
// ============================================================================

/// One attempt cycle (1 to [`MAX_ATTEMPTS`] tries) of one event to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,

    pub endpoint_id: Uuid,

    pub event: EventType,

    /// Serialized payload captured at emission time. Never rewritten.
    pub payload: String,

    pub status_code: Option<u16>,

    pub attempts: u32,

    pub response: Option<String>,

    pub response_time_ms: Option<u64>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
}

impl Delivery {
    /// A fresh pending delivery, written before any network attempt.
    pub fn pending(endpoint_id: Uuid, event: EventType, payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            event,
            payload,
            status_code: None,
            attempts: 0,
            response: None,
            response_time_ms: None,
            created_at: OffsetDateTime::now_utc(),
            delivered_at: None,
        }
    }

    pub fn state(&self) -> DeliveryState {
        if self.delivered_at.is_some() {
            DeliveryState::Succeeded
        } else if self.attempts == 0 {
            DeliveryState::Pending
        } else {
            DeliveryState::Failed
        }
    }

    /// Overwrite the mutable outcome columns. The payload is left untouched.
    pub fn apply(&mut self, outcome: DeliveryOutcome) {
        self.status_code = outcome.status_code;
        self.attempts = outcome.attempts.min(MAX_ATTEMPTS);
        self.response = outcome.response;
        self.response_time_ms = outcome.response_time_ms;
        self.delivered_at = outcome.delivered_at;
    }

    /// Clear the outcome columns so a manual retry starts from `Pending`.
    pub fn reopen(&mut self) {
        self.status_code = None;
        self.attempts = 0;
        self.response = None;
        self.response_time_ms = None;
        self.delivered_at = None;
    }
}

/// State of a delivery, derived from its outcome columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,

    Succeeded,

    Failed,
}

/// Terminal result of a delivery cycle, written back to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status_code: Option<u16>,
    pub attempts: u32,
    pub response: Option<String>,
    pub response_time_ms: Option<u64>,
    pub delivered_at: Option<OffsetDateTime>,
}

impl DeliveryOutcome {
    pub const SECRET_UNAVAILABLE: &str = "failed to retrieve signing secret";

    pub fn succeeded(
        status_code: u16,
        attempts: u32,
        response: String,
        response_time_ms: u64,
    ) -> Self {
        Self {
            status_code: Some(status_code),
            attempts,
            response: Some(response),
            response_time_ms: Some(response_time_ms),
            delivered_at: Some(OffsetDateTime::now_utc()),
        }
    }

    pub fn failed(
        status_code: Option<u16>,
        attempts: u32,
        response: String,
        response_time_ms: Option<u64>,
    ) -> Self {
        Self {
            status_code,
            attempts,
            response: Some(response),
            response_time_ms,
            delivered_at: None,
        }
    }

    /// Fail-fast outcome when the vault cannot produce the signing secret.
    pub fn secret_unavailable() -> Self {
        Self::failed(None, 1, Self::SECRET_UNAVAILABLE.to_string(), None)
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain events that can be delivered to user-registered webhook endpoints.
///
/// The set is closed: adding a kind here forces every `match` that filters
/// or labels events to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "page.viewed")]
    PageViewed,
    #[serde(rename = "link.clicked")]
    LinkClicked,
    #[serde(rename = "page.updated")]
    PageUpdated,
    #[serde(rename = "block.created")]
    BlockCreated,
    #[serde(rename = "block.deleted")]
    BlockDeleted,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::PageViewed,
        EventType::LinkClicked,
        EventType::PageUpdated,
        EventType::BlockCreated,
        EventType::BlockDeleted,
    ];

    /// Wire name, as it appears in the payload `event` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageViewed => "page.viewed",
            EventType::LinkClicked => "link.clicked",
            EventType::PageUpdated => "page.updated",
            EventType::BlockCreated => "block.created",
            EventType::BlockDeleted => "block.deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::parse_timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    #[default]
    Server,
    Synthetic,
}

/// One entry of a shipment's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: String,
    #[serde(default)]
    pub location: String,
    pub timestamp: String,
    /// Locally inferred events are never sent back to the server.
    #[serde(skip)]
    pub origin: EventOrigin,
}

impl StatusEvent {
    pub fn new(
        status: impl Into<String>,
        location: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            location: location.into(),
            timestamp: timestamp.into(),
            origin: EventOrigin::Server,
        }
    }

    pub fn synthetic(status: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            location: String::new(),
            timestamp: timestamp.into(),
            origin: EventOrigin::Synthetic,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == EventOrigin::Synthetic
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    fn identity(&self) -> (String, String, String) {
        (
            self.status.trim().to_string(),
            self.location.trim().to_string(),
            self.timestamp.trim().to_string(),
        )
    }
}

/// Lower-cased status with whitespace runs collapsed to single spaces.
pub fn normalize_status_text(status: &str) -> String {
    status
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Builds an ascending, de-duplicated history from a track response.
///
/// The event list is taken from `events`, `history`, `results`, or the body
/// itself when it is an array. Each entry tolerates alternate key names
/// (`event`/`title`/`name`, `place`/`city`, `time`/`created_at`/`date`);
/// entries with nothing in any of the three fields are dropped.
pub fn normalize_events(body: &Value) -> Vec<StatusEvent> {
    let source = ["events", "history", "results"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_array))
        .or_else(|| body.as_array());

    let Some(source) = source else {
        return Vec::new();
    };

    let events = source
        .iter()
        .map(|entry| {
            StatusEvent::new(
                first_text(entry, &["status", "event", "title", "name"]),
                first_text(entry, &["location", "place", "city"]),
                first_text(entry, &["timestamp", "time", "created_at", "date"]),
            )
        })
        .filter(|event| {
            !event.status.is_empty() || !event.location.is_empty() || !event.timestamp.is_empty()
        })
        .collect();

    dedup_events(sort_ascending(events))
}

/// Stable ascending sort; events without a parseable time sort first.
pub fn sort_ascending(mut events: Vec<StatusEvent>) -> Vec<StatusEvent> {
    events.sort_by_key(|event| event.occurred_at().map(|at| at.timestamp_millis()).unwrap_or(0));
    events
}

/// Newest first, ties broken by later position, as shown on screen.
pub fn sort_descending(events: &[StatusEvent]) -> Vec<StatusEvent> {
    let mut indexed: Vec<(usize, &StatusEvent)> = events.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        let ta = a.occurred_at().map(|at| at.timestamp_millis()).unwrap_or(0);
        let tb = b.occurred_at().map(|at| at.timestamp_millis()).unwrap_or(0);
        tb.cmp(&ta).then(ib.cmp(ia))
    });
    indexed.into_iter().map(|(_, event)| event.clone()).collect()
}

/// Keeps the first occurrence of each (status, location, timestamp) tuple.
pub fn dedup_events(events: Vec<StatusEvent>) -> Vec<StatusEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.identity()))
        .collect()
}

fn first_text(entry: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| entry.get(key))
        .find(|value| !value.is_null())
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

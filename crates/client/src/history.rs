use std::sync::Arc;

use parceldesk_auth::{KeyValueStore, StoreError};
use parceldesk_config::TracksConfig;
use tracing::warn;

use crate::validation::sanitize_tracking_number;

/// Recently used tracking numbers, most recent first, kept in the same
/// store as the session so they survive restarts.
#[derive(Clone)]
pub struct TrackHistory {
    store: Arc<dyn KeyValueStore>,
    key: String,
    limit: usize,
}

impl TrackHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &TracksConfig) -> Self {
        Self {
            store,
            key: config.history_key.clone(),
            limit: config.history_limit,
        }
    }

    /// Stored entries; a missing or unreadable value reads as empty.
    pub fn entries(&self) -> Vec<String> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(key = %self.key, %error, "failed to read tracking history");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(entries) => entries
                .iter()
                .map(|entry| sanitize_tracking_number(entry))
                .collect(),
            Err(error) => {
                warn!(key = %self.key, %error, "ignoring malformed tracking history");
                Vec::new()
            }
        }
    }

    /// Moves `tracking_number` to the front, dropping duplicates and
    /// anything past the limit.
    pub fn remember(&self, tracking_number: &str) -> Result<Vec<String>, StoreError> {
        let tracking_number = sanitize_tracking_number(tracking_number);
        if tracking_number.is_empty() {
            return Ok(self.entries());
        }

        let mut next = vec![tracking_number.clone()];
        for entry in self.entries() {
            if !next.contains(&entry) {
                next.push(entry);
            }
        }
        next.truncate(self.limit);

        self.store
            .set(&self.key, &serde_json::Value::from(next.clone()).to_string())?;
        Ok(next)
    }

    /// History merged with server hints, filtered by a case-insensitive
    /// substring of `query`. An empty query returns everything.
    pub fn suggestions(&self, query: &str, server_hints: &[String]) -> Vec<String> {
        let query = query.trim().to_lowercase();
        let mut merged: Vec<String> = Vec::new();
        for candidate in self
            .entries()
            .into_iter()
            .chain(server_hints.iter().map(|hint| sanitize_tracking_number(hint)))
        {
            if !candidate.is_empty() && !merged.contains(&candidate) {
                merged.push(candidate);
            }
        }

        if query.is_empty() {
            return merged;
        }
        merged
            .into_iter()
            .filter(|candidate| candidate.to_lowercase().contains(&query))
            .collect()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(&self.key)
    }
}

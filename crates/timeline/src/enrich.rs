use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use parceldesk_config::TimelineConfig;
use regex::Regex;
use tracing::debug;

use crate::event::{normalize_status_text, StatusEvent};
use crate::time::to_iso;

pub const STORAGE_LABEL: &str = "Товар отправлен на хранение";
pub const TRUCK_LABEL: &str = "Товар отправлен грузовиком и уже в пути";

static STORAGE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(поступил|принят).*склад|accepted.*china").expect("invalid storage anchor")
});
static STORAGE_GUARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"отправлен на хранение").expect("invalid storage guard"));
static TRUCK_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)отправлен\s+со\s+склада").expect("invalid truck anchor"));
static TRUCK_GUARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)грузовик|уже в пути").expect("invalid truck guard"));

/// One inferred milestone: when the latest event matching `anchor` is at
/// least `delay` old and no event matches `guard`, `label` is inserted right
/// after the anchor, stamped at anchor time + `delay`.
#[derive(Debug, Clone)]
pub struct SyntheticRule {
    name: &'static str,
    anchor: Regex,
    guard: Regex,
    delay: TimeDelta,
    label: String,
}

impl SyntheticRule {
    pub fn new(
        name: &'static str,
        anchor: Regex,
        guard: Regex,
        delay: Duration,
        label: impl Into<String>,
    ) -> Self {
        Self {
            name,
            anchor,
            guard,
            delay: TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX),
            label: label.into(),
        }
    }

    /// "Accepted at the warehouse" is followed by "sent to storage".
    pub fn storage(delay: Duration) -> Self {
        Self::new(
            "storage",
            STORAGE_ANCHOR.clone(),
            STORAGE_GUARD.clone(),
            delay,
            STORAGE_LABEL,
        )
    }

    /// "Dispatched from the warehouse" is followed by "en route by truck".
    pub fn truck(delay: Duration) -> Self {
        Self::new(
            "truck",
            TRUCK_ANCHOR.clone(),
            TRUCK_GUARD.clone(),
            delay,
            TRUCK_LABEL,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn delay(&self) -> TimeDelta {
        self.delay
    }

    /// Inserts the milestone if it is due; returns its index.
    fn apply(&self, events: &mut Vec<StatusEvent>, now: DateTime<Utc>) -> Option<usize> {
        if events
            .iter()
            .any(|event| self.guard.is_match(&normalize_status_text(&event.status)))
        {
            return None;
        }

        let anchor = events
            .iter()
            .rposition(|event| self.anchor.is_match(&event.status))?;
        let appear_at = events[anchor]
            .occurred_at()?
            .checked_add_signed(self.delay)?;

        if now < appear_at {
            return None;
        }

        let index = anchor + 1;
        events.insert(index, StatusEvent::synthetic(&self.label, to_iso(appear_at)));
        debug!(rule = self.name, index, "inserted synthetic status event");
        Some(index)
    }
}

/// Adds time-gated milestones the backend does not emit.
#[derive(Debug, Clone)]
pub struct Enricher {
    rules: Vec<SyntheticRule>,
}

impl Enricher {
    pub fn new(storage_delay: Duration, truck_delay: Duration) -> Self {
        Self::with_rules(vec![
            SyntheticRule::storage(storage_delay),
            SyntheticRule::truck(truck_delay),
        ])
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(config.storage_delay(), config.truck_delay())
    }

    /// Rules run in order, each at most once, over the same growing list.
    pub fn with_rules(rules: Vec<SyntheticRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SyntheticRule] {
        &self.rules
    }

    /// `events` must be ascending by time. Returns a new list; the input is
    /// left untouched.
    pub fn enrich(&self, events: &[StatusEvent], now: DateTime<Utc>) -> Vec<StatusEvent> {
        let mut enriched = events.to_vec();
        for rule in &self.rules {
            rule.apply(&mut enriched, now);
        }
        enriched
    }

    pub fn enrich_now(&self, events: &[StatusEvent]) -> Vec<StatusEvent> {
        self.enrich(events, Utc::now())
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::from_config(&TimelineConfig::default())
    }
}

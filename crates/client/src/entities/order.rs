use parceldesk_timeline::{classify_order, Stage, StatusEvent, StatusText};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub tracking_number: String,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Status shown in lists: `last_status`, then `status`.
    pub fn current_status(&self) -> &str {
        self.last_status
            .as_deref()
            .or(self.status.as_deref())
            .unwrap_or_default()
    }

    pub fn status_text(&self) -> StatusText {
        StatusText::parse(self.current_status())
    }

    pub fn stage(&self) -> Option<Stage> {
        serde_json::to_value(self)
            .ok()
            .and_then(|value| classify_order(&value))
    }
}

/// Result of `orders/scan/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub tracking_number: String,
    pub created_event: Option<StatusEvent>,
}

impl ScanOutcome {
    pub fn from_body(tracking_number: impl Into<String>, body: &Value) -> Self {
        let created_event = body
            .get("created_event")
            .filter(|event| event.is_object())
            .map(|event| {
                let text = |key: &str| {
                    event
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                StatusEvent::new(text("status"), text("location"), text("timestamp"))
            });

        Self {
            tracking_number: tracking_number.into(),
            created_event,
        }
    }
}

/// One parcel's history, ascending, with inferred milestones applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDetails {
    pub tracking_number: String,
    pub last_status: String,
    pub events: Vec<StatusEvent>,
    pub order: Value,
}

impl TrackDetails {
    /// Newest first, as listed on the tracking modal.
    pub fn newest_first(&self) -> Vec<StatusEvent> {
        parceldesk_timeline::sort_descending(&self.events)
    }
}

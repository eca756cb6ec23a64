use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid pattern"));
static NON_LETTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zа-яё]+").expect("invalid pattern"));

static ACCEPTED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"accepted_in_china|accepted|принят").expect("invalid pattern"));
static ACCEPTED_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"склад.*кита").expect("invalid pattern"));
static SENT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sent_from_china|sent|отправлен").expect("invalid pattern"));
static SENT_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"отправлен.*кита").expect("invalid pattern"));
static ARRIVED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"arrived_to_pvz|arrived").expect("invalid pattern"));
static ARRIVED_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"прибыл.*пункт.*выда").expect("invalid pattern"));
static DONE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"received|delivered|получен").expect("invalid pattern"));

/// Coarse delivery stage used for the order counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Accepted,
    Sent,
    Arrived,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Accepted, Stage::Sent, Stage::Arrived, Stage::Done];

    pub fn key(self) -> &'static str {
        match self {
            Stage::Accepted => "accepted",
            Stage::Sent => "sent",
            Stage::Arrived => "arrived",
            Stage::Done => "done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Accepted => "Принят на склад в Китае",
            Stage::Sent => "Отправлен из Китая",
            Stage::Arrived => "Прибыл в пункт выдачи",
            Stage::Done => "Получен",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stage `{}`", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.key().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| UnknownStage(raw.to_string()))
    }
}

/// Maps a free-form status (server code or Russian text) to a stage.
/// Earlier stages win when several patterns match.
pub fn classify_status(status: &str) -> Option<Stage> {
    let lowered = status.to_lowercase();
    let compact = WHITESPACE.replace_all(&lowered, "_");
    let plain = NON_LETTERS.replace_all(&lowered, " ");

    if ACCEPTED_CODE.is_match(&compact) || ACCEPTED_TEXT.is_match(&plain) {
        Some(Stage::Accepted)
    } else if SENT_CODE.is_match(&compact) || SENT_TEXT.is_match(&plain) {
        Some(Stage::Sent)
    } else if ARRIVED_CODE.is_match(&compact) || ARRIVED_TEXT.is_match(&plain) {
        Some(Stage::Arrived)
    } else if DONE_CODE.is_match(&compact) {
        Some(Stage::Done)
    } else {
        None
    }
}

/// Reads `last_status`, then `status`, then the last event's status.
pub fn classify_order(order: &Value) -> Option<Stage> {
    let status = order
        .get("last_status")
        .filter(|value| !value.is_null())
        .or_else(|| order.get("status").filter(|value| !value.is_null()))
        .or_else(|| {
            order
                .get("events")
                .and_then(Value::as_array)
                .and_then(|events| events.last())
                .and_then(|event| event.get("status"))
        });

    match status? {
        Value::String(text) => classify_status(text),
        Value::Null | Value::Bool(false) => None,
        other => classify_status(&other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub accepted: usize,
    pub sent: usize,
    pub arrived: usize,
    pub done: usize,
}

impl StageCounts {
    pub fn add(&mut self, stage: Stage) {
        *self.slot(stage) += 1;
    }

    /// Classifies and counts a single order; unknown statuses are ignored.
    pub fn record(&mut self, order: &Value) -> Option<Stage> {
        let stage = classify_order(order)?;
        self.add(stage);
        Some(stage)
    }

    pub fn get(&self, stage: Stage) -> usize {
        match stage {
            Stage::Accepted => self.accepted,
            Stage::Sent => self.sent,
            Stage::Arrived => self.arrived,
            Stage::Done => self.done,
        }
    }

    pub fn total(&self) -> usize {
        self.accepted + self.sent + self.arrived + self.done
    }

    fn slot(&mut self, stage: Stage) -> &mut usize {
        match stage {
            Stage::Accepted => &mut self.accepted,
            Stage::Sent => &mut self.sent,
            Stage::Arrived => &mut self.arrived,
            Stage::Done => &mut self.done,
        }
    }
}

impl<'a> FromIterator<&'a Value> for StageCounts {
    fn from_iter<I: IntoIterator<Item = &'a Value>>(orders: I) -> Self {
        let mut counts = StageCounts::default();
        for order in orders {
            counts.record(order);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_codes_and_russian_text() {
        assert_eq!(classify_status("accepted_in_china"), Some(Stage::Accepted));
        assert_eq!(classify_status("Принят на склад в Китае"), Some(Stage::Accepted));
        assert_eq!(classify_status("SENT_FROM_CHINA"), Some(Stage::Sent));
        assert_eq!(classify_status("Отправлен из Китая"), Some(Stage::Sent));
        assert_eq!(classify_status("arrived_to_pvz"), Some(Stage::Arrived));
        assert_eq!(classify_status("Прибыл в пункт выдачи"), Some(Stage::Arrived));
        assert_eq!(classify_status("Delivered"), Some(Stage::Done));
        assert_eq!(classify_status("Получен"), Some(Stage::Done));
        assert_eq!(classify_status("на таможне"), None);
    }

    #[test]
    fn order_status_sources_in_priority_order() {
        assert_eq!(
            classify_order(&json!({"last_status": "received", "status": "sent"})),
            Some(Stage::Done)
        );
        assert_eq!(
            classify_order(&json!({"last_status": null, "status": "sent"})),
            Some(Stage::Sent)
        );
        assert_eq!(
            classify_order(&json!({"events": [
                {"status": "accepted"},
                {"status": "arrived"}
            ]})),
            Some(Stage::Arrived)
        );
        assert_eq!(classify_order(&json!({"events": []})), None);
    }

    #[test]
    fn empty_last_status_does_not_fall_through() {
        assert_eq!(classify_order(&json!({"last_status": "", "status": "sent"})), None);
    }

    #[test]
    fn counts_orders_per_stage() {
        let orders = [
            json!({"status": "accepted"}),
            json!({"status": "accepted"}),
            json!({"status": "Получен"}),
            json!({"status": "lost"}),
        ];
        let counts: StageCounts = orders.iter().collect();
        assert_eq!(counts.get(Stage::Accepted), 2);
        assert_eq!(counts.get(Stage::Done), 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn parses_stage_keys() {
        assert_eq!("arrived".parse::<Stage>(), Ok(Stage::Arrived));
        assert!("pending".parse::<Stage>().is_err());
    }
}

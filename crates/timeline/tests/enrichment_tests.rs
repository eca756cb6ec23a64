use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use parceldesk_timeline::{
    normalize_events, Enricher, StatusEvent, SyntheticRule, STORAGE_LABEL, TRUCK_LABEL,
};
use regex::Regex;
use serde_json::json;

const ACCEPTED: &str = "Принят на склад в Китае";
const DISPATCHED: &str = "Отправлен со склада";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn enricher() -> Enricher {
    Enricher::new(Duration::from_secs(10), Duration::from_secs(86_400))
}

fn accepted_at_t0() -> Vec<StatusEvent> {
    vec![StatusEvent::new(ACCEPTED, "Гуанчжоу", "2024-01-01T00:00:00Z")]
}

fn statuses(events: &[StatusEvent]) -> Vec<&str> {
    events.iter().map(|event| event.status.as_str()).collect()
}

#[test]
fn storage_milestone_appears_after_delay() {
    let enriched = enricher().enrich(&accepted_at_t0(), t0() + TimeDelta::seconds(11));

    assert_eq!(statuses(&enriched), vec![ACCEPTED, STORAGE_LABEL]);
    assert_eq!(enriched[1].timestamp, "2024-01-01T00:00:10.000Z");
    assert_eq!(enriched[1].location, "");
    assert!(enriched[1].is_synthetic());
    assert!(!enriched[0].is_synthetic());
}

#[test]
fn storage_milestone_waits_for_delay() {
    let events = accepted_at_t0();
    let enriched = enricher().enrich(&events, t0() + TimeDelta::seconds(5));

    assert_eq!(enriched, events);
}

#[test]
fn milestone_is_due_exactly_at_delay() {
    let enriched = enricher().enrich(&accepted_at_t0(), t0() + TimeDelta::seconds(10));

    assert_eq!(enriched.len(), 2);
    assert_eq!(
        enriched[1].occurred_at(),
        Some(t0() + TimeDelta::seconds(10))
    );
}

#[test]
fn enriching_twice_changes_nothing() {
    let now = t0() + TimeDelta::days(3);
    let events = vec![
        StatusEvent::new(ACCEPTED, "Гуанчжоу", "2024-01-01T00:00:00Z"),
        StatusEvent::new(DISPATCHED, "Гуанчжоу", "2024-01-01T05:00:00Z"),
    ];

    let once = enricher().enrich(&events, now);
    let twice = enricher().enrich(&once, now);

    assert_eq!(once, twice);
    assert_eq!(once.len(), 4);
}

#[test]
fn existing_storage_text_blocks_insertion() {
    let events = vec![
        StatusEvent::new(ACCEPTED, "", "2024-01-01T00:00:00Z"),
        StatusEvent::new("товар   ОТПРАВЛЕН на хранение", "", "2024-01-01T00:00:03Z"),
    ];

    let enriched = enricher().enrich(&events, t0() + TimeDelta::hours(1));

    assert_eq!(enriched, events);
}

#[test]
fn truck_milestone_follows_dispatch_after_a_day() {
    let events = vec![StatusEvent::new(DISPATCHED, "Урумчи", "2024-01-02T08:00:00Z")];
    let dispatched = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();

    let early = enricher().enrich(&events, dispatched + TimeDelta::hours(23));
    assert_eq!(early.len(), 1);

    let due = enricher().enrich(&events, dispatched + TimeDelta::days(1));
    assert_eq!(statuses(&due), vec![DISPATCHED, TRUCK_LABEL]);
    assert_eq!(due[1].timestamp, "2024-01-03T08:00:00.000Z");
}

#[test]
fn truck_guard_matches_either_phrase() {
    let events = vec![
        StatusEvent::new(DISPATCHED, "", "2024-01-01T00:00:00Z"),
        StatusEvent::new("Посылка уже в пути", "", "2024-01-01T01:00:00Z"),
    ];

    let enriched = enricher().enrich(&events, t0() + TimeDelta::days(5));

    assert_eq!(enriched, events);
}

#[test]
fn both_milestones_land_after_their_anchors() {
    let events = vec![
        StatusEvent::new(ACCEPTED, "", "2024-01-01T00:00:00Z"),
        StatusEvent::new(DISPATCHED, "", "2024-01-01T06:00:00Z"),
        StatusEvent::new("Прибыл в пункт выдачи", "Бишкек", "2024-01-04T00:00:00Z"),
    ];

    let enriched = enricher().enrich(&events, t0() + TimeDelta::days(4));

    assert_eq!(
        statuses(&enriched),
        vec![
            ACCEPTED,
            STORAGE_LABEL,
            DISPATCHED,
            TRUCK_LABEL,
            "Прибыл в пункт выдачи"
        ]
    );
    assert_eq!(enriched[3].timestamp, "2024-01-02T06:00:00.000Z");
}

#[test]
fn only_the_latest_anchor_gets_a_milestone() {
    let events = vec![
        StatusEvent::new(ACCEPTED, "Иу", "2024-01-01T00:00:00Z"),
        StatusEvent::new(DISPATCHED, "Иу", "2024-01-01T01:00:00Z"),
        StatusEvent::new("Поступил на склад", "Гуанчжоу", "2024-01-01T02:00:00Z"),
    ];

    let enriched = enricher().enrich(&events, t0() + TimeDelta::hours(3));

    assert_eq!(enriched.len(), 4);
    assert_eq!(enriched[3].status, STORAGE_LABEL);
    assert_eq!(enriched[3].timestamp, "2024-01-01T02:00:10.000Z");
}

#[test]
fn anchor_without_parseable_time_is_skipped() {
    let events = vec![StatusEvent::new(ACCEPTED, "", "скоро")];

    let enriched = enricher().enrich(&events, t0() + TimeDelta::days(365));

    assert_eq!(enriched, events);
}

#[test]
fn input_is_left_untouched() {
    let events = accepted_at_t0();
    let snapshot = events.clone();

    let _ = enricher().enrich(&events, t0() + TimeDelta::days(1));

    assert_eq!(events, snapshot);
}

#[test]
fn server_code_anchors_storage_rule() {
    let events = normalize_events(&json!({
        "events": [{"status": "accepted_in_china", "timestamp": "2024-01-01 00:00:00"}]
    }));

    let enriched = enricher().enrich(&events, t0() + TimeDelta::minutes(1));

    assert_eq!(enriched.len(), 2);
    assert_eq!(enriched[1].status, STORAGE_LABEL);
}

#[test]
fn synthetic_events_serialise_like_server_events() {
    let enriched = enricher().enrich(&accepted_at_t0(), t0() + TimeDelta::minutes(1));

    let value = serde_json::to_value(&enriched[1]).unwrap();
    assert_eq!(
        value,
        json!({
            "status": STORAGE_LABEL,
            "location": "",
            "timestamp": "2024-01-01T00:00:10.000Z"
        })
    );
}

#[test]
fn custom_rule_table() {
    let customs = SyntheticRule::new(
        "customs",
        Regex::new(r"(?i)прибыл на границу").unwrap(),
        Regex::new(r"таможн").unwrap(),
        Duration::from_secs(3_600),
        "Проходит таможенное оформление",
    );
    let enricher = Enricher::with_rules(vec![customs]);
    let events = vec![StatusEvent::new("Прибыл на границу", "Торугарт", "2024-01-01T00:00:00Z")];

    let enriched = enricher.enrich(&events, t0() + TimeDelta::hours(2));

    assert_eq!(enricher.rules()[0].name(), "customs");
    assert_eq!(enriched[1].status, "Проходит таможенное оформление");
    assert_eq!(enriched[1].timestamp, "2024-01-01T01:00:00.000Z");
}

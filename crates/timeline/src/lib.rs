//! Shipment status histories: normalisation, inferred milestones, stage
//! classification and status text layout.

mod enrich;
mod event;
mod stage;
mod status;
mod time;

pub use enrich::{Enricher, SyntheticRule, STORAGE_LABEL, TRUCK_LABEL};
pub use event::{
    dedup_events, normalize_events, normalize_status_text, sort_ascending, sort_descending,
    EventOrigin, StatusEvent,
};
pub use stage::{classify_order, classify_status, Stage, StageCounts, UnknownStage};
pub use status::StatusText;
pub use time::{format_timestamp, parse_timestamp, to_iso};

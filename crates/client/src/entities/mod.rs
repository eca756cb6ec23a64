//! Typed views of the API payloads.

mod lenient;
pub mod order;
pub mod user;

pub use order::{Order, ScanOutcome, TrackDetails};
pub use user::{HomeSummary, PickupPoint, User, Warehouse, WarehouseRef};

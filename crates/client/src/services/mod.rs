//! Endpoint groups of [`crate::ParcelApi`], one module per page family.

pub mod auth;
pub mod orders;
pub mod profile;

pub use auth::{Landing, LoginOutcome};
pub use orders::{MAX_ORDER_PAGES, MAX_STAGE_MATCHES, MAX_STAGE_PAGES};
pub use profile::ProfileUpdate;

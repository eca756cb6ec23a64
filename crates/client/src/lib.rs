//! Typed ParcelDesk endpoints on top of [`parceldesk_auth::SessionClient`],
//! plus the client-side helpers the pages rely on: input validation, the
//! tracking-number history and barcode scanner input.

mod api;
pub mod entities;
mod error;
mod history;
pub mod scan;
pub mod services;
pub mod validation;

pub use api::ParcelApi;
pub use entities::{
    HomeSummary, Order, PickupPoint, ScanOutcome, TrackDetails, User, Warehouse, WarehouseRef,
};
pub use error::{ClientError, ValidationError, CLAIM_FAILED_MESSAGE, FORM_FIELD, NOT_FOUND_MESSAGE};
pub use history::TrackHistory;
pub use scan::{Key, KeyPress, ScanBuffer, ScanEvent};
pub use services::{Landing, LoginOutcome, ProfileUpdate};
pub use validation::{LoginForm, ProfileForm, RegisterForm};

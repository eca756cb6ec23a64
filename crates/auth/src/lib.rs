//! Session credentials and the authenticated HTTP client for the ParcelDesk API.

mod client;
mod error;
mod session;
mod store;

pub use client::{ApiRequest, ApiResponse, SessionClient, REFRESH_PATH};
pub use error::{
    extract_error_message, ApiError, ErrorKind, FieldErrors, RefreshError, NETWORK_MESSAGE,
    RATE_LIMITED_MESSAGE, SERVER_UNAVAILABLE_MESSAGE, SESSION_EXPIRED_MESSAGE, UNKNOWN_MESSAGE,
};
pub use session::TokenSession;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

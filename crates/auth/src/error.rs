use std::collections::BTreeMap;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::store::StoreError;

pub const RATE_LIMITED_MESSAGE: &str = "Слишком много попыток. Попробуйте позже.";
pub const SERVER_UNAVAILABLE_MESSAGE: &str = "Сервис временно недоступен. Попробуйте позже.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Сессия истекла. Войдите снова.";
pub const NETWORK_MESSAGE: &str = "Не удалось связаться с сервером. Проверьте подключение.";
pub const UNKNOWN_MESSAGE: &str = "Неизвестная ошибка";

/// Errors surfaced by [`crate::SessionClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {url} returned {status}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: Value,
    },
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url}: session expired, sign in again")]
    SessionExpired { method: Method, url: String },
    #[error("{method} {url} returned an unexpected body: {source}")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification used to pick what a page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    FieldErrors,
    RateLimited,
    Server,
    Network,
    SessionExpired,
    Other,
}

/// Failure of the token refresh call. Cloneable because every caller
/// awaiting the same in-flight refresh receives the same outcome.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("refresh rejected with status {0}")]
    Rejected(StatusCode),
    #[error("refresh response did not contain an access token")]
    MissingAccessToken,
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("failed to persist refreshed token: {0}")]
    Store(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::SessionExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::Transport { .. } => ErrorKind::Network,
            Self::Decode { .. } | Self::Store(_) => ErrorKind::Other,
            Self::Status { status, body, .. } => match *status {
                StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
                StatusCode::FORBIDDEN => ErrorKind::Forbidden,
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::CONFLICT => ErrorKind::Conflict,
                StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
                StatusCode::BAD_REQUEST if body.is_object() => ErrorKind::FieldErrors,
                s if s.is_server_error() => ErrorKind::Server,
                _ => ErrorKind::Other,
            },
        }
    }

    /// Best-effort message extracted from the response body, if any.
    pub fn server_message(&self) -> Option<String> {
        self.body().and_then(extract_error_message)
    }

    /// Human-readable text for the page that issued the request.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::RateLimited => RATE_LIMITED_MESSAGE.to_string(),
            ErrorKind::Server => SERVER_UNAVAILABLE_MESSAGE.to_string(),
            ErrorKind::SessionExpired | ErrorKind::Unauthorized => {
                SESSION_EXPIRED_MESSAGE.to_string()
            }
            ErrorKind::Network => NETWORK_MESSAGE.to_string(),
            _ => self
                .server_message()
                .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string()),
        }
    }

    pub fn field_errors(&self) -> FieldErrors {
        self.body().map(FieldErrors::from_body).unwrap_or_default()
    }
}

/// Per-field messages from a structured error body such as
/// `{"phone": ["..."], "detail": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub fields: BTreeMap<String, String>,
    pub form: Option<String>,
}

impl FieldErrors {
    pub fn from_body(body: &Value) -> Self {
        let mut errors = Self::default();
        let Some(map) = body.as_object() else {
            if let Some(text) = body.as_str().filter(|t| !t.trim().is_empty()) {
                errors.form = Some(text.trim().to_string());
            }
            return errors;
        };

        for (field, value) in map {
            let Some(message) = first_string(value) else {
                continue;
            };
            match field.as_str() {
                "detail" | "non_field_errors" => {
                    if errors.form.is_none() {
                        errors.form = Some(message);
                    }
                }
                _ => {
                    errors.fields.insert(field.clone(), message);
                }
            }
        }
        errors
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_none()
    }
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.as_str().filter(|t| !t.is_empty()))
            .map(str::to_string),
        _ => None,
    }
}

/// Message for logging: a plain string body, then `detail`, then the first
/// string found among the body's field values (arrays flattened one level).
///
/// ```
/// use parceldesk_auth::extract_error_message;
/// use serde_json::json;
///
/// let body = json!({"tracking_number": ["Трек уже зарегистрирован"]});
/// assert_eq!(
///     extract_error_message(&body).as_deref(),
///     Some("Трек уже зарегистрирован")
/// );
/// ```
pub fn extract_error_message(body: &Value) -> Option<String> {
    match body {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(map) => {
            if let Some(detail) = map.get("detail").and_then(Value::as_str) {
                if !detail.is_empty() {
                    return Some(detail.to_string());
                }
            }
            map.values().find_map(first_string)
        }
        _ => None,
    }
}

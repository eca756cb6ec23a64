use std::collections::BTreeMap;
use std::fmt;

use parceldesk_auth::{ApiError, ErrorKind, StoreError};
use thiserror::Error;

pub const FORM_FIELD: &str = "form";

pub const NOT_FOUND_MESSAGE: &str = "Это не ваш товар или товар не найден.";
pub const CLAIM_FAILED_MESSAGE: &str =
    "Не удалось присвоить/создать товар. Возможно, трек уже принадлежит другому аккаунту.";

/// Client-side form problems, keyed by field name. Messages are ready to
/// show next to the corresponding input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut error = Self::new();
        error.add(field, message);
        error
    }

    /// Later messages for the same field replace earlier ones.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn merge(&mut self, other: ValidationError) {
        self.fields.extend(other.fields);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.fields.values().map(String::as_str).collect();
        f.write_str(&messages.join(" "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sign-in rejected: {message}")]
    LoginRejected {
        message: String,
        #[source]
        source: ApiError,
    },
    #[error("tracking number {tracking_number} is claimed by another account")]
    ClaimConflict { tracking_number: String },
    #[error("could not create order {tracking_number}: {source}")]
    CreateFailed {
        tracking_number: String,
        #[source]
        source: ApiError,
    },
    #[error("could not claim order {tracking_number} after creating it: {source}")]
    ClaimAfterCreateFailed {
        tracking_number: String,
        #[source]
        source: ApiError,
    },
    #[error("no order found for {tracking_number}")]
    NotFound { tracking_number: String },
}

impl ClientError {
    /// The underlying HTTP failure, if there is one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(source)
            | Self::LoginRejected { source, .. }
            | Self::CreateFailed { source, .. }
            | Self::ClaimAfterCreateFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.api()
            .is_some_and(|error| error.kind() == ErrorKind::SessionExpired)
    }

    /// Per-field messages from validation or from a structured 400 body.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Validation(error) => error.fields().clone(),
            other => other
                .api()
                .map(|error| error.field_errors().fields)
                .unwrap_or_default(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => error.to_string(),
            Self::LoginRejected { message, .. } => message.clone(),
            Self::ClaimConflict { .. }
            | Self::CreateFailed { .. }
            | Self::ClaimAfterCreateFailed { .. } => CLAIM_FAILED_MESSAGE.to_string(),
            Self::NotFound { .. } => NOT_FOUND_MESSAGE.to_string(),
            Self::Api(error) => error.user_message(),
            Self::Store(error) => error.to_string(),
        }
    }
}

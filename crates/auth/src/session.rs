use std::sync::Arc;

use parceldesk_config::SessionConfig;
use tracing::{info, warn};

use crate::store::{KeyValueStore, StoreError};

/// Access and refresh credentials backed by a shared [`KeyValueStore`].
///
/// Nothing is cached in memory: every accessor reads the store, so a refresh
/// or logout performed through another handle is observed immediately.
#[derive(Clone)]
pub struct TokenSession {
    store: Arc<dyn KeyValueStore>,
    access_key: String,
    refresh_key: String,
}

impl TokenSession {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            access_key: config.access_key.clone(),
            refresh_key: config.refresh_key.clone(),
        }
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// Current access token, or an empty string when none is stored.
    pub fn access(&self) -> String {
        self.read(&self.access_key)
    }

    /// Current refresh token, or an empty string when none is stored.
    pub fn refresh(&self) -> String {
        self.read(&self.refresh_key)
    }

    /// Stores the access token; an empty value removes it.
    pub fn set_access(&self, token: &str) -> Result<(), StoreError> {
        self.write(&self.access_key, token)
    }

    /// Stores the refresh token; an empty value removes it.
    pub fn set_refresh(&self, token: &str) -> Result<(), StoreError> {
        self.write(&self.refresh_key, token)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(&self.access_key)?;
        self.store.remove(&self.refresh_key)?;
        info!("session credentials cleared");
        Ok(())
    }

    /// True when either credential is present. Says nothing about validity.
    pub fn is_authenticated(&self) -> bool {
        !self.access().is_empty() || !self.refresh().is_empty()
    }

    fn read(&self, key: &str) -> String {
        match self.store.get(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(error) => {
                warn!(key, %error, "failed to read credential, treating as absent");
                String::new()
            }
        }
    }

    fn write(&self, key: &str, token: &str) -> Result<(), StoreError> {
        if token.is_empty() {
            self.store.remove(key)
        } else {
            self.store.set(key, token)
        }
    }
}

impl std::fmt::Debug for TokenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSession")
            .field("access_key", &self.access_key)
            .field("refresh_key", &self.refresh_key)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

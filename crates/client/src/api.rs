use std::ops::ControlFlow;
use std::sync::Arc;

use parceldesk_auth::{ApiRequest, KeyValueStore, SessionClient, StoreError, TokenSession};
use parceldesk_config::{AppConfig, TracksConfig};
use parceldesk_timeline::Enricher;
use serde_json::Value;
use tracing::{debug, warn};

use crate::entities::User;
use crate::error::ClientError;
use crate::history::TrackHistory;

/// Typed access to the ParcelDesk REST API on top of a [`SessionClient`].
///
/// Endpoint groups live in `services::{auth, profile, orders}`.
#[derive(Clone)]
pub struct ParcelApi {
    pub(crate) client: SessionClient,
    pub(crate) user_key: String,
    pub(crate) tracks: TracksConfig,
    pub(crate) history: TrackHistory,
    pub(crate) enricher: Enricher,
}

impl ParcelApi {
    pub fn new(client: SessionClient, config: &AppConfig) -> Self {
        let store = client.session().store();
        Self {
            history: TrackHistory::new(store, &config.tracks),
            user_key: config.session.user_key.clone(),
            tracks: config.tracks.clone(),
            enricher: Enricher::from_config(&config.timeline),
            client,
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn session(&self) -> &TokenSession {
        self.client.session()
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn tracks(&self) -> &TracksConfig {
        &self.tracks
    }

    pub(crate) fn store(&self) -> Arc<dyn KeyValueStore> {
        self.session().store()
    }

    /// The user saved by the last sign-in or `me/` call.
    pub fn cached_user(&self) -> Option<User> {
        let raw = self.store().get(&self.user_key).ok().flatten()?;
        match serde_json::from_str::<Option<User>>(&raw) {
            Ok(user) => user,
            Err(error) => {
                warn!(%error, "ignoring malformed cached user");
                None
            }
        }
    }

    pub(crate) fn cache_user(&self, user: Option<&User>) -> Result<(), StoreError> {
        match user.map(serde_json::to_string) {
            Some(Ok(encoded)) => self.store().set(&self.user_key, &encoded),
            Some(Err(error)) => {
                warn!(%error, "failed to encode user for caching");
                Ok(())
            }
            None => self.store().remove(&self.user_key),
        }
    }

    pub(crate) async fn fetch(&self, request: ApiRequest) -> Result<Value, ClientError> {
        Ok(self.client.send(request).await?.body)
    }

    /// Walks a paginated list by following `next` links, handing every page
    /// to `visit` until it breaks, there is no next page, or `max_pages`
    /// pages have been read.
    pub(crate) async fn for_each_page<F>(
        &self,
        first: ApiRequest,
        max_pages: usize,
        mut visit: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&[Value]) -> ControlFlow<()>,
    {
        let mut request = Some(first);
        let mut pages = 0;

        while let Some(current) = request.take() {
            if pages >= max_pages {
                debug!(max_pages, "stopping pagination at page limit");
                break;
            }
            let body = self.fetch(current).await?;
            pages += 1;

            if visit(page_items(&body)).is_break() {
                break;
            }
            request = next_link(&body).map(ApiRequest::get);
        }
        Ok(())
    }
}

/// Items of a list response: `results` of a page object or a bare array.
pub(crate) fn page_items(body: &Value) -> &[Value] {
    body.get("results")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub(crate) fn next_link(body: &Value) -> Option<String> {
    body.get("next")
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty())
        .map(str::to_string)
}

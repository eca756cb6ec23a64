use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::Lazy;
use parceldesk_config::ApiConfig;
use regex::Regex;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{extract_error_message, ApiError, RefreshError, UNKNOWN_MESSAGE};
use crate::session::TokenSession;

pub const REFRESH_PATH: &str = "auth/token/refresh/";

static REFRESH_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)auth/token/refresh/?$").expect("invalid refresh endpoint pattern"));

type PendingRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// A request relative to the API base URL (absolute URLs, such as pagination
/// `next` links, are used as-is).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    authorization: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authorization: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Explicit `Authorization` header; suppresses the automatic bearer token.
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn targets_refresh_endpoint(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        REFRESH_ENDPOINT.is_match(path)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.body).map_err(|source| ApiError::Decode {
            method: self.method,
            url: self.url,
            source,
        })
    }
}

/// HTTP client that attaches the session's bearer token and transparently
/// recovers from one expired-access-token failure per request.
#[derive(Clone)]
pub struct SessionClient {
    http: Client,
    base_url: String,
    session: TokenSession,
    refreshing: Arc<Mutex<Option<PendingRefresh>>>,
}

impl SessionClient {
    pub fn new(config: &ApiConfig, session: TokenSession) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent("parceldesk")
            .build()?;

        Ok(Self::with_http(http, config.normalized_base_url(), session))
    }

    pub fn with_http(http: Client, base_url: impl Into<String>, session: TokenSession) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            session,
            refreshing: Arc::new(Mutex::new(None)),
        }
    }

    pub fn session(&self) -> &TokenSession {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        // Read immediately before sending: a concurrent refresh may have
        // replaced the token since the caller last looked.
        let sent_with = self.session.access();

        let error = match self.execute(&request, &sent_with).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if !self.should_refresh(&request, &error) {
            log_api_error(&error);
            return Err(error);
        }

        let access = match self.fresh_access(&sent_with).await {
            Ok(access) => access,
            Err(RefreshError::MissingRefreshToken) => {
                log_api_error(&error);
                return Err(error);
            }
            Err(refresh_error) => {
                warn!(error = %refresh_error, "token refresh failed");
                log_api_error(&error);
                return Err(ApiError::SessionExpired {
                    method: request.method.clone(),
                    url: self.url_for(&request.path),
                });
            }
        };

        debug!(method = %request.method, path = %request.path, "retrying request with refreshed token");
        let retry = request.clone().authorization(format!("Bearer {access}"));

        match self.execute(&retry, "").await {
            Ok(response) => Ok(response),
            Err(retry_error) if retry_error.status() == Some(StatusCode::UNAUTHORIZED) => {
                log_api_error(&retry_error);
                self.session.clear()?;
                Err(ApiError::SessionExpired {
                    method: request.method.clone(),
                    url: self.url_for(&request.path),
                })
            }
            Err(retry_error) => {
                log_api_error(&retry_error);
                Err(retry_error)
            }
        }
    }

    /// Obtain a new access token, joining an in-flight refresh if there is one.
    pub async fn refresh_access(&self) -> Result<String, RefreshError> {
        let pending = {
            let mut slot = self
                .refreshing
                .lock()
                .map_err(|_| RefreshError::Store("refresh slot poisoned".into()))?;

            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let refresh = self.session.refresh();
                    if refresh.is_empty() {
                        return Err(RefreshError::MissingRefreshToken);
                    }

                    let pending = perform_refresh(
                        self.http.clone(),
                        self.url_for(REFRESH_PATH),
                        self.session.clone(),
                        refresh,
                    )
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.await;

        if let Ok(mut slot) = self.refreshing.lock() {
            if slot.as_ref().is_some_and(|pending| pending.peek().is_some()) {
                *slot = None;
            }
        }

        outcome
    }

    fn should_refresh(&self, request: &ApiRequest, error: &ApiError) -> bool {
        matches!(error, ApiError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
            && !request.targets_refresh_endpoint()
            && !self.session.refresh().is_empty()
    }

    async fn fresh_access(&self, sent_with: &str) -> Result<String, RefreshError> {
        let current = self.session.access();
        if !current.is_empty() && current != sent_with {
            debug!("access token replaced while request was in flight");
            return Ok(current);
        }
        self.refresh_access().await
    }

    async fn execute(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path);
        let method = request.method.clone();

        let mut builder = self.http.request(method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(authorization) = &request.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        } else if !bearer.is_empty() {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(%method, %url, "sending api request");

        let transport = |source| ApiError::Transport {
            method: method.clone(),
            url: url.clone(),
            source,
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        let body = parse_body(&text);

        if status.is_success() {
            Ok(ApiResponse {
                method,
                url,
                status,
                body,
            })
        } else {
            Err(ApiError::Status {
                method,
                url,
                status,
                body,
            })
        }
    }
}

async fn perform_refresh(
    http: Client,
    url: String,
    session: TokenSession,
    refresh: String,
) -> Result<String, RefreshError> {
    info!("refreshing access token");

    match request_new_access(&http, &url, &refresh).await {
        Ok(access) => {
            session
                .set_access(&access)
                .map_err(|error| RefreshError::Store(error.to_string()))?;
            info!("access token refreshed");
            Ok(access)
        }
        Err(refresh_error) => {
            if let Err(store_error) = session.clear() {
                warn!(error = %store_error, "failed to clear session after refresh failure");
            }
            warn!(error = %refresh_error, "refresh credential rejected, session cleared");
            Err(refresh_error)
        }
    }
}

async fn request_new_access(http: &Client, url: &str, refresh: &str) -> Result<String, RefreshError> {
    let response = http
        .post(url)
        .json(&json!({ "refresh": refresh }))
        .send()
        .await
        .map_err(|error| RefreshError::Transport(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RefreshError::Rejected(status));
    }

    let text = response
        .text()
        .await
        .map_err(|error| RefreshError::Transport(error.to_string()))?;

    let body = parse_body(&text);
    ["access", "token"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str).filter(|t| !t.is_empty()))
        .map(str::to_string)
        .ok_or(RefreshError::MissingAccessToken)
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn log_api_error(error: &ApiError) {
    match error {
        ApiError::Status {
            method,
            url,
            status,
            body,
        } => {
            let message = extract_error_message(body).unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());
            error!(%method, %url, status = status.as_u16(), %message, "api request failed");
        }
        ApiError::Transport { method, url, source } => {
            error!(%method, %url, error = %source, "api request failed");
        }
        other => error!(error = %other, "api request failed"),
    }
}

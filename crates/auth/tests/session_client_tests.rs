//! Integration tests for bearer attachment and the refresh-and-retry path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use httpmock::prelude::*;
use parceldesk_auth::{
    ApiError, ApiRequest, ErrorKind, FileStore, MemoryStore, SessionClient, TokenSession,
};
use parceldesk_config::{ApiConfig, SessionConfig};
use serde_json::json;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

struct TestContext {
    server: MockServer,
    session: TokenSession,
    client: SessionClient,
}

impl TestContext {
    async fn new() -> Self {
        let server = MockServer::start_async().await;
        let session = TokenSession::new(Arc::new(MemoryStore::new()), &SessionConfig::default());
        let client = SessionClient::with_http(
            reqwest::Client::new(),
            server.base_url(),
            session.clone(),
        );
        Self {
            server,
            session,
            client,
        }
    }

    async fn signed_in(access: &str, refresh: &str) -> TestResult<Self> {
        let ctx = Self::new().await;
        ctx.session.set_access(access)?;
        ctx.session.set_refresh(refresh)?;
        Ok(ctx)
    }
}

#[tokio::test]
async fn attaches_bearer_token_when_access_is_present() -> TestResult {
    let ctx = TestContext::signed_in("a1", "r1").await?;

    let me = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/me/").header("Authorization", "Bearer a1");
            then.status(200).json_body(json!({"full_name": "Айбек"}));
        })
        .await;

    let response = ctx.client.send(ApiRequest::get("me/")).await?;

    assert_eq!(response.body["full_name"], "Айбек");
    me.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn explicit_authorization_header_is_not_overwritten() -> TestResult {
    let ctx = TestContext::signed_in("a1", "r1").await?;

    let custom = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/me/").header("Authorization", "Token custom");
            then.status(200).json_body(json!({}));
        })
        .await;

    ctx.client
        .send(ApiRequest::get("me/").authorization("Token custom"))
        .await?;

    custom.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn expired_access_is_refreshed_and_request_retried_once() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let rejected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer old");
            then.status(401).json_body(json!({"detail": "Token is invalid or expired"}));
        })
        .await;
    let accepted = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer new");
            then.status(200).json_body(json!({"results": [], "next": null}));
        })
        .await;
    let refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/token/refresh/")
                .json_body(json!({"refresh": "r1"}));
            then.status(200).json_body(json!({"access": "new"}));
        })
        .await;

    let response = ctx.client.send(ApiRequest::get("orders/")).await?;

    assert_eq!(response.body["results"], json!([]));
    assert_eq!(ctx.session.access(), "new");
    assert_eq!(ctx.session.refresh(), "r1");
    rejected.assert_hits_async(1).await;
    accepted.assert_hits_async(1).await;
    refresh.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn concurrent_unauthorised_requests_share_one_refresh() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let _rejected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer old");
            then.status(401);
        })
        .await;
    let accepted = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer shared");
            then.status(200).json_body(json!({"results": []}));
        })
        .await;
    let refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(json!({"access": "shared"}));
        })
        .await;

    let requests = (0..5).map(|_| ctx.client.send(ApiRequest::get("orders/")));
    let outcomes = join_all(requests).await;

    for outcome in outcomes {
        assert_eq!(outcome?.status, reqwest::StatusCode::OK);
    }
    refresh.assert_hits_async(1).await;
    accepted.assert_hits_async(5).await;
    assert_eq!(ctx.session.access(), "shared");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn spawned_requests_share_one_refresh_over_a_file_store() -> TestResult {
    let dir = tempfile::tempdir()?;
    let server = MockServer::start_async().await;
    let session = TokenSession::new(
        Arc::new(FileStore::new(dir.path().join("session.json"))),
        &SessionConfig::default(),
    );
    session.set_access("old")?;
    session.set_refresh("r1")?;
    let client = SessionClient::with_http(reqwest::Client::new(), server.base_url(), session.clone());

    let _rejected = server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer old");
            then.status(401);
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer shared");
            then.status(200).json_body(json!({"results": []}));
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/").json_body(json!({"refresh": "r1"}));
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(json!({"access": "shared"}));
        })
        .await;

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get("orders/")).await })
        })
        .collect();

    for handle in join_all(handles).await {
        assert_eq!(handle??.status, reqwest::StatusCode::OK);
    }
    refresh.assert_hits_async(1).await;
    accepted.assert_hits_async(40).await;
    assert_eq!(session.access(), "shared");
    assert_eq!(session.refresh(), "r1");
    Ok(())
}

#[tokio::test]
async fn refresh_endpoint_is_never_auto_retried() -> TestResult {
    let ctx = TestContext::signed_in("a1", "r1").await?;

    let refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(401).json_body(json!({"detail": "Token is blacklisted"}));
        })
        .await;

    let err = ctx
        .client
        .send(ApiRequest::post("auth/token/refresh/").json(json!({"refresh": "r1"})))
        .await
        .expect_err("refresh endpoint 401 should propagate");

    assert!(matches!(err, ApiError::Status { status, .. } if status == 401));
    refresh.assert_hits_async(1).await;
    assert_eq!(ctx.session.access(), "a1");
    assert_eq!(ctx.session.refresh(), "r1");
    Ok(())
}

#[tokio::test]
async fn second_unauthorised_response_clears_session() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let protected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/me/");
            then.status(401);
        })
        .await;
    let refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"access": "also-rejected"}));
        })
        .await;

    let err = ctx
        .client
        .send(ApiRequest::get("me/"))
        .await
        .expect_err("second 401 should propagate");

    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert_eq!(err.kind(), ErrorKind::SessionExpired);
    protected.assert_hits_async(2).await;
    refresh.assert_hits_async(1).await;
    assert!(!ctx.session.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn missing_refresh_token_propagates_original_error() -> TestResult {
    let ctx = TestContext::new().await;
    ctx.session.set_access("old")?;

    let protected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/me/");
            then.status(401).json_body(json!({"detail": "expired"}));
        })
        .await;
    let refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"access": "new"}));
        })
        .await;

    let err = ctx
        .client
        .send(ApiRequest::get("me/"))
        .await
        .expect_err("401 without refresh token should propagate");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.server_message().as_deref(), Some("expired"));
    protected.assert_hits_async(1).await;
    refresh.assert_hits_async(0).await;
    assert_eq!(ctx.session.access(), "old");
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_clears_both_credentials() -> TestResult {
    let ctx = TestContext::signed_in("old", "stale").await?;

    let _protected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/me/");
            then.status(401);
        })
        .await;
    let _refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(401).json_body(json!({"detail": "Token is invalid or expired"}));
        })
        .await;

    let err = ctx
        .client
        .send(ApiRequest::get("me/"))
        .await
        .expect_err("rejected refresh should fail the request");

    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert_eq!(ctx.session.access(), "");
    assert_eq!(ctx.session.refresh(), "");
    Ok(())
}

#[tokio::test]
async fn refresh_without_access_in_body_counts_as_failure() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let _refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"access": ""}));
        })
        .await;

    let err = ctx
        .client
        .refresh_access()
        .await
        .expect_err("empty access token is a failed refresh");

    assert!(matches!(err, parceldesk_auth::RefreshError::MissingAccessToken));
    assert!(!ctx.session.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn refresh_accepts_token_field() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let _refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"token": "via-token-field"}));
        })
        .await;

    let access = ctx.client.refresh_access().await?;

    assert_eq!(access, "via-token-field");
    assert_eq!(ctx.session.access(), "via-token-field");
    Ok(())
}

#[tokio::test]
async fn server_error_on_retry_keeps_session() -> TestResult {
    let ctx = TestContext::signed_in("old", "r1").await?;

    let _rejected = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer old");
            then.status(401);
        })
        .await;
    let _failing = ctx
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/orders/").header("Authorization", "Bearer new");
            then.status(503).body("maintenance");
        })
        .await;
    let _refresh = ctx
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"access": "new"}));
        })
        .await;

    let err = ctx
        .client
        .send(ApiRequest::get("orders/"))
        .await
        .expect_err("503 should propagate");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(ctx.session.access(), "new");
    assert_eq!(ctx.session.refresh(), "r1");
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() -> TestResult {
    let session = TokenSession::new(Arc::new(MemoryStore::new()), &SessionConfig::default());
    let config = ApiConfig {
        base_url: "http://127.0.0.1:9/".into(),
        request_timeout_seconds: 2,
    };
    let client = SessionClient::new(&config, session)?;

    let err = client
        .send(ApiRequest::get("me/"))
        .await
        .expect_err("nothing listens on port 9");

    assert_eq!(err.kind(), ErrorKind::Network);
    Ok(())
}

#[tokio::test]
async fn refreshed_token_survives_a_new_store_handle() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let server = MockServer::start_async().await;

    let session = TokenSession::new(Arc::new(FileStore::new(&path)), &SessionConfig::default());
    session.set_refresh("r1")?;
    let client = SessionClient::with_http(reqwest::Client::new(), server.base_url(), session);

    let _refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/token/refresh/");
            then.status(200).json_body(json!({"access": "persisted"}));
        })
        .await;

    client.refresh_access().await?;

    let reopened = TokenSession::new(Arc::new(FileStore::new(&path)), &SessionConfig::default());
    assert_eq!(reopened.access(), "persisted");
    assert_eq!(reopened.refresh(), "r1");
    Ok(())
}

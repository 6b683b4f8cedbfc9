//! Integration tests for the REST client using wiremock mock server

use smartmarks::backend::{
    AuthService, AuthorizedDataAccess, BackendError, MemoryBackend, SupabaseClient, SupabaseConfig,
};
use smartmarks::model::{BookmarkId, NewBookmark, UserId};
use smartmarks::view::{BookmarkView, RenderState, Services, ViewOptions};

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn config(server: &MockServer) -> SupabaseConfig {
    SupabaseConfig {
        base_url: server.uri(),
        anon_key: "anon-key".to_string(),
        retry_base_ms: 1,
        ..Default::default()
    }
}

fn signed_in(server: &MockServer) -> SupabaseClient {
    SupabaseClient::with_access_token(config(server), "user-jwt").unwrap()
}

fn rows() -> serde_json::Value {
    json!([
        {
            "id": "b2",
            "title": "Newer",
            "url": "https://newer.example.com",
            "user_id": "u1",
            "created_at": "2024-01-02T00:00:00Z"
        },
        {
            "id": "b1",
            "title": "Older",
            "url": "https://older.example.com",
            "user_id": "u1",
            "created_at": "2024-01-01T00:00:00+00:00"
        }
    ])
}

#[tokio::test]
async fn test_current_identity_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "aud": "authenticated",
            "email": "ada@example.com",
            "app_metadata": { "provider": "google" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let identity = client.current_identity().await.unwrap().unwrap();

    assert_eq!(identity.id, UserId::new("u1"));
    assert_eq!(identity.display_name(), "ada@example.com");
}

#[tokio::test]
async fn test_rejected_token_means_no_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "msg": "invalid JWT"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    assert_eq!(client.current_identity().await.unwrap(), None);
}

#[tokio::test]
async fn test_list_bookmarks_query_and_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("select", "*"))
        .and(query_param("order", "created_at.desc"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let bookmarks = client.list_bookmarks().await.unwrap();

    // Server order is kept as-is
    let ids: Vec<&str> = bookmarks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["b2", "b1"]);
    assert_eq!(bookmarks[1].title, "Older");
}

#[tokio::test]
async fn test_list_bookmarks_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "not": "a list" })))
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let result = client.list_bookmarks().await;

    assert!(matches!(result, Err(BackendError::Decode(_))));
}

#[tokio::test]
async fn test_insert_bookmark_body_and_prefer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .and(header("prefer", "return=minimal"))
        .and(body_json(json!([
            { "title": "Rust", "url": "https://rust-lang.org", "user_id": "u1" }
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    client
        .insert_bookmark(&NewBookmark::new("Rust", "https://rust-lang.org", UserId::new("u1")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_insert_rejected_by_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let result = client
        .insert_bookmark(&NewBookmark::new("X", "http://x", UserId::new("someone-else")))
        .await;

    match result {
        Err(BackendError::Unauthorized(message)) => assert!(message.contains("row-level security")),
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_insert_not_resent_after_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let result = client
        .insert_bookmark(&NewBookmark::new("Rust", "https://rust-lang.org", UserId::new("u1")))
        .await;

    assert!(matches!(result, Err(BackendError::Api { status: 503, .. })));
}

#[tokio::test]
async fn test_insert_not_resent_after_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::with_access_token(
        SupabaseConfig {
            request_timeout_ms: 100,
            ..config(&mock_server)
        },
        "user-jwt",
    )
    .unwrap();
    let result = client
        .insert_bookmark(&NewBookmark::new("Rust", "https://rust-lang.org", UserId::new("u1")))
        .await;

    assert!(matches!(result, Err(BackendError::Timeout)));
}

#[tokio::test]
async fn test_insert_not_resent_when_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let result = client
        .insert_bookmark(&NewBookmark::new("Rust", "https://rust-lang.org", UserId::new("u1")))
        .await;

    assert!(matches!(result, Err(BackendError::RateLimited)));
}

#[tokio::test]
async fn test_retry_after_is_capped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "86400"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = SupabaseClient::with_access_token(
        SupabaseConfig {
            request_timeout_ms: 200,
            max_retries: 2,
            ..config(&mock_server)
        },
        "user-jwt",
    )
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), client.list_bookmarks())
        .await
        .expect("capped Retry-After should not stall the call");

    assert!(matches!(result, Err(BackendError::RateLimited)));
}

#[tokio::test]
async fn test_delete_bookmark_filter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("id", "eq.b1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    client.delete_bookmark(&BookmarkId::new("b1")).await.unwrap();
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    assert!(client.list_bookmarks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let result = client.delete_bookmark(&BookmarkId::new("")).await;

    assert!(matches!(result, Err(BackendError::Api { status: 400, .. })));
}

#[tokio::test]
async fn test_retries_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    let err = client.list_bookmarks().await.unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_sign_out_clears_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = signed_in(&mock_server);
    client.sign_out().await.unwrap();

    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn test_view_over_rest_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "email": "ada@example.com"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let rest = Arc::new(signed_in(&mock_server));
    let changes = Arc::new(MemoryBackend::new());
    let services = Services::new(rest.clone(), rest, changes.clone());

    let mut view = BookmarkView::new(services, ViewOptions::default());
    view.mount().await;
    view.settle_quiet(Duration::from_millis(50)).await;

    assert_eq!(view.state().render_state(), RenderState::AuthenticatedPopulated);
    assert_eq!(view.state().bookmarks()[0].title, "Newer");
    assert_eq!(changes.active_subscriptions(), 1);

    view.unmount().await;
    assert_eq!(changes.active_subscriptions(), 0);
}

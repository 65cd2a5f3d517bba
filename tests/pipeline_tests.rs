//! Integration tests for the request pipeline: query flattening,
//! cache-busting, bearer injection, and failure classification.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use anystore::auth::{
    token_key, AuthDelegate, AuthError, AuthSession, KeyValueStore, LoginOptions, MemoryStore,
    NoUiPrompt, SessionSpec, UserProfile,
};
use anystore::backend::{ApiClient, RequestOptions, ResponseKind};
use anystore::error::{ErrorCategory, StoreError};
use anystore::permissions::PermissionSet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(Url::parse(&server.uri()).unwrap())
}

struct AcceptAll;

#[async_trait]
impl AuthDelegate for AcceptAll {
    async fn fetch_user(&self, _token: &str) -> Result<UserProfile, AuthError> {
        Ok(UserProfile {
            username: "octocat".into(),
            name: None,
            avatar: None,
            url: None,
        })
    }
}

async fn authenticated_session(token: &str) -> Arc<AuthSession> {
    let store = Arc::new(MemoryStore::new());
    store.set(&token_key("github"), token).unwrap();
    let session = Arc::new(AuthSession::new(
        SessionSpec::builder()
            .provider("github".into())
            .authorize_endpoint(Url::parse("https://github.com/login/oauth/authorize").unwrap())
            .maybe_client_id(None)
            .origin("https://example.com".into())
            .store(store as Arc<dyn KeyValueStore>)
            .prompt(Arc::new(NoUiPrompt))
            .permissions(PermissionSet::new())
            .build(),
    ));
    session
        .login(&AcceptAll, LoginOptions::passive())
        .await
        .unwrap();
    session
}

// ---------------------------------------------------------------------------
// 1. Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_bodies_flatten_into_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let response = client(&server)
        .request(
            "search",
            Some(json!({"q": "rust", "page": 2})),
            Method::GET,
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(response.into_json().unwrap()["ok"], json!(true));
}

#[tokio::test]
async fn get_requests_carry_a_cache_busting_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .mount(&server)
        .await;

    client(&server)
        .request("data", None, Method::GET, RequestOptions::kind(ResponseKind::Text))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().unwrap_or("").contains("timestamp="));
}

#[tokio::test]
async fn cache_ok_skips_the_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .mount(&server)
        .await;

    let options = RequestOptions {
        kind: ResponseKind::Text,
        cache_ok: true,
        ..Default::default()
    };
    client(&server)
        .request("data", None, Method::GET, options)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query().unwrap_or("").contains("timestamp="));
}

#[tokio::test]
async fn post_bodies_are_sent_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    client(&server)
        .request(
            "item",
            Some(json!({"value": 1})),
            Method::PUT,
            RequestOptions::default(),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({"value": 1}));
}

#[tokio::test]
async fn bearer_header_is_injected_when_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .mount(&server)
        .await;

    let session = authenticated_session("tok_abc").await;
    client(&server)
        .with_session(session)
        .request("data", None, Method::GET, RequestOptions::kind(ResponseKind::Text))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer tok_abc");
}

// ---------------------------------------------------------------------------
// 2. Outcome classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_2xx_becomes_a_typed_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .request("missing", None, Method::GET, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        StoreError::Api { status, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn transport_failure_is_a_distinct_retryable_error() {
    // Nothing listens here.
    let client = ApiClient::new(Url::parse("http://127.0.0.1:9").unwrap());
    let err = client
        .request("data", None, Method::GET, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Network(_)));
    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn response_kinds_decode_accordingly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
        .mount(&server)
        .await;

    let client = client(&server);
    let json_value = client
        .request("json", None, Method::GET, RequestOptions::default())
        .await
        .unwrap()
        .into_json()
        .unwrap();
    assert_eq!(json_value, json!({"n": 1}));

    let text = client
        .request("text", None, Method::GET, RequestOptions::kind(ResponseKind::Text))
        .await
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(text, "plain");
}

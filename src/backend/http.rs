//! Shared HTTP client and the authenticated request pipeline.

use std::sync::{Arc, OnceLock};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::auth::AuthSession;
use crate::error::{Result, StoreError};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Default headers for a Bearer-token API.
pub fn bearer_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// How the caller wants the response decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
    #[default]
    Json,
    Text,
    Bytes,
    /// Hand back the undecoded response object.
    Response,
}

/// A decoded (or deliberately undecoded) successful response.
#[derive(Debug)]
pub enum ApiResponse {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    Response(reqwest::Response),
}

impl ApiResponse {
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(text) => Ok(serde_json::from_str(&text)?),
            other => Err(StoreError::UnsupportedOperation(format!(
                "response was not decoded as JSON: {other:?}"
            ))),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(value.to_string()),
            other => Err(StoreError::UnsupportedOperation(format!(
                "response was not decoded as text: {other:?}"
            ))),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub kind: ResponseKind,
    /// Skip the cache-busting timestamp on GET requests.
    pub cache_ok: bool,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn kind(kind: ResponseKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Authenticated request pipeline bound to one adapter's API domain.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api_base: Url,
    session: Option<Arc<AuthSession>>,
    default_headers: Vec<(String, String)>,
}

impl ApiClient {
    pub fn new(api_base: Url) -> Self {
        Self {
            api_base,
            session: None,
            default_headers: Vec::new(),
        }
    }

    /// Attach a session; its current token is read on every request.
    pub fn with_session(mut self, session: Arc<AuthSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((key.into(), value.into()));
        self
    }

    /// Build, send and classify one request.
    ///
    /// Relative endpoints resolve against the API base. A JSON object body
    /// on GET/HEAD is flattened into query parameters instead of being sent
    /// as a body. Non-2xx responses come back as [`StoreError::Api`] with
    /// the status and raw body; transport failures before any status exists
    /// come back as [`StoreError::Network`].
    pub async fn request(
        &self,
        endpoint: &str,
        body: Option<serde_json::Value>,
        method: Method,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let mut url = self.resolve(endpoint)?;

        let query_body = method == Method::GET || method == Method::HEAD;
        if query_body {
            if let Some(serde_json::Value::Object(fields)) = &body {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in fields {
                    pairs.append_pair(key, &scalar_to_string(value));
                }
            }
        }
        if method == Method::GET && !options.cache_ok {
            url.query_pairs_mut().append_pair(
                "timestamp",
                &chrono::Utc::now().timestamp_millis().to_string(),
            );
        }

        let token = self.session.as_ref().and_then(|s| s.access_token());
        let mut request = shared_client()
            .request(method.clone(), url.clone())
            .headers(bearer_headers(token.as_deref()));
        for (key, value) in &self.default_headers {
            request = request.header(key, value);
        }
        for (key, value) in &options.headers {
            request = request.header(key, value);
        }
        if !query_body {
            if let Some(body) = body {
                request = request.json(&body);
            }
        }

        debug!(%method, %url, "api request");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::api(
                status.as_u16(),
                error_message(status.as_u16(), &body),
                body,
            ));
        }

        match options.kind {
            ResponseKind::Json => Ok(ApiResponse::Json(response.json().await?)),
            ResponseKind::Text => Ok(ApiResponse::Text(response.text().await?)),
            ResponseKind::Bytes => Ok(ApiResponse::Bytes(response.bytes().await?.to_vec())),
            ResponseKind::Response => Ok(ApiResponse::Response(response)),
        }
    }

    fn resolve(&self, endpoint: &str) -> Result<Url> {
        if endpoint.is_empty() {
            return Ok(self.api_base.clone());
        }
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .api_base
                .join(endpoint)
                .map_err(|e| StoreError::InvalidSource(e.to_string())),
            Err(e) => Err(StoreError::InvalidSource(e.to_string())),
        }
    }
}

/// Pull a human-readable message out of an error body, if one is there.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_endpoints_resolve_against_the_base() {
        let client = ApiClient::new(Url::parse("https://api.github.com/").unwrap());
        assert_eq!(
            client.resolve("repos/foo/bar").unwrap().as_str(),
            "https://api.github.com/repos/foo/bar"
        );
    }

    #[test]
    fn absolute_endpoints_pass_through() {
        let client = ApiClient::new(Url::parse("https://api.github.com/").unwrap());
        assert_eq!(
            client.resolve("https://example.com/x").unwrap().as_str(),
            "https://example.com/x"
        );
    }

    #[test]
    fn empty_endpoint_is_the_base_itself() {
        let client = ApiClient::new(Url::parse("https://example.com/data.json").unwrap());
        assert_eq!(
            client.resolve("").unwrap().as_str(),
            "https://example.com/data.json"
        );
    }

    #[test]
    fn error_message_prefers_the_body() {
        assert_eq!(
            error_message(404, r#"{"message": "Not Found"}"#),
            "Not Found"
        );
        assert_eq!(error_message(500, "<html>"), "HTTP 500");
    }
}

//! HTTP transport, authentication and response decoding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashboard_core::{DashError, DashboardConfig, FileTokenStore, Result, StaticToken, TokenSource};
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback run when the backend rejects the session.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

/// Client for the dashboard backend.
///
/// Cloning is cheap; clones share the HTTP connection pool and the
/// registered unauthorized handlers.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    auth_enabled: bool,
    tokens: Arc<dyn TokenSource>,
    handlers: Arc<RwLock<Vec<UnauthorizedHandler>>>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .field("auth_enabled", &self.auth_enabled)
            .field("tokens", &"[REDACTED]")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl Gateway {
    /// Creates a gateway with the default timeout and authentication enabled.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = build_client(DEFAULT_TIMEOUT)?;
        Ok(Self::with_client(client, base_url, tokens))
    }

    /// Creates a gateway over an existing HTTP client.
    #[must_use]
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_enabled: true,
            tokens,
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Builds a gateway from environment configuration.
    ///
    /// Tokens are read from `token_path` when set; without one, requests go
    /// out unauthenticated.
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        let tokens: Arc<dyn TokenSource> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(StaticToken::none()),
        };
        let client = build_client(config.request_timeout)?;
        Ok(Self::with_client(client, config.api_base_url.clone(), tokens)
            .with_auth_enabled(config.auth_enabled))
    }

    /// Enables or disables bearer token injection.
    #[must_use]
    pub const fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// The base URL paths are joined to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether requests carry a bearer token.
    #[must_use]
    pub const fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// Registers a callback run once for every HTTP 401 response.
    pub fn on_unauthorized<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn notify_unauthorized(&self) {
        // Handlers may register further handlers; run them outside the lock.
        let handlers = self.handlers.read().clone();
        warn!(handlers = handlers.len(), "Backend rejected credentials");
        for handler in handlers {
            handler();
        }
    }

    /// Issues a request without a body and returns the unwrapped payload.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        self.send(method, path, params, None).await
    }

    /// Issues a request with an optional JSON body.
    #[instrument(skip_all, fields(method = %method, path = path))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut builder = self.client.request(method, self.url(path));
        if !params.is_empty() {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if self.auth_enabled {
            if let Some(token) = self.tokens.token().await {
                builder = builder.bearer_auth(token);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DashError::Network(e.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), "Backend responded");

        if status == StatusCode::UNAUTHORIZED {
            self.notify_unauthorized();
            return Err(DashError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .map_err(|e| DashError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(DashError::Server {
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| DashError::Parse(format!("{e}: {text}")))?;
        unwrap_envelope(value, status)
    }

    /// Issues a GET and decodes the payload into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let value = self.request(Method::GET, path, params).await?;
        decode(value)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DashError::Config(format!("HTTP client: {e}")))
}

/// Decodes an unwrapped payload into `T`.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| DashError::Parse(e.to_string()))
}

fn unwrap_envelope(value: Value, status: StatusCode) -> Result<Value> {
    match value {
        Value::Object(mut map) => match map.get("success").and_then(Value::as_bool) {
            Some(true) => Ok(map.remove("data").unwrap_or(Value::Null)),
            Some(false) => Err(DashError::Server {
                status: status.as_u16(),
                message: envelope_message(&map)
                    .unwrap_or_else(|| "request was not successful".to_string()),
            }),
            None => Ok(Value::Object(map)),
        },
        other => Ok(other),
    }
}

fn envelope_message(map: &Map<String, Value>) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn error_message(text: &str, status: StatusCode) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        if let Some(message) = envelope_message(&map) {
            return message;
        }
    }
    let text = text.trim();
    if text.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, token: Option<&str>) -> Gateway {
        let tokens: Arc<dyn TokenSource> = match token {
            Some(t) => Arc::new(StaticToken::new(t)),
            None => Arc::new(StaticToken::none()),
        };
        Gateway::new(server.uri(), tokens).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let value = gateway(&server, Some("secret"))
            .request(Method::GET, "/calls", &[])
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_missing_token_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        gateway(&server, None)
            .request(Method::GET, "calls", &[])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_auth_disabled_skips_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        gateway(&server, Some("secret"))
            .with_auth_enabled(false)
            .request(Method::GET, "/metrics", &[])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_unauthorized_runs_handlers_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server, Some("expired"));
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            gw.on_unauthorized(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let err = gw.request(Method::GET, "/calls", &[]).await.unwrap_err();
        assert_eq!(err, DashError::Unauthorized);
        assert_eq!(err.status(), Some(401));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "database down"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = gateway(&server, None)
            .request(Method::GET, "/calls", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DashError::Server {
                status: 500,
                message: "database down".into()
            }
        );
    }

    #[tokio::test]
    async fn test_envelope_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/credits/balance"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": {"credits": 12.5}})),
            )
            .mount(&server)
            .await;

        let value = gateway(&server, None)
            .request(Method::GET, "/credits/balance", &[])
            .await
            .unwrap();
        assert_eq!(value, json!({"credits": 12.5}));
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "quota exceeded"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server, None)
            .request(Method::GET, "/calls", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DashError::Server {
                status: 200,
                message: "quota exceeded".into()
            }
        );
    }

    #[tokio::test]
    async fn test_params_and_body_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/inquiries/7/status"))
            .and(query_param("notify", "true"))
            .and(body_json(json!({"status": "resolved"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let value = gateway(&server, None)
            .send(
                Method::PATCH,
                "/inquiries/7/status",
                &[("notify", "true".to_string())],
                Some(&json!({"status": "resolved"})),
            )
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = gateway(&server, None)
            .request(Method::GET, "/calls", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DashError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let gw = Gateway::new("http://127.0.0.1:9", Arc::new(StaticToken::none())).unwrap();
        let err = gw.request(Method::GET, "/calls", &[]).await.unwrap_err();
        assert!(matches!(err, DashError::Network(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_debug_hides_token() {
        let gw = Gateway::new("https://api.example.com/", Arc::new(StaticToken::new("secret")))
            .unwrap();
        let debug = format!("{gw:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("https://api.example.com"));
        assert_eq!(gw.base_url(), "https://api.example.com");
    }
}

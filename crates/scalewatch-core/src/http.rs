//! Minimal JSON-over-HTTP/1.1 client for collaborator adapters.
//!
//! One TCP connection per request, driven by hyper's low-level client
//! connection API. Requests carry an optional bearer token from a
//! [`TokenSource`]; a `401` invalidates the token and the request is sent
//! once more with a freshly resolved credential, which is how rotated
//! secrets are picked up.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::BoxFuture;

const CLIENT_AGENT: &str = "scalewatch/0.1";

/// Supplies bearer tokens and drops them when the server rejects them.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> BoxFuture<'_, Result<String, String>>;

    fn invalidate(&self) -> BoxFuture<'_, ()>;
}

/// Token that never changes.
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn token(&self) -> BoxFuture<'_, Result<String, String>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }

    fn invalidate(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// JSON client bound to one `host:port`.
#[derive(Clone)]
pub struct JsonClient {
    address: String,
    token: Option<Arc<dyn TokenSource>>,
    timeout: Duration,
}

impl std::fmt::Debug for JsonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonClient")
            .field("address", &self.address)
            .field("authenticated", &self.token.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl JsonClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: Arc<dyn TokenSource>) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        let body = self.request(Method::GET, path, None).await?;
        decode(&body)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let payload = encode(body)?;
        let body = self.request(Method::POST, path, Some(payload)).await?;
        decode(&body)
    }

    /// Send a JSON body and ignore the response payload.
    pub async fn send_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), HttpError> {
        let payload = encode(body)?;
        self.request(method, path, Some(payload)).await.map(|_| ())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<Bytes, HttpError> {
        let token = match &self.token {
            Some(source) => Some(source.token().await.map_err(HttpError::Credential)?),
            None => None,
        };

        let (status, bytes) = self
            .send_once(method.clone(), path, body.clone(), token.as_deref())
            .await?;

        if status == StatusCode::UNAUTHORIZED
            && let Some(source) = &self.token
        {
            warn!(address = %self.address, %path, "credential rejected, re-resolving");
            source.invalidate().await;
            let fresh = source.token().await.map_err(HttpError::Credential)?;
            let (status, bytes) = self.send_once(method, path, body, Some(&fresh)).await?;
            return check_status(status, bytes);
        }

        check_status(status, bytes)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        token: Option<&str>,
    ) -> Result<(StatusCode, Bytes), HttpError> {
        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| HttpError::Connect {
                    address: self.address.clone(),
                    reason: e.to_string(),
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
                .await
                .map_err(|e| HttpError::Request(e.to_string()))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "http connection closed with error");
                }
            });

            let mut builder = http::Request::builder()
                .method(method)
                .uri(path)
                .header(HOST, self.address.as_str())
                .header(USER_AGENT, CLIENT_AGENT);
            if body.is_some() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            if let Some(token) = token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let req = builder
                .body(Full::new(body.unwrap_or_default()))
                .map_err(|e| HttpError::Request(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| HttpError::Request(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| HttpError::Request(e.to_string()))?
                .to_bytes();
            debug!(address = %self.address, %path, %status, "http exchange complete");
            Ok::<_, HttpError>((status, bytes))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(self.timeout)),
        }
    }
}

fn check_status(status: StatusCode, bytes: Bytes) -> Result<Bytes, HttpError> {
    if status.is_success() {
        Ok(bytes)
    } else {
        Err(HttpError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).chars().take(256).collect(),
        })
    }
}

fn encode<B: Serialize>(body: &B) -> Result<Bytes, HttpError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| HttpError::Request(format!("encode body: {e}")))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Json;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    /// Token source that hands out "stale" first and "fresh" after invalidation.
    struct RotatingToken {
        invalidations: AtomicUsize,
    }

    impl TokenSource for RotatingToken {
        fn token(&self) -> BoxFuture<'_, Result<String, String>> {
            Box::pin(async move {
                if self.invalidations.load(Ordering::SeqCst) == 0 {
                    Ok("stale".to_string())
                } else {
                    Ok("fresh".to_string())
                }
            })
        }

        fn invalidate(&self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.invalidations.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn get_and_post_json() {
        let router = Router::new()
            .route("/value", get(|| async { Json(serde_json::json!({ "n": 7 })) }))
            .route(
                "/echo",
                post(|Json(v): Json<serde_json::Value>| async move { Json(v) }),
            );
        let addr = serve(router).await;
        let client = JsonClient::new(addr);

        let v: serde_json::Value = client.get_json("/value").await.unwrap();
        assert_eq!(v["n"], 7);

        let echoed: serde_json::Value = client
            .post_json("/echo", &serde_json::json!({ "a": [1, 2] }))
            .await
            .unwrap();
        assert_eq!(echoed["a"][1], 2);
    }

    #[tokio::test]
    async fn non_2xx_is_status_error() {
        let router = Router::new().route(
            "/broken",
            get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let addr = serve(router).await;
        let err = JsonClient::new(addr)
            .get_json::<serde_json::Value>("/broken")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 502, ref body } if body == "upstream down"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let router = Router::new().route("/text", get(|| async { "not json" }));
        let addr = serve(router).await;
        let err = JsonClient::new(addr)
            .get_json::<serde_json::Value>("/text")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = JsonClient::new(addr)
            .get_json::<serde_json::Value>("/")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Connect { .. }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(router).await;
        let err = JsonClient::new(addr)
            .with_timeout(Duration::from_millis(100))
            .get_json::<serde_json::Value>("/slow")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
    }

    #[tokio::test]
    async fn unauthorized_triggers_one_reauth() {
        let router = Router::new().route(
            "/secure",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer fresh" {
                    (axum::http::StatusCode::OK, Json(serde_json::json!({ "ok": true })))
                } else {
                    (
                        axum::http::StatusCode::UNAUTHORIZED,
                        Json(serde_json::json!({ "ok": false })),
                    )
                }
            }),
        );
        let addr = serve(router).await;
        let token = Arc::new(RotatingToken {
            invalidations: AtomicUsize::new(0),
        });
        let client = JsonClient::new(addr).with_token(token.clone());

        let v: serde_json::Value = client.get_json("/secure").await.unwrap();
        assert_eq!(v["ok"], true);
        assert_eq!(token.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_token_is_sent() {
        let router = Router::new().route(
            "/whoami",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({ "auth": auth }))
            }),
        );
        let addr = serve(router).await;
        let client = JsonClient::new(addr).with_token(Arc::new(StaticToken("abc".into())));
        let v: serde_json::Value = client.get_json("/whoami").await.unwrap();
        assert_eq!(v["auth"], "Bearer abc");
    }
}

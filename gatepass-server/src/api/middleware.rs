//! Route middleware: per-class rate limiting, idempotent replay and the
//! request deadline.
//!
//! Layer order on a route is deadline → rate limit → idempotency → handler,
//! so a rate-limited request never touches the idempotency store and a
//! replay still pays for a token.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gatepass_core::config::ServerConfig;
use gatepass_core::idempotency::{
    CapturedResponse, Execution, IdempotencyCoordinator, IdempotencyScope, request_fingerprint,
};
use gatepass_core::rate_limit::{RateLimiter, now_millis};
use gatepass_sdk::headers::{
    IDEMPOTENT_REPLAY_HEADER, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER,
    RATE_LIMIT_RESET_HEADER,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::api::error::ApiError;
use crate::api::extractors::{actor_key, client_addr};

/// Largest request body buffered for fingerprinting.
const MAX_IDEMPOTENT_BODY: usize = 1024 * 1024;

const MAX_TOKEN_LEN: usize = 255;

#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: RateLimiter,
    pub server: Arc<RwLock<ServerConfig>>,
}

pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    // Buckets follow the network address; identity headers are not
    // trusted for admission.
    let trust = guard.server.read().await.trust_forwarded_for;
    let client = client_addr(request.headers(), request.extensions(), trust);
    let decision = guard.limiter.allow(&client).await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        debug!(class = %guard.limiter.class(), client = %client, "Rate limited");
        ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs(now_millis()),
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(decision.reset_at));
    response
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    pub coordinator: IdempotencyCoordinator,
    pub server: Arc<RwLock<ServerConfig>>,
    /// Header names carrying the token, first match wins.
    pub token_headers: &'static [&'static str],
}

impl IdempotencyGuard {
    fn token(&self, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
        let Some(value) = self
            .token_headers
            .iter()
            .find_map(|name| headers.get(*name))
        else {
            return Ok(None);
        };
        let token = value
            .to_str()
            .map_err(|_| ApiError::InvalidRequest("invalid idempotency key".to_string()))?
            .trim();
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(ApiError::InvalidRequest(format!(
                "idempotency key must be 1 to {MAX_TOKEN_LEN} characters"
            )));
        }
        Ok(Some(token.to_string()))
    }
}

pub async fn idempotency(
    State(guard): State<IdempotencyGuard>,
    request: Request,
    next: Next,
) -> Response {
    let token = match guard.token(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => return next.run(request).await,
        Err(e) => return e.into_response(),
    };

    let trust = guard.server.read().await.trust_forwarded_for;
    let actor = actor_key(request.headers(), request.extensions(), trust);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_IDEMPOTENT_BODY).await {
        Ok(body) => body,
        Err(_) => {
            return ApiError::InvalidRequest("request body too large".to_string()).into_response();
        }
    };
    let fingerprint = request_fingerprint(method.as_str(), &path, &body);
    let request = Request::from_parts(parts, Body::from(body));

    let scope = IdempotencyScope {
        actor: &actor,
        path: &path,
        token: &token,
    };
    let execution = guard
        .coordinator
        .execute(scope, &fingerprint, move || async move {
            capture(next.run(request).await).await
        })
        .await;

    match execution {
        Ok(execution) => restore(execution),
        Err(e) => {
            debug!(path = %path, error = %e, "Idempotency check refused request");
            ApiError::from(e).into_response()
        }
    }
}

async fn capture(response: Response) -> CapturedResponse {
    let (parts, body) = response.into_parts();
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => CapturedResponse {
            status: parts.status.as_u16(),
            content_type,
            body,
        },
        Err(e) => {
            error!(error = %e, "Failed to buffer response body");
            CapturedResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                content_type: None,
                body: bytes::Bytes::new(),
            }
        }
    }
}

fn restore(execution: Execution) -> Response {
    let replayed = execution.is_replay();
    let captured = execution.into_response();

    let mut response = Response::new(Body::from(captured.body));
    *response.status_mut() =
        StatusCode::from_u16(captured.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Some(content_type) = captured
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    if replayed {
        response
            .headers_mut()
            .insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Drop the handler and answer `REQUEST_TIMEOUT` once the configured
/// deadline passes.
pub async fn deadline(
    State(server): State<Arc<RwLock<ServerConfig>>>,
    request: Request,
    next: Next,
) -> Response {
    let timeout = server.read().await.request_timeout;
    let path = request.uri().path().to_string();
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout_secs = timeout.as_secs(), "Request deadline exceeded");
            ApiError::RequestTimeout.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use axum::{Json, Router, middleware::from_fn_with_state, routing::post};
    use gatepass_core::config::{IdempotencyConfig, LimitClass, RateLimitPolicy, RateLimitsConfig};
    use gatepass_core::coordination::{KeyValueStore, MemoryStore};
    use axum::extract::ConnectInfo;
    use gatepass_sdk::headers::{IDEMPOTENCY_KEY_HEADER, USER_ID_HEADER};
    use std::net::SocketAddr;
    use uuid::Uuid;
    use gatepass_sdk::objects::Envelope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn server_config(request_timeout: Duration) -> Arc<RwLock<ServerConfig>> {
        Arc::new(RwLock::new(ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            request_timeout,
            trust_forwarded_for: false,
            venue_utc_offset: time::UtcOffset::UTC,
        }))
    }

    fn counting_router(calls: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/api/orders",
            post(move |body: bytes::Bytes| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    (
                        StatusCode::CREATED,
                        Json(Envelope::data(serde_json::json!({
                            "call": n,
                            "echo": String::from_utf8_lossy(&body),
                        }))),
                    )
                }
            }),
        )
    }

    fn idempotent_router(calls: Arc<AtomicUsize>) -> Router {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let guard = IdempotencyGuard {
            coordinator: IdempotencyCoordinator::new(
                store,
                Arc::new(RwLock::new(IdempotencyConfig::default())),
            ),
            server: server_config(Duration::from_secs(30)),
            token_headers: &[IDEMPOTENCY_KEY_HEADER],
        };
        counting_router(calls).route_layer(from_fn_with_state(guard, idempotency))
    }

    fn order_request(key: Option<&str>, body: &str) -> Request {
        let mut builder = HttpRequest::post("/api/orders").header(CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_retry_is_replayed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = idempotent_router(calls.clone());

        let first = router
            .clone()
            .oneshot(order_request(Some("k-1"), r#"{"lines":[]}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        assert!(first.headers().get(IDEMPOTENT_REPLAY_HEADER).is_none());
        let first = json(first).await;

        let second = router
            .oneshot(order_request(Some("k-1"), r#"{"lines":[]}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CREATED);
        assert_eq!(second.headers()[IDEMPOTENT_REPLAY_HEADER], "true");
        assert_eq!(second.headers()[CONTENT_TYPE], "application/json");
        let second = json(second).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first["data"], second["data"]);
        assert_ne!(first["request_id"], second["request_id"]);
    }

    #[tokio::test]
    async fn test_same_key_different_body_is_refused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = idempotent_router(calls.clone());

        router
            .clone()
            .oneshot(order_request(Some("k-2"), r#"{"lines":[1]}"#))
            .await
            .unwrap();
        let reused = router
            .oneshot(order_request(Some("k-2"), r#"{"lines":[2]}"#))
            .await
            .unwrap();

        assert_eq!(reused.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(reused).await["error"]["code"], "IDEMPOTENCY_KEY_REUSED");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_key_every_request_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = idempotent_router(calls.clone());
        for _ in 0..3 {
            let response = router.clone().oneshot(order_request(None, "{}")).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let blank = router.oneshot(order_request(Some("  "), "{}")).await.unwrap();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_and_rejection() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let policies = RateLimitsConfig {
            orders: RateLimitPolicy::new(0.01, 2),
            ..RateLimitsConfig::default()
        };
        let guard = RateLimitGuard {
            limiter: RateLimiter::new(store, LimitClass::Orders, Arc::new(RwLock::new(policies))),
            server: server_config(Duration::from_secs(30)),
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router(calls.clone()).route_layer(from_fn_with_state(guard, rate_limit));

        let first = router.clone().oneshot(order_request(None, "{}")).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(first.headers()[RATE_LIMIT_LIMIT_HEADER], "2");
        assert_eq!(first.headers()[RATE_LIMIT_REMAINING_HEADER], "1");

        router.clone().oneshot(order_request(None, "{}")).await.unwrap();
        let denied = router.oneshot(order_request(None, "{}")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()[RATE_LIMIT_REMAINING_HEADER], "0");
        let retry_after: i64 = denied.headers()[axum::http::header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);
        assert_eq!(json(denied).await["error"]["code"], "RATE_LIMITED");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_buckets_by_address_not_user_header() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let policies = RateLimitsConfig {
            orders: RateLimitPolicy::new(0.01, 1),
            ..RateLimitsConfig::default()
        };
        let guard = RateLimitGuard {
            limiter: RateLimiter::new(store, LimitClass::Orders, Arc::new(RwLock::new(policies))),
            server: server_config(Duration::from_secs(30)),
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router(calls.clone()).route_layer(from_fn_with_state(guard, rate_limit));
        let addr: SocketAddr = "10.0.0.9:40000".parse().unwrap();

        let mut admitted = 0;
        for _ in 0..20 {
            let mut request = order_request(None, "{}");
            request
                .headers_mut()
                .insert(USER_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
            request.extensions_mut().insert(ConnectInfo(addr));
            if router.clone().oneshot(request).await.unwrap().status() == StatusCode::CREATED {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);

        // Another address has its own bucket.
        let mut other = order_request(None, "{}");
        other
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.0.0.10:40000".parse().unwrap()));
        assert_eq!(router.oneshot(other).await.unwrap().status(), StatusCode::CREATED);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_slow_handler() {
        let finished = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/slow",
                post({
                    let finished = finished.clone();
                    move || async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        StatusCode::OK
                    }
                }),
            )
            .layer(from_fn_with_state(server_config(Duration::from_secs(5)), deadline));

        let response = router
            .oneshot(HttpRequest::post("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json(response).await["error"]["code"], "REQUEST_TIMEOUT");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}

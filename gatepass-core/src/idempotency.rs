//! Deduplication of retried POST requests.
//!
//! A client attaches an opaque token to a request. The first request for a
//! given (actor, path, token) runs; its response, unless it is a server
//! error, is stored and replayed for every retry carrying the same token and
//! the same request body. A retry with a different body is refused.
//!
//! Concurrent duplicates are serialized with a TTL-bounded lock in the shared
//! store: the loser polls for the winner's stored response. If the store is
//! unreachable the request runs once without deduplication.

use crate::config::IdempotencyConfig;
use crate::coordination::{KeyValueStore, StoreError};
use bytes::Bytes;
use gatepass_sdk::objects::{ENVELOPE_REQUEST_ID_FIELD, ENVELOPE_TIMESTAMP_FIELD};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

const FIELD_REQUEST_HASH: &str = "request_hash";
const FIELD_STATUS: &str = "status";
const FIELD_CONTENT_TYPE: &str = "content_type";
const FIELD_BODY: &str = "body";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyError {
    #[error("idempotency key was already used for a different request")]
    KeyReused,
    #[error("a request with this idempotency key is still in progress")]
    InProgress,
}

/// Who sent a request, where, and with which token.
///
/// `actor` is the authenticated user id when there is one, otherwise the
/// caller's network address.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyScope<'a> {
    pub actor: &'a str,
    pub path: &'a str,
    pub token: &'a str,
}

impl IdempotencyScope<'_> {
    pub fn storage_key(&self) -> String {
        let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
        ctx.update(self.actor.as_bytes());
        ctx.update(b"\0");
        ctx.update(self.path.as_bytes());
        ctx.update(b"\0");
        ctx.update(self.token.as_bytes());
        format!("idempotency:{}", hex::encode(ctx.finish()))
    }
}

/// SHA-256 over method, path and body, hex encoded.
pub fn request_fingerprint(method: &str, path: &str, body: &[u8]) -> String {
    let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
    ctx.update(method.as_bytes());
    ctx.update(b"\n");
    ctx.update(path.as_bytes());
    ctx.update(b"\n");
    ctx.update(body);
    hex::encode(ctx.finish())
}

/// A response reduced to what is needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    fn into_fields(self, fingerprint: &str) -> Vec<(String, Vec<u8>)> {
        let mut fields = vec![
            (FIELD_REQUEST_HASH.to_string(), fingerprint.as_bytes().to_vec()),
            (FIELD_STATUS.to_string(), self.status.to_string().into_bytes()),
            (FIELD_BODY.to_string(), self.body.to_vec()),
        ];
        if let Some(content_type) = self.content_type {
            fields.push((FIELD_CONTENT_TYPE.to_string(), content_type.into_bytes()));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The handler ran for this request.
    Fresh(CapturedResponse),
    /// A stored response from an earlier request with the same token.
    Replayed(CapturedResponse),
}

impl Execution {
    pub fn is_replay(&self) -> bool {
        matches!(self, Execution::Replayed(_))
    }

    pub fn response(&self) -> &CapturedResponse {
        match self {
            Execution::Fresh(r) | Execution::Replayed(r) => r,
        }
    }

    pub fn into_response(self) -> CapturedResponse {
        match self {
            Execution::Fresh(r) | Execution::Replayed(r) => r,
        }
    }
}

enum Lookup {
    Miss,
    Hit(CapturedResponse),
    Mismatch,
}

#[derive(Clone)]
pub struct IdempotencyCoordinator {
    store: Arc<dyn KeyValueStore>,
    config: Arc<RwLock<IdempotencyConfig>>,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn KeyValueStore>, config: Arc<RwLock<IdempotencyConfig>>) -> Self {
        Self { store, config }
    }

    /// Run `handler` at most once for `scope`, replaying its stored
    /// response for matching retries.
    pub async fn execute<F, Fut>(
        &self,
        scope: IdempotencyScope<'_>,
        fingerprint: &str,
        handler: F,
    ) -> Result<Execution, IdempotencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CapturedResponse>,
    {
        let config = *self.config.read().await;
        let key = scope.storage_key();

        match self.lookup(&key, fingerprint).await {
            Ok(Lookup::Hit(stored)) => {
                debug!(path = scope.path, "Replaying stored response");
                return Ok(Execution::Replayed(refresh_envelope(stored)));
            }
            Ok(Lookup::Mismatch) => return Err(IdempotencyError::KeyReused),
            Ok(Lookup::Miss) => {}
            Err(e) => {
                warn!(path = scope.path, error = %e, "Idempotency store unavailable, executing without deduplication");
                return Ok(Execution::Fresh(handler().await));
            }
        }

        let lock_key = format!("{key}:lock");
        let owner = Uuid::new_v4().to_string();
        match self.store.try_lock(&lock_key, &owner, config.lock_ttl).await {
            Ok(true) => {
                let guard = LockGuard::new(Arc::clone(&self.store), lock_key, owner);
                // The previous holder may have stored its response between
                // our lookup and our lock.
                match self.lookup(&key, fingerprint).await {
                    Ok(Lookup::Hit(stored)) => {
                        guard.release().await;
                        return Ok(Execution::Replayed(refresh_envelope(stored)));
                    }
                    Ok(Lookup::Mismatch) => {
                        guard.release().await;
                        return Err(IdempotencyError::KeyReused);
                    }
                    Ok(Lookup::Miss) | Err(_) => {}
                }

                let response = handler().await;
                if !response.is_server_error() {
                    let fields = response.clone().into_fields(fingerprint);
                    if let Err(e) = self.store.write_record(&key, fields, config.record_ttl).await {
                        warn!(path = scope.path, error = %e, "Failed to store idempotent response");
                    }
                }
                guard.release().await;
                Ok(Execution::Fresh(response))
            }
            Ok(false) => self.wait_for_completion(&key, fingerprint, config).await,
            Err(e) => {
                warn!(path = scope.path, error = %e, "Idempotency lock unavailable, executing without deduplication");
                Ok(Execution::Fresh(handler().await))
            }
        }
    }

    async fn wait_for_completion(
        &self,
        key: &str,
        fingerprint: &str,
        config: IdempotencyConfig,
    ) -> Result<Execution, IdempotencyError> {
        let deadline = Instant::now() + config.poll_timeout;
        loop {
            tokio::time::sleep(config.poll_interval).await;
            match self.lookup(key, fingerprint).await {
                Ok(Lookup::Hit(stored)) => return Ok(Execution::Replayed(refresh_envelope(stored))),
                Ok(Lookup::Mismatch) => return Err(IdempotencyError::KeyReused),
                Ok(Lookup::Miss) => {}
                Err(e) => debug!(error = %e, "Idempotency poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(IdempotencyError::InProgress);
            }
        }
    }

    async fn lookup(&self, key: &str, fingerprint: &str) -> Result<Lookup, StoreError> {
        let Some(fields) = self.store.read_record(key).await? else {
            return Ok(Lookup::Miss);
        };
        let stored = decode_record(key, fields)?;
        if stored.0 == fingerprint {
            Ok(Lookup::Hit(stored.1))
        } else {
            Ok(Lookup::Mismatch)
        }
    }
}

fn decode_record(
    key: &str,
    mut fields: HashMap<String, Vec<u8>>,
) -> Result<(String, CapturedResponse), StoreError> {
    let malformed = |reason: &str| StoreError::Malformed {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let request_hash = fields
        .remove(FIELD_REQUEST_HASH)
        .and_then(|v| String::from_utf8(v).ok())
        .ok_or_else(|| malformed("missing request hash"))?;
    let status = fields
        .remove(FIELD_STATUS)
        .and_then(|v| String::from_utf8(v).ok())
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| malformed("missing status"))?;
    let body = fields
        .remove(FIELD_BODY)
        .ok_or_else(|| malformed("missing body"))?;
    let content_type = fields
        .remove(FIELD_CONTENT_TYPE)
        .and_then(|v| String::from_utf8(v).ok());
    Ok((
        request_hash,
        CapturedResponse {
            status,
            content_type,
            body: Bytes::from(body),
        },
    ))
}

/// Give a replayed JSON envelope a fresh `request_id` and `timestamp`.
/// Anything else is returned untouched.
fn refresh_envelope(response: CapturedResponse) -> CapturedResponse {
    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return response;
    }
    let Ok(serde_json::Value::Object(mut map)) =
        serde_json::from_slice::<serde_json::Value>(&response.body)
    else {
        return response;
    };
    let mut touched = false;
    if let Some(request_id) = map.get_mut(ENVELOPE_REQUEST_ID_FIELD) {
        *request_id = serde_json::Value::String(Uuid::new_v4().to_string());
        touched = true;
    }
    if let Some(timestamp) = map.get_mut(ENVELOPE_TIMESTAMP_FIELD) {
        *timestamp = serde_json::Value::from(time::OffsetDateTime::now_utc().unix_timestamp());
        touched = true;
    }
    if !touched {
        return response;
    }
    match serde_json::to_vec(&map) {
        Ok(body) => CapturedResponse {
            body: Bytes::from(body),
            ..response
        },
        Err(_) => response,
    }
}

/// Releases the idempotency lock. If the request future is dropped before
/// [`release`](Self::release), the release is spawned instead.
struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    key: String,
    owner: String,
    armed: bool,
}

impl LockGuard {
    fn new(store: Arc<dyn KeyValueStore>, key: String, owner: String) -> Self {
        Self {
            store,
            key,
            owner,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.store.unlock(&self.key, &self.owner).await {
            warn!(error = %e, "Failed to release idempotency lock");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        runtime.spawn(async move {
            if let Err(e) = store.unlock(&key, &owner).await {
                warn!(error = %e, "Failed to release abandoned idempotency lock");
            }
        });
    }
}

//! Custom Axum extractors for caller identity.
//!
//! Provides:
//! - `Actor`: the authenticated user forwarded by the upstream proxy in
//!   `X-User-Id` / `X-User-Role`.
//! - `ClientInfo`: the caller's network address and user agent.
//! - `AdminAuth`: an admin actor that also presented the admin secret in
//!   `Gatepass-Admin-Authorization`.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{Extensions, HeaderMap, header::USER_AGENT, request::Parts},
};
use gatepass_sdk::headers::{
    ADMIN_AUTH_HEADER, FORWARDED_FOR_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    Guest,
}

impl Role {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .ok_or(ApiError::Unauthorized("missing X-User-Id header"))?
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(ApiError::Unauthorized("invalid X-User-Id header"))?;
        let role = match headers.get(USER_ROLE_HEADER) {
            None => Role::Guest,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| Role::parse(v.trim()))
                .ok_or(ApiError::Unauthorized("invalid X-User-Role header"))?,
        };
        Ok(Self { user_id, role })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Scanning tickets is reserved to gate staff and admins.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        match self.role {
            Role::Admin | Role::Staff => Ok(()),
            Role::Guest => Err(ApiError::Forbidden("staff role required")),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers)
    }
}

/// Address of the caller. The first `X-Forwarded-For` hop is used only when
/// `trust_forwarded_for` is set.
pub fn client_addr(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Who an idempotency key belongs to: the authenticated user when there is
/// one, else the caller's address.
pub fn actor_key(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    match Actor::from_headers(headers) {
        Ok(actor) => format!("user:{}", actor.user_id),
        Err(_) => format!("addr:{}", client_addr(headers, extensions, trust_forwarded_for)),
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: String,
    pub user_agent: Option<String>,
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let trust = state.config.server.read().await.trust_forwarded_for;
        Ok(Self {
            addr: client_addr(&parts.headers, &parts.extensions, trust),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

/// An admin actor that presented the admin secret.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth(pub Actor);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_headers(&parts.headers)?;
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(ApiError::Unauthorized("missing Gatepass-Admin-Authorization header"))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("invalid Gatepass-Admin-Authorization header"))?
            .to_owned();

        let secret_hash = state.config.admin.read().await.secret_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verify_secret(&secret_hash, &secret))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !verified {
            tracing::warn!(user_id = %actor.user_id, "Rejected admin secret");
            return Err(ApiError::Unauthorized("invalid admin secret"));
        }
        if !actor.is_admin() {
            return Err(ApiError::Forbidden("admin role required"));
        }
        Ok(AdminAuth(actor))
    }
}

/// Check `candidate` against an argon2 PHC string.
pub fn verify_secret(secret_hash: &str, candidate: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    match PasswordHash::new(secret_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Admin secret hash is malformed");
            false
        }
    }
}

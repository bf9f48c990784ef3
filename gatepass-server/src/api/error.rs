//! Error responses shared by every API area.
//!
//! Storage and gateway error text is logged here and never sent to clients.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use gatepass_core::check_in::CheckInError;
use gatepass_core::idempotency::IdempotencyError;
use gatepass_core::orders::OrderError;
use gatepass_core::payments::{GatewayError, InitiationError};
use gatepass_core::ticket_generation::GenerationError;
use gatepass_sdk::codes::ApiErrorCode;
use gatepass_sdk::objects::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: i64 },
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error("request timed out")]
    RequestTimeout,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("order not found")]
    OrderNotFound,
    #[error("order is not paid")]
    OrderNotPaid,
    #[error("order cannot be paid in its current state")]
    OrderNotPayable,
    #[error("tickets were already generated for this order")]
    TicketsAlreadyGenerated,
    #[error("one or more categories do not exist")]
    CategoryNotFound,
    #[error("gate not found")]
    GateNotFound,
    #[error("payment gateway unavailable")]
    PaymentGateway(#[source] GatewayError),
    #[error("payment gateway response failed signature verification")]
    UntrustedGatewayResponse,
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ApiErrorCode {
        match self {
            ApiError::RateLimited { .. } => ApiErrorCode::RateLimited,
            ApiError::Idempotency(IdempotencyError::KeyReused) => ApiErrorCode::IdempotencyKeyReused,
            ApiError::Idempotency(IdempotencyError::InProgress) => {
                ApiErrorCode::IdempotencyInProgress
            }
            ApiError::RequestTimeout => ApiErrorCode::RequestTimeout,
            ApiError::Unauthorized(_) => ApiErrorCode::Unauthorized,
            ApiError::Forbidden(_) => ApiErrorCode::Forbidden,
            ApiError::InvalidRequest(_) => ApiErrorCode::InvalidRequest,
            ApiError::OrderNotFound => ApiErrorCode::OrderNotFound,
            ApiError::OrderNotPaid => ApiErrorCode::OrderNotPaid,
            ApiError::OrderNotPayable => ApiErrorCode::OrderNotPayable,
            ApiError::TicketsAlreadyGenerated => ApiErrorCode::TicketsAlreadyGenerated,
            ApiError::CategoryNotFound => ApiErrorCode::CategoryNotFound,
            ApiError::GateNotFound => ApiErrorCode::GateNotFound,
            ApiError::PaymentGateway(_) | ApiError::UntrustedGatewayResponse => {
                ApiErrorCode::PaymentGatewayUnavailable
            }
            ApiError::Database(_) | ApiError::Internal(_) => ApiErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Idempotency(IdempotencyError::KeyReused) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Idempotency(IdempotencyError::InProgress) => StatusCode::CONFLICT,
            ApiError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::OrderNotFound | ApiError::CategoryNotFound | ApiError::GateNotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::OrderNotPaid
            | ApiError::OrderNotPayable
            | ApiError::TicketsAlreadyGenerated => StatusCode::CONFLICT,
            ApiError::PaymentGateway(_) | ApiError::UntrustedGatewayResponse => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Database(e) => tracing::error!(error = %e, "API database error"),
            ApiError::Internal(e) => tracing::error!(error = %e, "API internal error"),
            ApiError::PaymentGateway(e) => tracing::warn!(error = %e, "Payment gateway call failed"),
            _ => {}
        }

        let status = self.status();
        let mut response = (
            status,
            Json(Envelope::error(self.code(), self.to_string())),
        )
            .into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<CheckInError> for ApiError {
    fn from(e: CheckInError) -> Self {
        match e {
            CheckInError::Database(e) => ApiError::Database(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidRequest(message) => ApiError::InvalidRequest(message),
            GenerationError::OrderNotFound(_) => ApiError::OrderNotFound,
            GenerationError::OrderNotPaid { .. } => ApiError::OrderNotPaid,
            GenerationError::TicketsAlreadyGenerated(_) => ApiError::TicketsAlreadyGenerated,
            GenerationError::CategoryNotFound => ApiError::CategoryNotFound,
            GenerationError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidRequest(message) => ApiError::InvalidRequest(message),
            OrderError::CategoryNotFound => ApiError::CategoryNotFound,
            OrderError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<InitiationError> for ApiError {
    fn from(e: InitiationError) -> Self {
        match e {
            InitiationError::OrderNotFound(_) => ApiError::OrderNotFound,
            InitiationError::OrderNotPayable { .. } => ApiError::OrderNotPayable,
            InitiationError::Gateway(e) => ApiError::PaymentGateway(e),
            InitiationError::Database(e) => ApiError::Database(e),
        }
    }
}

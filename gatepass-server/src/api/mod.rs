//! HTTP API.
//!
//! Every response except the payment webhook acknowledgement is wrapped in
//! an [`Envelope`](gatepass_sdk::objects::Envelope). Identity comes from
//! the upstream authenticating proxy (see [`extractors`]).
//!
//! # Areas
//!
//! - [`check_in`] – ticket scanning by gate staff
//! - [`orders`]   – guest orders and payment sessions
//! - [`admin`]    – ticket generation, gate staff, payment resync
//! - [`webhook`]  – payment gateway notifications

pub mod admin;
pub mod check_in;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod orders;
pub mod webhook;

use axum::extract::{FromRequest, FromRequestParts};

use crate::api::error::ApiError;

/// `axum::Json` with rejections rendered as an `INVALID_REQUEST` envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` with rejections rendered as an `INVALID_REQUEST` envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

//! Payment gateway notification signatures.
//!
//! The gateway signs every notification as
//!
//! ```text
//! signature_key = hex(SHA-512("{order_id}{status_code}{gross_amount}{server_key}"))
//! ```
//!
//! There is no timestamp in the scheme, so replayed notifications verify
//! successfully; the reconciler is responsible for applying them idempotently.

use crate::objects::webhook::GatewayNotification;

/// Errors produced by signature verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
}

/// Compute the signature the gateway is expected to send, as lower-case hex.
pub fn sign_notification(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &[u8],
) -> String {
    hex::encode(digest(order_id, status_code, gross_amount, server_key))
}

/// Verify the `signature_key` carried by a notification.
pub fn verify_notification(
    notification: &GatewayNotification,
    server_key: &[u8],
) -> Result<(), SignatureError> {
    let provided =
        hex::decode(notification.signature_key.trim()).map_err(|_| SignatureError::InvalidHex)?;
    let expected = digest(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    if constant_time_eq::constant_time_eq(expected.as_ref(), &provided) {
        Ok(())
    } else {
        Err(SignatureError::SignatureMismatch)
    }
}

fn digest(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &[u8],
) -> ring::digest::Digest {
    let mut ctx = ring::digest::Context::new(&ring::digest::SHA512);
    ctx.update(order_id.as_bytes());
    ctx.update(status_code.as_bytes());
    ctx.update(gross_amount.as_bytes());
    ctx.update(server_key);
    ctx.finish()
}

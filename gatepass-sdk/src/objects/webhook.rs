//! Payment gateway notification payload and acknowledgement.

use serde::{Deserialize, Serialize};

/// Asynchronous notification pushed by the payment gateway.
///
/// `order_id` is the gateway-side reference we assigned at order creation,
/// not our internal order UUID. `gross_amount` is kept as the exact string
/// the gateway sent because it is an input to the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

/// Body returned to the gateway for every notification, whatever happened
/// internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

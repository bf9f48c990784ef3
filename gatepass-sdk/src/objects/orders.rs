//! Order, payment and ticket-generation request/response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PaymentStatus, TicketStatus};

/// One line of a guest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub category_id: Uuid,
    pub quantity: u32,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub gateway_reference: String,
    pub created_at: i64,
}

/// Returned by `POST /api/orders/{order_id}/payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSessionResponse {
    pub order_id: Uuid,
    pub gateway_reference: String,
    pub token: String,
    pub redirect_url: String,
}

/// Returned by `POST /api/admin/orders/{order_id}/payment/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSyncResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    /// Whether the gateway status moved the order to a new state.
    pub changed: bool,
}

/// Body of `POST /api/admin/orders/{order_id}/tickets`.
///
/// `category_ids[i]` is issued `quantities[i]` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTicketsRequest {
    pub category_ids: Vec<Uuid>,
    pub quantities: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub category_id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
}

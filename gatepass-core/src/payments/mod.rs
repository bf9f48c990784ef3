//! Payment gateway integration: session creation for guests and
//! reconciliation of asynchronous gateway notifications.

pub mod gateway;
pub mod initiation;
pub mod reconciler;

pub use gateway::{GatewayError, HttpPaymentGateway, PaymentGateway, PaymentSession, TransactionRequest};
pub use initiation::{InitiationError, PaymentInitiator};
pub use reconciler::{map_gateway_status, ReconcileOutcome, WebhookReconciler};

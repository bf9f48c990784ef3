//! Event channel factories and handles.

use super::types::OrderPaid;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type OrderPaidSender = mpsc::Sender<OrderPaid>;
pub type OrderPaidReceiver = mpsc::Receiver<OrderPaid>;

/// Create a new OrderPaid channel.
///
/// Multiple senders can be cloned from the returned sender.
pub fn order_paid_channel() -> (OrderPaidSender, OrderPaidReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

use uuid::Uuid;

/// An order has just moved into `paid`.
///
/// Emitted once per applied transition. Receivers must still tolerate
/// duplicates, e.g. after an admin re-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPaid {
    pub order_id: Uuid,
}

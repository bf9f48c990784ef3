//! In-memory stand-ins for the database, the coordination store and the
//! payment gateway.
//!
//! `MemoryDatabase` emulates the two storage guarantees the core relies on:
//! the unique constraint on a ticket's check-in (checked and written under
//! one lock) and the order row lock held for a whole generation
//! transaction (a per-order async mutex).

use crate::check_in::{CheckInRepository, Redemption};
use crate::config::PaymentGatewayConfig;
use crate::coordination::{BucketState, KeyValueStore, StoreError};
use crate::entities::categories::Category;
use crate::entities::check_ins::{CheckInRecord, NewCheckIn};
use crate::entities::gates::Gate;
use crate::entities::order_lines::OrderLine;
use crate::entities::orders::{NewOrder, OrderRecord};
use crate::entities::tickets::{NewTicket, Ticket, TicketDetail};
use crate::entities::{CheckInStatus, PaymentStatus, TicketStatus};
use crate::gate::GateRepository;
use crate::orders::OrderLedger;
use crate::payments::gateway::{GatewayError, PaymentGateway, PaymentSession, TransactionRequest};
use crate::ticket_generation::{LedgerTransaction, TicketLedger};
use crate::utils::clock;
use async_trait::async_trait;
use gatepass_sdk::objects::webhook::GatewayNotification;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::PrimitiveDateTime;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    tickets: HashMap<Uuid, Ticket>,
    check_ins: Vec<CheckInRecord>,
    gates: HashMap<Uuid, Gate>,
    gate_staff: HashSet<(Uuid, Uuid)>,
    orders: HashMap<Uuid, OrderRecord>,
    order_lines: Vec<OrderLine>,
}

impl Tables {
    fn ticket_detail(&self, ticket: &Ticket) -> Option<TicketDetail> {
        let category = self.categories.get(&ticket.category_id)?;
        Some(TicketDetail {
            id: ticket.id,
            order_id: ticket.order_id,
            category_id: ticket.category_id,
            qr_code: ticket.qr_code.clone(),
            status: ticket.status,
            checked_in_at: ticket.checked_in_at,
            category_name: category.name.clone(),
            category_is_vip: category.is_vip,
        })
    }

    fn successful_check_in(&self, ticket_id: Uuid) -> Option<&CheckInRecord> {
        self.check_ins
            .iter()
            .find(|c| c.order_item_id == ticket_id && c.status == CheckInStatus::Success)
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    order_locks: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
    blind_lookups: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_category(&self, name: &str, is_vip: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().categories.insert(
            id,
            Category {
                id,
                name: name.to_string(),
                price: Decimal::from(100),
                is_vip,
            },
        );
        id
    }

    pub fn add_ticket(&self, category_id: Uuid, qr_code: &str, status: TicketStatus) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().tickets.insert(
            id,
            Ticket {
                id,
                order_id: Uuid::new_v4(),
                category_id,
                qr_code: qr_code.to_string(),
                status,
                checked_in_at: None,
                created_at: clock::utc_now(),
            },
        );
        id
    }

    pub fn add_gate(&self, code: &str, is_vip: bool, is_active: bool, capacity: Option<i32>) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().gates.insert(
            id,
            Gate {
                id,
                code: code.to_string(),
                name: format!("Gate {code}"),
                is_vip,
                is_active,
                capacity,
            },
        );
        id
    }

    pub fn assign_staff(&self, gate_id: Uuid, staff_id: Uuid) {
        self.tables().gate_staff.insert((gate_id, staff_id));
    }

    /// A successful check-in at `gate_id` for an unrelated ticket.
    pub fn add_past_check_in(&self, gate_id: Uuid, at: PrimitiveDateTime) {
        self.tables().check_ins.push(CheckInRecord {
            id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            gate_id: Some(gate_id),
            staff_id: Uuid::new_v4(),
            status: CheckInStatus::Success,
            location: None,
            client_ip: None,
            user_agent: None,
            checked_in_at: at,
        });
    }

    /// Commit a check-in for `ticket_id` that the next fast-path lookup
    /// does not see, as if it landed right after that lookup.
    pub fn insert_racing_check_in(&self, ticket_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().check_ins.push(CheckInRecord {
            id,
            order_item_id: ticket_id,
            gate_id: None,
            staff_id: Uuid::new_v4(),
            status: CheckInStatus::Success,
            location: None,
            client_ip: None,
            user_agent: None,
            checked_in_at: clock::utc_now(),
        });
        self.blind_lookups.fetch_add(1, Ordering::SeqCst);
        id
    }

    pub fn check_in_count(&self) -> usize {
        self.tables()
            .check_ins
            .iter()
            .filter(|c| c.status == CheckInStatus::Success)
            .count()
    }

    pub fn add_order(&self, status: PaymentStatus) -> Uuid {
        self.add_order_with_reference(status, 100).0
    }

    pub fn add_order_with_reference(&self, status: PaymentStatus, total: i64) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let reference = format!("GP-{}", id.simple());
        let now = clock::utc_now();
        self.tables().orders.insert(
            id,
            OrderRecord {
                id,
                user_id: Uuid::new_v4(),
                gateway_reference: reference.clone(),
                total_amount: Decimal::from(total),
                payment_status: status,
                created_at: now,
                updated_at: now,
            },
        );
        (id, reference)
    }

    pub fn add_order_line(&self, order_id: Uuid, category_id: Uuid, quantity: i32) {
        self.tables().order_lines.push(OrderLine {
            order_id,
            category_id,
            quantity,
            unit_price: Decimal::from(100),
        });
    }

    pub fn order_owner(&self, order_id: Uuid) -> Uuid {
        self.tables().orders[&order_id].user_id
    }

    pub fn payment_status(&self, order_id: Uuid) -> PaymentStatus {
        self.tables().orders[&order_id].payment_status
    }

    pub fn ticket_count(&self, order_id: Uuid) -> usize {
        self.tables()
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .count()
    }

    fn order_lock(&self, order_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.order_locks.lock().unwrap();
        Arc::clone(locks.entry(order_id).or_default())
    }
}

#[async_trait]
impl CheckInRepository for MemoryDatabase {
    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetail>, sqlx::Error> {
        tokio::task::yield_now().await;
        let tables = self.tables();
        Ok(tables
            .tickets
            .values()
            .find(|t| t.qr_code == qr_code)
            .and_then(|t| tables.ticket_detail(t)))
    }

    async fn find_ticket_by_id(&self, ticket_id: Uuid) -> Result<Option<TicketDetail>, sqlx::Error> {
        let tables = self.tables();
        Ok(tables
            .tickets
            .get(&ticket_id)
            .and_then(|t| tables.ticket_detail(t)))
    }

    async fn find_check_in_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<CheckInRecord>, sqlx::Error> {
        tokio::task::yield_now().await;
        let blind = self
            .blind_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if blind {
            return Ok(None);
        }
        Ok(self.tables().successful_check_in(ticket_id).cloned())
    }

    async fn redeem(&self, check_in: NewCheckIn) -> Result<Redemption, sqlx::Error> {
        tokio::task::yield_now().await;
        let mut tables = self.tables();
        if tables.successful_check_in(check_in.order_item_id).is_some() {
            return Ok(Redemption::AlreadyRedeemed);
        }
        let Some(ticket) = tables.tickets.get_mut(&check_in.order_item_id) else {
            return Ok(Redemption::NotRedeemable);
        };
        if ticket.status != TicketStatus::Paid {
            return Ok(Redemption::NotRedeemable);
        }
        ticket.status = TicketStatus::CheckedIn;
        ticket.checked_in_at = Some(check_in.checked_in_at);
        let record = CheckInRecord {
            id: Uuid::now_v7(),
            order_item_id: check_in.order_item_id,
            gate_id: check_in.gate_id,
            staff_id: check_in.staff_id,
            status: CheckInStatus::Success,
            location: check_in.location,
            client_ip: check_in.client_ip,
            user_agent: check_in.user_agent,
            checked_in_at: check_in.checked_in_at,
        };
        tables.check_ins.push(record.clone());
        Ok(Redemption::Recorded(record))
    }
}

#[async_trait]
impl GateRepository for MemoryDatabase {
    async fn find_gate(&self, gate_id: Uuid) -> Result<Option<Gate>, sqlx::Error> {
        Ok(self.tables().gates.get(&gate_id).cloned())
    }

    async fn is_staff_assigned(&self, gate_id: Uuid, staff_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.tables().gate_staff.contains(&(gate_id, staff_id)))
    }

    async fn count_successful_check_ins_since(
        &self,
        gate_id: Uuid,
        since: PrimitiveDateTime,
    ) -> Result<i64, sqlx::Error> {
        let count = self
            .tables()
            .check_ins
            .iter()
            .filter(|c| {
                c.gate_id == Some(gate_id)
                    && c.status == CheckInStatus::Success
                    && c.checked_in_at >= since
            })
            .count();
        Ok(count as i64)
    }
}

struct MemoryLedgerTransaction {
    db: MemoryDatabase,
    _order_lock: Option<OwnedMutexGuard<()>>,
    pending: Vec<Ticket>,
}

#[async_trait]
impl TicketLedger for MemoryDatabase {
    async fn begin_generation(&self) -> Result<Box<dyn LedgerTransaction>, sqlx::Error> {
        Ok(Box::new(MemoryLedgerTransaction {
            db: self.clone(),
            _order_lock: None,
            pending: Vec::new(),
        }))
    }
}

#[async_trait]
impl LedgerTransaction for MemoryLedgerTransaction {
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        let guard = self.db.order_lock(order_id).lock_owned().await;
        self._order_lock = Some(guard);
        tokio::task::yield_now().await;
        Ok(self.db.tables().orders.get(&order_id).cloned())
    }

    async fn count_tickets(&mut self, order_id: Uuid) -> Result<i64, sqlx::Error> {
        Ok(self.db.ticket_count(order_id) as i64)
    }

    async fn count_categories(&mut self, category_ids: &[Uuid]) -> Result<i64, sqlx::Error> {
        let tables = self.db.tables();
        Ok(category_ids
            .iter()
            .filter(|id| tables.categories.contains_key(id))
            .count() as i64)
    }

    async fn insert_tickets(&mut self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>, sqlx::Error> {
        let now = clock::utc_now();
        let inserted: Vec<Ticket> = tickets
            .into_iter()
            .map(|t| Ticket {
                id: Uuid::now_v7(),
                order_id: t.order_id,
                category_id: t.category_id,
                qr_code: t.qr_code,
                status: TicketStatus::Paid,
                checked_in_at: None,
                created_at: now,
            })
            .collect();
        self.pending.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        let mut tables = self.db.tables();
        for ticket in self.pending {
            tables.tickets.insert(ticket.id, ticket);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderLedger for MemoryDatabase {
    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        Ok(self.tables().orders.get(&order_id).cloned())
    }

    async fn find_order_by_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        Ok(self
            .tables()
            .orders
            .values()
            .find(|o| o.gateway_reference == gateway_reference)
            .cloned())
    }

    async fn transition_payment_status(
        &self,
        order_id: Uuid,
        to: PaymentStatus,
        from: &[PaymentStatus],
    ) -> Result<bool, sqlx::Error> {
        tokio::task::yield_now().await;
        let mut tables = self.tables();
        match tables.orders.get_mut(&order_id) {
            Some(order) if from.contains(&order.payment_status) => {
                order.payment_status = to;
                order.updated_at = clock::utc_now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, sqlx::Error> {
        Ok(self
            .tables()
            .order_lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn paid_orders_without_tickets(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        let tables = self.tables();
        Ok(tables
            .orders
            .values()
            .filter(|o| o.payment_status == PaymentStatus::Paid)
            .filter(|o| !tables.tickets.values().any(|t| t.order_id == o.id))
            .map(|o| o.id)
            .collect())
    }

    async fn categories(&self, category_ids: &[Uuid]) -> Result<Vec<Category>, sqlx::Error> {
        let tables = self.tables();
        Ok(category_ids
            .iter()
            .filter_map(|id| tables.categories.get(id).cloned())
            .collect())
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        lines: Vec<OrderLine>,
    ) -> Result<OrderRecord, sqlx::Error> {
        let now = clock::utc_now();
        let record = OrderRecord {
            id: order.id,
            user_id: order.user_id,
            gateway_reference: order.gateway_reference,
            total_amount: order.total_amount,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
        };
        let mut tables = self.tables();
        tables.orders.insert(record.id, record.clone());
        tables.order_lines.extend(lines);
        Ok(record)
    }
}

/// A coordination store that is always down.
pub(crate) struct BrokenStore;

fn offline(key: &str) -> StoreError {
    StoreError::Malformed {
        key: key.to_string(),
        reason: "store offline".to_string(),
    }
}

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn try_lock(&self, key: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
        Err(offline(key))
    }

    async fn unlock(&self, key: &str, _: &str) -> Result<bool, StoreError> {
        Err(offline(key))
    }

    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, StoreError> {
        Err(offline(key))
    }

    async fn write_record(
        &self,
        key: &str,
        _: Vec<(String, Vec<u8>)>,
        _: Duration,
    ) -> Result<(), StoreError> {
        Err(offline(key))
    }

    async fn take_token(
        &self,
        key: &str,
        _: f64,
        _: u32,
        _: i64,
        _: Duration,
    ) -> Result<BucketState, StoreError> {
        Err(offline(key))
    }
}

#[derive(Default)]
pub(crate) struct StubGateway {
    created: Mutex<Vec<String>>,
    status: Mutex<Option<GatewayNotification>>,
}

impl StubGateway {
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn set_status(&self, notification: GatewayNotification) {
        *self.status.lock().unwrap() = Some(notification);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_transaction(
        &self,
        _config: &PaymentGatewayConfig,
        request: &TransactionRequest,
    ) -> Result<PaymentSession, GatewayError> {
        self.created
            .lock()
            .unwrap()
            .push(request.gateway_reference.clone());
        Ok(PaymentSession {
            token: format!("token-{}", request.gateway_reference),
            redirect_url: format!("https://pay.example/{}", request.gateway_reference),
        })
    }

    async fn transaction_status(
        &self,
        _config: &PaymentGatewayConfig,
        _gateway_reference: &str,
    ) -> Result<GatewayNotification, GatewayError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or(GatewayError::Rejected {
                status: 404,
                body: "Transaction doesn't exist.".to_string(),
            })
    }
}

pub(crate) fn gateway_config_with_key(key: &[u8]) -> PaymentGatewayConfig {
    PaymentGatewayConfig {
        server_key: key.to_vec().into_boxed_slice(),
        snap_base_url: url::Url::parse("https://app.sandbox.example/").unwrap(),
        api_base_url: url::Url::parse("https://api.sandbox.example/").unwrap(),
    }
}

pub(crate) fn gateway_config() -> PaymentGatewayConfig {
    gateway_config_with_key(b"server-key")
}

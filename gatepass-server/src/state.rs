//! Application state shared across all request handlers.

use gatepass_core::check_in::CheckInService;
use gatepass_core::config::{LimitClass, SharedConfig};
use gatepass_core::coordination::KeyValueStore;
use gatepass_core::events::OrderPaidSender;
use gatepass_core::framework::DatabaseProcessor;
use gatepass_core::gate::GateAdmission;
use gatepass_core::idempotency::IdempotencyCoordinator;
use gatepass_core::orders::OrderService;
use gatepass_core::payments::{PaymentGateway, PaymentInitiator, WebhookReconciler};
use gatepass_core::rate_limit::RateLimiter;
use gatepass_core::ticket_generation::TicketGenerator;
use std::sync::Arc;

use crate::api::middleware::{IdempotencyGuard, RateLimitGuard};

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseProcessor,
    /// Runtime configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub idempotency: IdempotencyCoordinator,
    pub check_ins: CheckInService,
    pub gates: GateAdmission,
    pub tickets: TicketGenerator,
    pub orders: OrderService,
    pub payments: PaymentInitiator,
    pub reconciler: WebhookReconciler,
}

impl AppState {
    pub fn new(
        db: DatabaseProcessor,
        config: SharedConfig,
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn PaymentGateway>,
        order_paid_tx: OrderPaidSender,
    ) -> Self {
        let repo = Arc::new(db.clone());
        let check_ins = CheckInService::new(repo.clone());
        Self {
            idempotency: IdempotencyCoordinator::new(store.clone(), config.idempotency.clone()),
            gates: GateAdmission::new(repo.clone(), check_ins.clone()),
            check_ins,
            tickets: TicketGenerator::new(repo.clone()),
            orders: OrderService::new(repo.clone()),
            payments: PaymentInitiator::new(repo.clone(), gateway.clone()),
            reconciler: WebhookReconciler::new(repo, order_paid_tx),
            db,
            config,
            store,
            gateway,
        }
    }

    pub fn rate_limit_guard(&self, class: LimitClass) -> RateLimitGuard {
        RateLimitGuard {
            limiter: RateLimiter::new(self.store.clone(), class, self.config.rate_limits.clone()),
            server: self.config.server.clone(),
        }
    }

    pub fn idempotency_guard(&self, token_headers: &'static [&'static str]) -> IdempotencyGuard {
        IdempotencyGuard {
            coordinator: self.idempotency.clone(),
            server: self.config.server.clone(),
            token_headers,
        }
    }
}

//! Gate admission control.
//!
//! Gate rules are checked in a fixed order before the scan is handed to the
//! check-in state machine with the gate attached. Capacity is a best-effort
//! count of today's successful check-ins; concurrent scans at a nearly full
//! gate can overshoot it by the number in flight.

use crate::check_in::{CheckInCommand, CheckInError, CheckInOutcome, CheckInService};
use crate::entities::check_ins::CountGateCheckInsSince;
use crate::entities::gates::{Gate, GetGateById, IsStaffAssigned};
use crate::framework::DatabaseProcessor;
use crate::utils::clock;
use async_trait::async_trait;
use gatepass_sdk::codes::CheckInErrorCode;
use kanau::processor::Processor;
use std::sync::Arc;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait GateRepository: Send + Sync {
    async fn find_gate(&self, gate_id: Uuid) -> Result<Option<Gate>, sqlx::Error>;

    async fn is_staff_assigned(&self, gate_id: Uuid, staff_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn count_successful_check_ins_since(
        &self,
        gate_id: Uuid,
        since: PrimitiveDateTime,
    ) -> Result<i64, sqlx::Error>;
}

#[async_trait]
impl GateRepository for DatabaseProcessor {
    async fn find_gate(&self, gate_id: Uuid) -> Result<Option<Gate>, sqlx::Error> {
        self.process(GetGateById { gate_id }).await
    }

    async fn is_staff_assigned(&self, gate_id: Uuid, staff_id: Uuid) -> Result<bool, sqlx::Error> {
        self.process(IsStaffAssigned { gate_id, staff_id }).await
    }

    async fn count_successful_check_ins_since(
        &self,
        gate_id: Uuid,
        since: PrimitiveDateTime,
    ) -> Result<i64, sqlx::Error> {
        self.process(CountGateCheckInsSince { gate_id, since }).await
    }
}

#[derive(Debug, Clone)]
pub struct GateCheckInCommand {
    pub gate_id: Uuid,
    pub qr_code: String,
    pub staff_id: Uuid,
    /// Admins may scan at any gate.
    pub is_admin: bool,
    pub location: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct GateAdmission {
    gates: Arc<dyn GateRepository>,
    check_in: CheckInService,
}

impl GateAdmission {
    pub fn new(gates: Arc<dyn GateRepository>, check_in: CheckInService) -> Self {
        Self { gates, check_in }
    }

    /// `venue_offset` decides where "today" starts for the capacity count.
    pub async fn check_in(
        &self,
        cmd: GateCheckInCommand,
        venue_offset: UtcOffset,
    ) -> Result<CheckInOutcome, CheckInError> {
        self.check_in_at(cmd, venue_offset, OffsetDateTime::now_utc())
            .await
    }

    pub async fn check_in_at(
        &self,
        cmd: GateCheckInCommand,
        venue_offset: UtcOffset,
        now: OffsetDateTime,
    ) -> Result<CheckInOutcome, CheckInError> {
        if let Some(code) = self.admission_error(&cmd, venue_offset, now).await? {
            debug!(gate_id = %cmd.gate_id, staff_id = %cmd.staff_id, code = %code, "Gate refused scan");
            return Ok(CheckInOutcome::rejected(code));
        }
        self.check_in
            .check_in(CheckInCommand {
                qr_code: cmd.qr_code,
                staff_id: cmd.staff_id,
                gate_id: Some(cmd.gate_id),
                location: cmd.location,
                client_ip: cmd.client_ip,
                user_agent: cmd.user_agent,
            })
            .await
    }

    async fn admission_error(
        &self,
        cmd: &GateCheckInCommand,
        venue_offset: UtcOffset,
        now: OffsetDateTime,
    ) -> Result<Option<CheckInErrorCode>, CheckInError> {
        let Some(gate) = self.gates.find_gate(cmd.gate_id).await? else {
            return Ok(Some(CheckInErrorCode::GateNotFound));
        };
        if !gate.is_active {
            return Ok(Some(CheckInErrorCode::GateInactive));
        }
        if !cmd.is_admin && !self.gates.is_staff_assigned(gate.id, cmd.staff_id).await? {
            return Ok(Some(CheckInErrorCode::GateStaffNotAssigned));
        }
        if let Some(capacity) = gate.capacity_limit() {
            let since = clock::start_of_local_day(now, venue_offset);
            let admitted = self
                .gates
                .count_successful_check_ins_since(gate.id, since)
                .await?;
            if admitted >= capacity {
                return Ok(Some(CheckInErrorCode::GateCapacityExceeded));
            }
        }
        if !gate.is_vip {
            // An unknown QR code is reported by the check-in itself.
            let ticket = self
                .check_in
                .repository()
                .find_ticket_by_qr(&cmd.qr_code)
                .await?;
            if ticket.is_some_and(|t| t.category_is_vip) {
                return Ok(Some(CheckInErrorCode::VipGateRequired));
            }
        }
        Ok(None)
    }
}

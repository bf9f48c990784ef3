//! Ticket redemption.
//!
//! A ticket is redeemed at most once. The fast-path lookup of an existing
//! check-in is only an optimisation; the guarantee comes from the unique
//! constraint on `check_ins.order_item_id`, which totally orders concurrent
//! scans of one ticket. The loser of a race is answered with the winner's
//! record as a duplicate.

use crate::entities::check_ins::{self, CheckInRecord, GetCheckInForTicket, NewCheckIn};
use crate::entities::tickets::{self, GetTicketById, GetTicketByQrCode, TicketDetail};
use crate::entities::TicketStatus;
use crate::framework::DatabaseProcessor;
use crate::utils::clock;
use async_trait::async_trait;
use gatepass_sdk::codes::CheckInErrorCode;
use gatepass_sdk::objects::check_in::{CheckInResponse, CheckInView, TicketView};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("check-in of ticket {0} conflicted but the winning record is missing")]
    MissingWinner(Uuid),
    #[error("ticket {0} disappeared during check-in")]
    TicketVanished(Uuid),
}

/// Outcome of the atomic insert-and-transition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Recorded(CheckInRecord),
    /// The unique constraint rejected the insert.
    AlreadyRedeemed,
    /// The ticket left `paid` between validation and insert.
    NotRedeemable,
}

#[async_trait]
pub trait CheckInRepository: Send + Sync {
    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetail>, sqlx::Error>;

    async fn find_ticket_by_id(&self, ticket_id: Uuid) -> Result<Option<TicketDetail>, sqlx::Error>;

    async fn find_check_in_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<CheckInRecord>, sqlx::Error>;

    /// Insert the check-in and move the ticket to `checked_in` in one
    /// transaction.
    async fn redeem(&self, check_in: NewCheckIn) -> Result<Redemption, sqlx::Error>;
}

#[async_trait]
impl CheckInRepository for DatabaseProcessor {
    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetail>, sqlx::Error> {
        self.process(GetTicketByQrCode {
            qr_code: qr_code.to_string(),
        })
        .await
    }

    async fn find_ticket_by_id(&self, ticket_id: Uuid) -> Result<Option<TicketDetail>, sqlx::Error> {
        self.process(GetTicketById { ticket_id }).await
    }

    async fn find_check_in_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<CheckInRecord>, sqlx::Error> {
        self.process(GetCheckInForTicket { ticket_id }).await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:RedeemTicket")]
    async fn redeem(&self, check_in: NewCheckIn) -> Result<Redemption, sqlx::Error> {
        let mut tx = self.begin().await?;
        let Some(record) = check_ins::insert_if_absent(&mut *tx.tx, &check_in).await? else {
            return Ok(Redemption::AlreadyRedeemed);
        };
        let transitioned =
            tickets::mark_checked_in(&mut *tx.tx, check_in.order_item_id, check_in.checked_in_at)
                .await?;
        if !transitioned {
            return Ok(Redemption::NotRedeemable);
        }
        tx.commit().await?;
        Ok(Redemption::Recorded(record))
    }
}

/// Everything a scan requires besides the QR payload itself.
#[derive(Debug, Clone)]
pub struct CheckInCommand {
    pub qr_code: String,
    pub staff_id: Uuid,
    pub gate_id: Option<Uuid>,
    pub location: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A check-in record with its ticket and category, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInDetail {
    pub record: CheckInRecord,
    pub ticket: TicketDetail,
}

impl From<CheckInDetail> for CheckInView {
    fn from(detail: CheckInDetail) -> Self {
        let CheckInDetail { record, ticket } = detail;
        CheckInView {
            id: record.id,
            status: record.status.into(),
            checked_in_at: clock::unix_seconds(record.checked_in_at),
            gate_id: record.gate_id,
            staff_id: record.staff_id,
            location: record.location,
            ticket: TicketView {
                id: ticket.id,
                order_id: ticket.order_id,
                qr_code: ticket.qr_code,
                status: ticket.status.into(),
                category_id: ticket.category_id,
                category_name: ticket.category_name,
                category_is_vip: ticket.category_is_vip,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    Admitted(CheckInDetail),
    Rejected {
        code: CheckInErrorCode,
        /// The earlier record, for [`CheckInErrorCode::DuplicateCheckIn`].
        existing: Option<CheckInDetail>,
    },
}

impl CheckInOutcome {
    pub fn rejected(code: CheckInErrorCode) -> Self {
        CheckInOutcome::Rejected {
            code,
            existing: None,
        }
    }

    pub fn duplicate(existing: CheckInDetail) -> Self {
        CheckInOutcome::Rejected {
            code: CheckInErrorCode::DuplicateCheckIn,
            existing: Some(existing),
        }
    }

    pub fn error_code(&self) -> Option<CheckInErrorCode> {
        match self {
            CheckInOutcome::Admitted(_) => None,
            CheckInOutcome::Rejected { code, .. } => Some(*code),
        }
    }

    pub fn record(&self) -> Option<&CheckInRecord> {
        match self {
            CheckInOutcome::Admitted(detail) => Some(&detail.record),
            CheckInOutcome::Rejected { existing, .. } => existing.as_ref().map(|d| &d.record),
        }
    }

    pub fn into_response(self) -> CheckInResponse {
        match self {
            CheckInOutcome::Admitted(detail) => CheckInResponse {
                success: true,
                message: "check-in successful".to_string(),
                error_code: None,
                check_in: Some(detail.into()),
            },
            CheckInOutcome::Rejected { code, existing } => CheckInResponse {
                success: false,
                message: code.message().to_string(),
                error_code: Some(code),
                check_in: existing.map(Into::into),
            },
        }
    }
}

#[derive(Clone)]
pub struct CheckInService {
    repo: Arc<dyn CheckInRepository>,
}

impl CheckInService {
    pub fn new(repo: Arc<dyn CheckInRepository>) -> Self {
        Self { repo }
    }

    pub(crate) fn repository(&self) -> &Arc<dyn CheckInRepository> {
        &self.repo
    }

    pub async fn check_in(&self, cmd: CheckInCommand) -> Result<CheckInOutcome, CheckInError> {
        let Some(ticket) = self.repo.find_ticket_by_qr(&cmd.qr_code).await? else {
            debug!(staff_id = %cmd.staff_id, "Unknown QR code scanned");
            return Ok(CheckInOutcome::rejected(CheckInErrorCode::InvalidQrCode));
        };

        match ticket.status {
            TicketStatus::Paid => {}
            TicketStatus::CheckedIn => {
                if let Some(existing) = self.repo.find_check_in_for_ticket(ticket.id).await? {
                    return Ok(CheckInOutcome::duplicate(CheckInDetail {
                        record: existing,
                        ticket,
                    }));
                }
                warn!(ticket_id = %ticket.id, "Ticket is checked in but has no check-in record");
                return Ok(CheckInOutcome::rejected(CheckInErrorCode::TicketNotPaid));
            }
            TicketStatus::Unpaid | TicketStatus::Canceled | TicketStatus::Refunded => {
                return Ok(CheckInOutcome::rejected(CheckInErrorCode::TicketNotPaid));
            }
        }

        if let Some(existing) = self.repo.find_check_in_for_ticket(ticket.id).await? {
            return Ok(CheckInOutcome::duplicate(CheckInDetail {
                record: existing,
                ticket,
            }));
        }

        let new_check_in = NewCheckIn {
            order_item_id: ticket.id,
            gate_id: cmd.gate_id,
            staff_id: cmd.staff_id,
            location: cmd.location,
            client_ip: cmd.client_ip,
            user_agent: cmd.user_agent,
            checked_in_at: clock::utc_now(),
        };
        match self.repo.redeem(new_check_in).await? {
            Redemption::Recorded(record) => {
                let ticket = self
                    .repo
                    .find_ticket_by_id(ticket.id)
                    .await?
                    .ok_or(CheckInError::TicketVanished(ticket.id))?;
                info!(
                    ticket_id = %ticket.id,
                    check_in_id = %record.id,
                    staff_id = %record.staff_id,
                    gate_id = ?record.gate_id,
                    "Ticket checked in"
                );
                Ok(CheckInOutcome::Admitted(CheckInDetail { record, ticket }))
            }
            Redemption::AlreadyRedeemed => {
                let winner = self
                    .repo
                    .find_check_in_for_ticket(ticket.id)
                    .await?
                    .ok_or(CheckInError::MissingWinner(ticket.id))?;
                let ticket = self
                    .repo
                    .find_ticket_by_id(ticket.id)
                    .await?
                    .ok_or(CheckInError::TicketVanished(ticket.id))?;
                debug!(ticket_id = %ticket.id, winner = %winner.id, "Lost check-in race");
                Ok(CheckInOutcome::duplicate(CheckInDetail {
                    record: winner,
                    ticket,
                }))
            }
            Redemption::NotRedeemable => {
                Ok(CheckInOutcome::rejected(CheckInErrorCode::TicketNotPaid))
            }
        }
    }
}

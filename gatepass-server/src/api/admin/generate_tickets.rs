use axum::{Json, extract::State, http::StatusCode};
use gatepass_core::entities::tickets::Ticket;
use gatepass_core::ticket_generation::GenerateTickets;
use gatepass_sdk::objects::Envelope;
use gatepass_sdk::objects::orders::{GenerateTicketsRequest, TicketResponse};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extractors::AdminAuth;
use crate::api::{ApiJson, ApiPath};
use crate::state::AppState;

/// `POST /api/admin/orders/{order_id}/tickets`: issue tickets by hand.
///
/// Normally the ticket issuer does this when the payment webhook marks the
/// order paid; this endpoint covers manual sales and support cases. A
/// second call for the same order is refused with `TICKETS_ALREADY_GENERATED`.
pub async fn generate_tickets(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(order_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<GenerateTicketsRequest>,
) -> Result<(StatusCode, Json<Envelope<Vec<TicketResponse>>>), ApiError> {
    let tickets = state
        .tickets
        .generate(GenerateTickets {
            order_id,
            category_ids: request.category_ids,
            quantities: request.quantities,
        })
        .await?;
    tracing::info!(
        order_id = %order_id,
        admin_id = %admin.user_id,
        count = tickets.len(),
        "Tickets generated by admin"
    );

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(tickets.iter().map(to_response).collect())),
    ))
}

fn to_response(ticket: &Ticket) -> TicketResponse {
    TicketResponse {
        id: ticket.id,
        order_id: ticket.order_id,
        category_id: ticket.category_id,
        qr_code: ticket.qr_code.clone(),
        status: ticket.status.into(),
    }
}

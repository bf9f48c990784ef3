use crate::config::PaymentGatewayConfig;
use async_trait::async_trait;
use gatepass_sdk::objects::webhook::GatewayNotification;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid gateway url: {0}")]
    Url(#[from] url::ParseError),
    #[error("gateway answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("amount {0} cannot be charged")]
    InvalidAmount(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub gateway_reference: String,
    pub gross_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

/// The external payment gateway.
///
/// The configuration is passed on every call so that a reloaded server key
/// applies to the next request.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        config: &PaymentGatewayConfig,
        request: &TransactionRequest,
    ) -> Result<PaymentSession, GatewayError>;

    /// Current status of a transaction, in the same signed shape as a
    /// notification.
    async fn transaction_status(
        &self,
        config: &PaymentGatewayConfig,
        gateway_reference: &str,
    ) -> Result<GatewayNotification, GatewayError>;
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CreateTransactionBody<'a> {
    transaction_details: TransactionDetails<'a>,
}

/// Talks to the gateway's HTTP API, authenticating with the server key.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    http_client: reqwest::Client,
}

impl Default for HttpPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPaymentGateway {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn server_key(config: &PaymentGatewayConfig) -> String {
    String::from_utf8_lossy(&config.server_key).into_owned()
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_transaction(
        &self,
        config: &PaymentGatewayConfig,
        request: &TransactionRequest,
    ) -> Result<PaymentSession, GatewayError> {
        // The gateway only charges whole currency units.
        let gross_amount = request
            .gross_amount
            .round()
            .to_i64()
            .filter(|amount| *amount > 0)
            .ok_or(GatewayError::InvalidAmount(request.gross_amount))?;
        let url = config.snap_base_url.join("snap/v1/transactions")?;
        let body = CreateTransactionBody {
            transaction_details: TransactionDetails {
                order_id: &request.gateway_reference,
                gross_amount,
            },
        };
        let response = self
            .http_client
            .post(url)
            .basic_auth(server_key(config), Some(""))
            .json(&body)
            .send()
            .await?;
        Ok(Self::checked(response).await?.json::<PaymentSession>().await?)
    }

    async fn transaction_status(
        &self,
        config: &PaymentGatewayConfig,
        gateway_reference: &str,
    ) -> Result<GatewayNotification, GatewayError> {
        let url = config
            .api_base_url
            .join(&format!("v2/{gateway_reference}/status"))?;
        let response = self
            .http_client
            .get(url)
            .basic_auth(server_key(config), Some(""))
            .send()
            .await?;
        Ok(Self::checked(response)
            .await?
            .json::<GatewayNotification>()
            .await?)
    }
}

//! Payment Adapter (spec §4.6, §6 "Payment dependency (consumed)").

use std::time::Duration;

use async_trait::async_trait;
use model::{OrderId, PaymentId};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub payment_id: Option<PaymentId>,
    pub status: PaymentOutcome,
}

#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Charges the customer for `amount`. Status `SUCCESS` with a payment
    /// identifier is required for the saga to finalize (spec §4.6).
    async fn charge(
        &self,
        order_id: &OrderId,
        amount: Decimal,
        method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ChargeResult, ClientError>;
}

#[derive(Serialize)]
struct ChargeRequest<'a> {
    #[serde(rename = "orderId")]
    order_id: &'a str,
    amount: Decimal,
    method: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChargeResponse {
    payment_id: Option<String>,
    status: String,
}

/// HTTP implementation against `POST /v1/payments` (spec §6).
pub struct HttpPaymentClient {
    client: Client,
    base_url: String,
}

impl HttpPaymentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a sane default TLS backend");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentClient for HttpPaymentClient {
    async fn charge(
        &self,
        order_id: &OrderId,
        amount: Decimal,
        method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ChargeResult, ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/payments", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .json(&ChargeRequest {
                order_id: order_id.as_str(),
                amount,
                method,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::NonSuccess(response.status().as_u16()));
        }

        let body: ChargeResponse = response.json().await?;
        let status = if body.status == "SUCCESS" {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Other(body.status)
        };
        Ok(ChargeResult {
            payment_id: body.payment_id.map(PaymentId::new),
            status,
        })
    }
}

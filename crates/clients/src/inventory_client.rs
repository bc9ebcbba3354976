//! Client for the Inventory Engine's own HTTP surface (spec §6 "HTTP
//! surface — Inventory"), as consumed by the order orchestrator during
//! phase 4 of the create-order saga (spec §4.1).
//!
//! This is an internal service-to-service contract (the orchestrator and
//! the inventory engine are sibling services, spec §2), not one of the
//! external collaborators in §1 — but it is grounded the same way as the
//! catalog/payment adapters: a thin typed client with per-hop timeouts
//! and no internal retry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{OrderId, ProductId, ReservationId, Sku, WarehouseId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ClientError;

#[derive(Debug, Error)]
pub enum InventoryClientError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("a reservation already exists for this idempotency key with a different order")]
    DuplicateIdempotencyKey,
}

#[derive(Debug, Clone)]
pub struct ReserveLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub sku: Option<Sku>,
}

#[derive(Debug, Clone)]
pub struct ReservedLine {
    pub sku: Sku,
    pub product_id: ProductId,
    pub warehouse: WarehouseId,
    pub quantity: u32,
    pub reservation_id: ReservationId,
}

#[derive(Debug, Clone)]
pub struct UnallocatedLine {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
    pub action_required: String,
}

#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved {
        items: Vec<ReservedLine>,
        expires_at: DateTime<Utc>,
        idempotent: bool,
    },
    Partial {
        allocated: Vec<ReservedLine>,
        unallocated: Vec<UnallocatedLine>,
    },
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn reserve(
        &self,
        order_id: &OrderId,
        items: &[ReserveLineRequest],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryClientError>;

    async fn release(&self, order_id: &OrderId) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct ReserveItemWire<'a> {
    #[serde(rename = "productId")]
    product_id: &'a str,
    qty: u32,
    sku: Option<&'a str>,
}

#[derive(Serialize)]
struct ReserveRequestWire<'a> {
    #[serde(rename = "orderId")]
    order_id: &'a str,
    items: Vec<ReserveItemWire<'a>>,
}

#[derive(Serialize)]
struct ReleaseRequestWire<'a> {
    #[serde(rename = "orderId")]
    order_id: &'a str,
}

#[derive(Deserialize)]
struct ReserveResponseItemWire {
    #[serde(rename = "productId")]
    product_id: String,
    sku: Option<String>,
    warehouse: Option<String>,
    #[serde(rename = "reservationId")]
    reservation_id: Option<String>,
    #[serde(rename = "qtyReserved")]
    qty_reserved: Option<u32>,
    requested: Option<u32>,
    available: Option<u32>,
    #[serde(rename = "actionRequired")]
    action_required: Option<String>,
}

#[derive(Deserialize)]
struct ReserveResponseWire {
    status: String,
    items: Vec<ReserveResponseItemWire>,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
    idempotent: Option<bool>,
}

/// HTTP implementation against `POST /v1/inventory/reserve` and
/// `POST /v1/inventory/release`.
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
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
impl InventoryClient for HttpInventoryClient {
    async fn reserve(
        &self,
        order_id: &OrderId,
        items: &[ReserveLineRequest],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryClientError> {
        let body = ReserveRequestWire {
            order_id: order_id.as_str(),
            items: items
                .iter()
                .map(|item| ReserveItemWire {
                    product_id: item.product_id.as_str(),
                    qty: item.quantity,
                    sku: item.sku.as_ref().map(|s| s.as_str()),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/v1/inventory/reserve", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::from)?;

        if response.status() == StatusCode::CONFLICT {
            return Err(InventoryClientError::DuplicateIdempotencyKey);
        }
        if !response.status().is_success() {
            return Err(ClientError::NonSuccess(response.status().as_u16()).into());
        }

        let wire: ReserveResponseWire = response.json().await.map_err(ClientError::from)?;
        match wire.status.as_str() {
            "RESERVED" => {
                let expires_at = wire.expires_at.unwrap_or_else(Utc::now);
                let items = wire
                    .items
                    .into_iter()
                    .filter_map(|item| {
                        Some(ReservedLine {
                            sku: Sku::new(item.sku?),
                            product_id: ProductId::new(item.product_id),
                            warehouse: WarehouseId::new(item.warehouse?),
                            quantity: item.qty_reserved?,
                            reservation_id: ReservationId::new(item.reservation_id?),
                        })
                    })
                    .collect();
                Ok(ReserveOutcome::Reserved {
                    items,
                    expires_at,
                    idempotent: wire.idempotent.unwrap_or(false),
                })
            }
            _ => {
                let mut allocated = Vec::new();
                let mut unallocated = Vec::new();
                for item in wire.items {
                    if let (Some(warehouse), Some(reservation_id), Some(qty)) = (
                        item.warehouse.clone(),
                        item.reservation_id.clone(),
                        item.qty_reserved,
                    ) {
                        allocated.push(ReservedLine {
                            sku: Sku::new(item.sku.clone().unwrap_or_default()),
                            product_id: ProductId::new(item.product_id.clone()),
                            warehouse: WarehouseId::new(warehouse),
                            quantity: qty,
                            reservation_id: ReservationId::new(reservation_id),
                        });
                    } else {
                        unallocated.push(UnallocatedLine {
                            product_id: ProductId::new(item.product_id),
                            requested: item.requested.unwrap_or(0),
                            available: item.available.unwrap_or(0),
                            action_required: item
                                .action_required
                                .unwrap_or_else(|| "BACKORDER_OR_REDUCE".to_string()),
                        });
                    }
                }
                Ok(ReserveOutcome::Partial {
                    allocated,
                    unallocated,
                })
            }
        }
    }

    async fn release(&self, order_id: &OrderId) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/inventory/release", self.base_url))
            .json(&ReleaseRequestWire {
                order_id: order_id.as_str(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::NonSuccess(response.status().as_u16()));
        }
        Ok(())
    }
}

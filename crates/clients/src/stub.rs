//! In-process stub implementations of the external client traits, used
//! for local development and tests that should not require live Catalog,
//! Payment, or Inventory HTTP services (spec §1 "Out of scope": these
//! collaborators are specified only via their contracts).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use model::{OrderId, PaymentId, ProductId};
use rust_decimal::Decimal;

use crate::catalog::{CatalogClient, ProductDetails};
use crate::error::ClientError;
use crate::inventory_client::{
    InventoryClient, InventoryClientError, ReserveLineRequest, ReserveOutcome, ReservedLine,
};
use crate::payment::{ChargeResult, PaymentClient, PaymentOutcome};

/// Seeded fake catalog. Missing entries surface as [`ClientError::MissingEntry`],
/// matching the real adapter's contract (spec §4.4).
#[derive(Default)]
pub struct StubCatalogClient {
    pub prices: HashMap<ProductId, Decimal>,
    pub details: HashMap<ProductId, ProductDetails>,
}

impl StubCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(
        mut self,
        id: ProductId,
        price: Decimal,
        sku: model::Sku,
        name: impl Into<String>,
    ) -> Self {
        self.prices.insert(id.clone(), price);
        self.details.insert(
            id,
            ProductDetails {
                sku,
                name: name.into(),
            },
        );
        self
    }
}

#[async_trait]
impl CatalogClient for StubCatalogClient {
    async fn prices(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Decimal>, ClientError> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.prices.get(id) {
                Some(price) => {
                    out.insert(id.clone(), *price);
                }
                None => return Err(ClientError::MissingEntry(id.as_str().to_string())),
            }
        }
        Ok(out)
    }

    async fn details(&self, id: &ProductId) -> Result<ProductDetails, ClientError> {
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::MissingEntry(id.as_str().to_string()))
    }
}

/// Always charges successfully (or always fails, if constructed via
/// [`StubPaymentClient::always_fail`]) — used to exercise both the happy
/// path and the payment-failure compensation path (spec §8 scenario 4).
pub struct StubPaymentClient {
    succeed: bool,
}

impl StubPaymentClient {
    pub fn always_succeed() -> Self {
        Self { succeed: true }
    }

    pub fn always_fail() -> Self {
        Self { succeed: false }
    }
}

#[async_trait]
impl PaymentClient for StubPaymentClient {
    async fn charge(
        &self,
        order_id: &OrderId,
        _amount: Decimal,
        _method: Option<&str>,
        _idempotency_key: &str,
    ) -> Result<ChargeResult, ClientError> {
        if self.succeed {
            Ok(ChargeResult {
                payment_id: Some(PaymentId::new(format!("pay-{}", order_id.as_str()))),
                status: PaymentOutcome::Success,
            })
        } else {
            Ok(ChargeResult {
                payment_id: None,
                status: PaymentOutcome::Other("DECLINED".to_string()),
            })
        }
    }
}

/// Canned inventory reservation outcomes, plus a record of release calls
/// so orchestrator compensation tests can assert release happened.
pub struct StubInventoryClient {
    outcome: Mutex<Option<ReserveOutcome>>,
    pub released: Mutex<Vec<OrderId>>,
}

impl StubInventoryClient {
    pub fn with_outcome(outcome: ReserveOutcome) -> Self {
        Self {
            outcome: Mutex::new(Some(outcome)),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn reserved_all(items: &[ReserveLineRequest]) -> Self {
        let reserved = items
            .iter()
            .map(|item| ReservedLine {
                sku: item.sku.clone().unwrap_or_else(|| model::Sku::new("SKU")),
                product_id: item.product_id.clone(),
                warehouse: model::WarehouseId::new("WH1"),
                quantity: item.quantity,
                reservation_id: model::ReservationId::generate(),
            })
            .collect();
        Self::with_outcome(ReserveOutcome::Reserved {
            items: reserved,
            expires_at: Utc::now() + ChronoDuration::minutes(15),
            idempotent: false,
        })
    }
}

#[async_trait]
impl InventoryClient for StubInventoryClient {
    async fn reserve(
        &self,
        _order_id: &OrderId,
        _items: &[ReserveLineRequest],
        _idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryClientError> {
        self.outcome
            .lock()
            .unwrap()
            .take()
            .ok_or(InventoryClientError::DuplicateIdempotencyKey)
    }

    async fn release(&self, order_id: &OrderId) -> Result<(), ClientError> {
        self.released.lock().unwrap().push(order_id.clone());
        Ok(())
    }
}

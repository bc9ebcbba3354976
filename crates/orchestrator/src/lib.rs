//! Order Orchestrator (spec §4.1): drives the create-order saga from
//! idempotency gate through pricing, persistence, inventory reservation,
//! and payment, with compensation on any failure after persistence.

pub mod error;

use std::sync::Arc;

use chrono::Utc;
use clients::{
    CatalogClient, ClientError, InventoryClient, InventoryClientError, PaymentClient,
    PaymentOutcome, ReserveLineRequest, ReserveOutcome as InventoryReserveOutcome,
};
use futures::future::try_join_all;
use idempotency::{Acquired, ConflictState, IdempotencyStore};
use model::{
    CustomerId, LineStatus, Order, OrderId, OrderItem, OrderItemId, OrderStatus, OrderWithItems,
    PaymentId, PaymentStatus, ProductId, Sku,
};
use repository::OrdersRepository;
use rust_decimal::Decimal;
use tracing::{error, instrument, warn};

pub use error::OrchestratorError;

const RESOURCE_PATH: &str = "/v1/orders";

/// Sink for compensation-failure reconciliation alerts (spec §4.1
/// "Compensation failure"). The HTTP layer implements this against its
/// own `Metrics` struct; the default no-op is used where nothing needs
/// to observe it (e.g. tests).
pub trait ReconciliationSink: Send + Sync {
    fn record_compensation_failure(&self, order_id: &OrderId, step: &str);
}

struct NoopReconciliationSink;

impl ReconciliationSink for NoopReconciliationSink {
    fn record_compensation_failure(&self, _order_id: &OrderId, _step: &str) {}
}

#[derive(Debug, Clone)]
pub struct CreateOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub sku: Option<Sku>,
}

#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub customer_id: CustomerId,
    pub items: Vec<CreateOrderItem>,
    pub idempotency_key: String,
    pub payment_method: Option<String>,
    /// SHA-256 hex digest of the raw request body, computed by the HTTP
    /// layer (spec §4.1 phase 1 "Record the request-body hash for
    /// observability").
    pub body_hash: String,
}

pub struct OrchestratorService {
    orders_repo: Arc<dyn OrdersRepository>,
    idempotency: Arc<dyn IdempotencyStore>,
    catalog: Arc<dyn CatalogClient>,
    payment: Arc<dyn PaymentClient>,
    inventory: Arc<dyn InventoryClient>,
    totals_opts: totals::TotalsOptions,
    reverify_totals: bool,
    reconciliation_sink: Arc<dyn ReconciliationSink>,
}

impl OrchestratorService {
    pub fn new(
        orders_repo: Arc<dyn OrdersRepository>,
        idempotency: Arc<dyn IdempotencyStore>,
        catalog: Arc<dyn CatalogClient>,
        payment: Arc<dyn PaymentClient>,
        inventory: Arc<dyn InventoryClient>,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            orders_repo,
            idempotency,
            catalog,
            payment,
            inventory,
            totals_opts: totals::TotalsOptions {
                tax_rate,
                shipping: None,
            },
            reverify_totals: true,
            reconciliation_sink: Arc::new(NoopReconciliationSink),
        }
    }

    /// Attaches an observer for compensation-failure reconciliation
    /// alerts (spec §4.1 "Compensation failure"); the HTTP layer wires
    /// this to its own metrics registry.
    pub fn with_reconciliation_sink(mut self, sink: Arc<dyn ReconciliationSink>) -> Self {
        self.reconciliation_sink = sink;
        self
    }

    #[instrument(skip(self, cmd), fields(idempotency_key = %cmd.idempotency_key, customer_id = %cmd.customer_id))]
    pub async fn create_order(
        &self,
        cmd: CreateOrderCommand,
    ) -> Result<OrderWithItems, OrchestratorError> {
        self.validate(&cmd)?;

        // Phase 1: idempotency gate.
        let acquired = self
            .idempotency
            .acquire(&cmd.idempotency_key, RESOURCE_PATH, &cmd.body_hash)
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        match acquired {
            Acquired::Created => {}
            Acquired::Replay { body, .. } => {
                return serde_json::from_value(body)
                    .map_err(|e| OrchestratorError::Internal(format!("replay decode failed: {e}")));
            }
            Acquired::Conflict(ConflictState::Pending) => {
                return Err(OrchestratorError::IdempotencyConflict);
            }
            Acquired::Conflict(ConflictState::FinalizedNonSuccess { .. }) => {
                return Err(OrchestratorError::IdempotencyConflict);
            }
        }

        match self.run_saga(&cmd).await {
            Ok(order_with_items) => {
                let body = serde_json::to_value(&order_with_items)
                    .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
                self.finalize_idempotency(&cmd.idempotency_key, 201, &body)
                    .await;
                Ok(order_with_items)
            }
            Err((err, persisted_order_id)) => {
                if let Some(order_id) = &persisted_order_id {
                    self.compensate(order_id).await;
                }
                let envelope = err.envelope();
                let body = serde_json::to_value(&envelope).unwrap_or(serde_json::Value::Null);
                self.finalize_idempotency(&cmd.idempotency_key, err.status_code(), &body)
                    .await;
                Err(err)
            }
        }
    }

    fn validate(&self, cmd: &CreateOrderCommand) -> Result<(), OrchestratorError> {
        if cmd.idempotency_key.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "Idempotency-Key header is required".into(),
            ));
        }
        if cmd.items.is_empty() {
            return Err(OrchestratorError::Validation("items must not be empty".into()));
        }
        if cmd.items.iter().any(|i| i.quantity == 0) {
            return Err(OrchestratorError::Validation(
                "item quantity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Runs phases 2-6. Returns the order identifier alongside any error
    /// so the caller knows whether compensation is required (only once
    /// the order has actually been persisted, i.e. phase 3+).
    async fn run_saga(
        &self,
        cmd: &CreateOrderCommand,
    ) -> Result<OrderWithItems, (OrchestratorError, Option<OrderId>)> {
        // Phase 2: price + detail lookup.
        let product_ids: Vec<ProductId> = cmd.items.iter().map(|i| i.product_id.clone()).collect();
        let prices = self
            .catalog
            .prices(&product_ids)
            .await
            .map_err(|e| (OrchestratorError::PricingFailed(e.to_string()), None))?;

        let details = try_join_all(product_ids.iter().map(|id| self.catalog.details(id)))
            .await
            .map_err(|e| (OrchestratorError::PricingFailed(e.to_string()), None))?;

        // Phase 3: totals + persistence.
        let order_id = OrderId::generate();
        let now = Utc::now();
        let mut line_inputs = Vec::with_capacity(cmd.items.len());
        let mut order_items = Vec::with_capacity(cmd.items.len());

        for (cmd_item, detail) in cmd.items.iter().zip(details.into_iter()) {
            let price = *prices.get(&cmd_item.product_id).ok_or_else(|| {
                (
                    OrchestratorError::PricingFailed(format!(
                        "no price for product {}",
                        cmd_item.product_id
                    )),
                    None,
                )
            })?;

            line_inputs.push(totals::LineInput {
                product_id: cmd_item.product_id.clone(),
                quantity: cmd_item.quantity,
                unit_price: price,
            });
            order_items.push(OrderItem {
                id: OrderItemId::generate(),
                order_id: order_id.clone(),
                product_id: cmd_item.product_id.clone(),
                sku: cmd_item.sku.clone().unwrap_or(detail.sku),
                product_name: detail.name,
                quantity: cmd_item.quantity,
                unit_price: price,
                tax_rate: self.totals_opts.tax_rate,
                status: LineStatus::Pending,
            });
        }

        let totals = totals::compute(&line_inputs, &self.totals_opts);

        let order = Order {
            id: order_id.clone(),
            customer_id: cmd.customer_id.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total: totals.total,
            totals_signature: totals.signature.clone(),
            payment_reference: None,
            created_at: now,
        };

        self.orders_repo
            .insert_with_items(&order, &order_items)
            .await
            .map_err(|e| (OrchestratorError::Internal(e.to_string()), None))?;

        // Phase 4: inventory reservation.
        let reserve_items: Vec<ReserveLineRequest> = cmd
            .items
            .iter()
            .zip(order_items.iter())
            .map(|(cmd_item, stored)| ReserveLineRequest {
                product_id: cmd_item.product_id.clone(),
                quantity: cmd_item.quantity,
                sku: Some(stored.sku.clone()),
            })
            .collect();

        let reserve_result = self
            .inventory
            .reserve(&order_id, &reserve_items, &cmd.idempotency_key)
            .await;

        match reserve_result {
            Ok(InventoryReserveOutcome::Reserved { .. }) => {}
            Ok(InventoryReserveOutcome::Partial { .. }) => {
                return Err((
                    OrchestratorError::OrderCreationFailed {
                        message: "inventory could not fully allocate the requested items".into(),
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id),
                ));
            }
            Err(InventoryClientError::DuplicateIdempotencyKey) => {
                return Err((
                    OrchestratorError::OrderCreationFailed {
                        message: "inventory reservation conflicted on idempotency key".into(),
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id),
                ));
            }
            Err(InventoryClientError::Client(e)) => {
                return Err((
                    OrchestratorError::OrderCreationFailed {
                        message: e.to_string(),
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id),
                ));
            }
        }

        // Phase 5: payment charge.
        let charge = self
            .payment
            .charge(
                &order_id,
                totals.total,
                cmd.payment_method.as_deref(),
                &cmd.idempotency_key,
            )
            .await
            .map_err(|e: ClientError| {
                (
                    OrchestratorError::OrderCreationFailed {
                        message: e.to_string(),
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id.clone()),
                )
            })?;

        let payment_id = match (charge.status, charge.payment_id) {
            (PaymentOutcome::Success, Some(id)) => id,
            _ => {
                return Err((
                    OrchestratorError::OrderCreationFailed {
                        message: "payment did not return a successful charge".into(),
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id),
                ));
            }
        };

        // Optional totals re-verification (spec §4.1 "Totals re-verification").
        if self.reverify_totals {
            let recomputed = totals::recompute_signature(&line_inputs, &self.totals_opts);
            if recomputed != order.totals_signature {
                return Err((
                    OrchestratorError::TotalsTampered {
                        order_id: Some(order_id.clone()),
                    },
                    Some(order_id),
                ));
            }
        }

        // Phase 6: finalize.
        self.orders_repo
            .finalize_payment(&order_id, PaymentStatus::Success, Some(&payment_id))
            .await
            .map_err(|e| (OrchestratorError::Internal(e.to_string()), Some(order_id.clone())))?;

        let mut finalized_order = order;
        finalized_order.payment_status = PaymentStatus::Success;
        finalized_order.payment_reference = Some(payment_id);

        Ok(OrderWithItems {
            order: finalized_order,
            items: order_items,
            totals,
        })
    }

    /// Spec §4.1 "Compensation": mark the order CANCELLED and release any
    /// reservations. Release is idempotent, so it is safe to call even if
    /// phase 4 never ran or never succeeded.
    async fn compensate(&self, order_id: &OrderId) {
        if let Err(e) = self
            .orders_repo
            .update_status(order_id, OrderStatus::Cancelled)
            .await
        {
            error!(order_id = %order_id, error = %e, reconciliation = true, "failed to mark order cancelled during compensation");
            self.reconciliation_sink
                .record_compensation_failure(order_id, "mark_cancelled");
        }

        if let Err(e) = self.inventory.release(order_id).await {
            error!(order_id = %order_id, error = %e, reconciliation = true, "inventory release failed during compensation");
            self.reconciliation_sink
                .record_compensation_failure(order_id, "inventory_release");
        }
    }

    async fn finalize_idempotency(&self, key: &str, status: u16, body: &serde_json::Value) {
        if let Err(e) = self.idempotency.finalize(key, status, body).await {
            warn!(key = %key, error = %e, "idempotency finalize failed (already finalized?)");
        }
    }
}

//! Saga-level integration tests (spec §8) driven entirely through fakes:
//! an in-memory [`OrdersRepository`], an in-memory idempotency store, and
//! the stub Catalog/Payment/Inventory clients from the `clients` crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use clients::stub::{StubCatalogClient, StubInventoryClient, StubPaymentClient};
use idempotency::{Acquired, ConflictState, IdempotencyError, IdempotencyStore};
use model::{Order, OrderId, OrderItem, OrderStatus, PaymentStatus, Sku};
use orchestrator::{CreateOrderCommand, CreateOrderItem, OrchestratorError, OrchestratorService};
use repository::{OrderRecord, OrdersRepository, RepositoryError};
use rust_decimal::Decimal;

#[derive(Default)]
struct InMemoryOrdersRepository {
    orders: Mutex<HashMap<String, (Order, Vec<OrderItem>)>>,
}

#[async_trait]
impl OrdersRepository for InMemoryOrdersRepository {
    async fn insert_with_items(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), RepositoryError> {
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.as_str().to_string(), (order.clone(), items.to_vec()));
        Ok(())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<OrderRecord, RepositoryError> {
        self.orders
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|(order, items)| OrderRecord {
                order: order.clone(),
                items: items.clone(),
            })
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .map(|(order, _)| order.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(id.as_str()) {
            Some((order, _)) => {
                order.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn finalize_payment(
        &self,
        id: &OrderId,
        payment_status: PaymentStatus,
        payment_reference: Option<&model::PaymentId>,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(id.as_str()) {
            Some((order, _)) => {
                order.payment_status = payment_status;
                order.payment_reference = payment_reference.cloned();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[derive(Default)]
struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, (u16, serde_json::Value)>>,
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn acquire(
        &self,
        key: &str,
        _resource_path: &str,
        _body_hash: &str,
    ) -> Result<Acquired, IdempotencyError> {
        let records = self.records.lock().unwrap();
        match records.get(key) {
            Some((status, body)) if (200..300).contains(status) => Ok(Acquired::Replay {
                status: *status,
                body: body.clone(),
            }),
            Some((status, _)) => Ok(Acquired::Conflict(ConflictState::FinalizedNonSuccess {
                status: *status,
            })),
            None => Ok(Acquired::Created),
        }
    }

    async fn finalize(
        &self,
        key: &str,
        status: u16,
        body: &serde_json::Value,
    ) -> Result<(), IdempotencyError> {
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), (status, body.clone()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<model::IdempotencyRecord>, IdempotencyError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(key).map(|(status, body)| model::IdempotencyRecord {
            key: key.to_string(),
            resource_path: "/v1/orders".to_string(),
            request_body_hash: String::new(),
            response_status: Some(*status),
            response_body: Some(body.clone()),
            created_at: Utc::now(),
        }))
    }
}

fn seeded_catalog() -> StubCatalogClient {
    StubCatalogClient::new().with_product(
        model::ProductId::new("P1"),
        Decimal::new(1000, 2),
        Sku::new("SKU-1"),
        "Widget",
    )
}

fn basic_command(idempotency_key: &str) -> CreateOrderCommand {
    CreateOrderCommand {
        customer_id: model::CustomerId::new("C1"),
        items: vec![CreateOrderItem {
            product_id: model::ProductId::new("P1"),
            quantity: 2,
            sku: None,
        }],
        idempotency_key: idempotency_key.to_string(),
        payment_method: Some("card".to_string()),
        body_hash: "hash".to_string(),
    }
}

fn build_service(
    inventory: StubInventoryClient,
    payment: StubPaymentClient,
) -> (OrchestratorService, Arc<InMemoryOrdersRepository>) {
    let orders_repo = Arc::new(InMemoryOrdersRepository::default());
    let service = OrchestratorService::new(
        orders_repo.clone(),
        Arc::new(InMemoryIdempotencyStore::default()),
        Arc::new(seeded_catalog()),
        Arc::new(payment),
        Arc::new(inventory),
        Decimal::new(500, 4),
    );
    (service, orders_repo)
}

#[tokio::test]
async fn happy_path_creates_order_with_success_payment() {
    let cmd = basic_command("key-1");
    let items: Vec<clients::ReserveLineRequest> = cmd
        .items
        .iter()
        .map(|i| clients::ReserveLineRequest {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            sku: i.sku.clone(),
        })
        .collect();
    let (service, _repo) = build_service(
        StubInventoryClient::reserved_all(&items),
        StubPaymentClient::always_succeed(),
    );

    let result = service.create_order(cmd).await.expect("saga should succeed");

    assert_eq!(result.order.status, OrderStatus::Pending);
    assert_eq!(result.order.payment_status, PaymentStatus::Success);
    assert!(result.order.payment_reference.is_some());
    assert_eq!(result.totals.total, Decimal::new(3500, 2));
}

#[tokio::test]
async fn duplicate_idempotency_key_replays_cached_response() {
    let cmd = basic_command("key-2");
    let items: Vec<clients::ReserveLineRequest> = cmd
        .items
        .iter()
        .map(|i| clients::ReserveLineRequest {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            sku: i.sku.clone(),
        })
        .collect();
    let (service, _repo) = build_service(
        StubInventoryClient::reserved_all(&items),
        StubPaymentClient::always_succeed(),
    );

    let first = service.create_order(cmd.clone()).await.unwrap();
    let second = service.create_order(cmd).await.unwrap();

    assert_eq!(first.order.id, second.order.id);
}

#[tokio::test]
async fn payment_failure_cancels_order_and_releases_inventory() {
    let cmd = basic_command("key-3");
    let items: Vec<clients::ReserveLineRequest> = cmd
        .items
        .iter()
        .map(|i| clients::ReserveLineRequest {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            sku: i.sku.clone(),
        })
        .collect();
    let inventory = StubInventoryClient::reserved_all(&items);
    let (service, repo) = build_service(inventory, StubPaymentClient::always_fail());

    let err = service.create_order(cmd).await.expect_err("payment should fail the saga");

    assert!(matches!(err, OrchestratorError::OrderCreationFailed { .. }));
    let order_id = err.order_id().cloned().expect("order id should survive the failure");

    let record = repo.get_by_id(&order_id).await.unwrap();
    assert_eq!(record.order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn partial_reservation_fails_the_saga_and_cancels() {
    let cmd = basic_command("key-4");
    let (service, repo) = build_service(
        StubInventoryClient::with_outcome(clients::ReserveOutcome::Partial {
            allocated: Vec::new(),
            unallocated: vec![clients::UnallocatedLine {
                product_id: model::ProductId::new("P1"),
                requested: 2,
                available: 1,
                action_required: "BACKORDER_OR_REDUCE".to_string(),
            }],
        }),
        StubPaymentClient::always_succeed(),
    );

    let err = service.create_order(cmd).await.expect_err("partial reservation should fail the saga");
    let order_id = err.order_id().cloned().expect("order id should survive the failure");
    let record = repo.get_by_id(&order_id).await.unwrap();
    assert_eq!(record.order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn empty_items_is_rejected_before_any_writes() {
    let mut cmd = basic_command("key-5");
    cmd.items.clear();
    let (service, repo) = build_service(
        StubInventoryClient::reserved_all(&[]),
        StubPaymentClient::always_succeed(),
    );

    let err = service.create_order(cmd).await.expect_err("empty items should fail validation");
    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert_eq!(repo.list_recent(10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn zero_quantity_item_is_rejected() {
    let mut cmd = basic_command("key-6");
    cmd.items[0].quantity = 0;
    let (service, _repo) = build_service(
        StubInventoryClient::reserved_all(&[]),
        StubPaymentClient::always_succeed(),
    );

    let err = service.create_order(cmd).await.expect_err("zero quantity should fail validation");
    assert!(matches!(err, OrchestratorError::Validation(_)));
}

#[tokio::test]
async fn blank_idempotency_key_is_rejected() {
    let cmd = basic_command("   ");
    let (service, _repo) = build_service(
        StubInventoryClient::reserved_all(&[]),
        StubPaymentClient::always_succeed(),
    );

    let err = service.create_order(cmd).await.expect_err("blank key should fail validation");
    assert!(matches!(err, OrchestratorError::Validation(_)));
}

//! Integration-style tests for the Inventory Engine service layer against
//! in-memory fakes of the repository traits — no live Postgres required
//! (spec §8 "end-to-end scenarios" 1, 2, 3, 5).

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use inventory::{
    InventoryError, InventoryRepository, InventoryService, MovementRepository, ReserveCommand,
    ReserveItem, ReserveOutcome, ReservationRepository,
};
use model::{InventoryRow, Movement, OrderId, ProductId, Reservation, ReservationId, ReservationStatus, Sku, WarehouseId};

#[derive(Default)]
struct FakeInventoryRepo {
    rows: Mutex<HashMap<(String, String), InventoryRow>>,
}

impl FakeInventoryRepo {
    fn seed(self, product: &str, warehouse: &str, on_hand: u32) -> Self {
        self.rows.lock().unwrap().insert(
            (product.to_string(), warehouse.to_string()),
            InventoryRow {
                product_id: ProductId::new(product),
                warehouse: WarehouseId::new(warehouse),
                on_hand,
                reserved: 0,
                updated_at: Utc::now(),
            },
        );
        self
    }
}

#[async_trait]
impl InventoryRepository for FakeInventoryRepo {
    async fn rows_for_products(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<InventoryRow>, InventoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|r| product_ids.contains(&r.product_id))
            .cloned()
            .collect())
    }

    async fn get_row(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<Option<InventoryRow>, InventoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(product_id.as_str().to_string(), warehouse.as_str().to_string()))
            .cloned())
    }

    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<bool, InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&(product_id.as_str().to_string(), warehouse.as_str().to_string())) {
            if row.on_hand - row.reserved >= qty {
                row.reserved += qty;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&(product_id.as_str().to_string(), warehouse.as_str().to_string())) {
            row.reserved = row.reserved.saturating_sub(qty);
        }
        Ok(())
    }

    async fn ship(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&(product_id.as_str().to_string(), warehouse.as_str().to_string())) {
            row.on_hand = row.on_hand.saturating_sub(qty);
            row.reserved = row.reserved.saturating_sub(qty);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeReservationRepo {
    rows: Mutex<HashMap<String, Reservation>>,
}

#[async_trait]
impl ReservationRepository for FakeReservationRepo {
    async fn find_by_key_and_order(
        &self,
        idempotency_key: &str,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.idempotency_key == idempotency_key && &r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_or_get(&self, reservation: &Reservation) -> Result<Reservation, InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        let key = format!(
            "{}:{}:{}",
            reservation.idempotency_key,
            reservation.order_id.as_str(),
            reservation.product_id.as_str()
        );
        Ok(rows.entry(key).or_insert_with(|| reservation.clone()).clone())
    }

    async fn list_active_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| &r.order_id == order_id && r.status == ReservationStatus::Active)
            .cloned()
            .collect())
    }

    async fn transition_active_for_order(
        &self,
        order_id: &OrderId,
        status: ReservationStatus,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        let mut transitioned = Vec::new();
        for r in rows.values_mut() {
            if &r.order_id == order_id && r.status == ReservationStatus::Active {
                r.status = status;
                transitioned.push(r.clone());
            }
        }
        Ok(transitioned)
    }

    async fn confirm_for_order(
        &self,
        order_id: &OrderId,
        reservation_ids: Option<&[ReservationId]>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        let mut confirmed = Vec::new();
        for r in rows.values_mut() {
            let matches_filter = match reservation_ids {
                None => true,
                Some(ids) => ids.contains(&r.id),
            };
            if &r.order_id == order_id && r.status == ReservationStatus::Active && matches_filter {
                r.status = ReservationStatus::Confirmed;
                confirmed.push(r.clone());
            }
        }
        Ok(confirmed)
    }

    async fn list_expired_active(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .cloned()
            .collect())
    }

    async fn mark_expired(&self, id: &ReservationId) -> Result<bool, InventoryError> {
        let mut rows = self.rows.lock().unwrap();
        for r in rows.values_mut() {
            if &r.id == id && r.status == ReservationStatus::Active {
                r.status = ReservationStatus::Expired;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Default)]
struct FakeMovementRepo {
    entries: Mutex<Vec<Movement>>,
}

#[async_trait]
impl MovementRepository for FakeMovementRepo {
    async fn append(&self, movement: &Movement) -> Result<(), InventoryError> {
        self.entries.lock().unwrap().push(movement.clone());
        Ok(())
    }
}

fn service(
    inventory_repo: FakeInventoryRepo,
) -> (InventoryService, Arc<FakeReservationRepo>, Arc<FakeMovementRepo>) {
    let reservation_repo = Arc::new(FakeReservationRepo::default());
    let movement_repo = Arc::new(FakeMovementRepo::default());
    let svc = InventoryService::new(
        Arc::new(inventory_repo),
        reservation_repo.clone(),
        movement_repo.clone(),
        Duration::minutes(15),
        10,
    );
    (svc, reservation_repo, movement_repo)
}

fn item(product: &str, qty: u32) -> ReserveItem {
    ReserveItem {
        product_id: ProductId::new(product),
        quantity: qty,
        sku: Some(Sku::new(format!("SKU-{product}"))),
    }
}

#[tokio::test]
async fn happy_path_reserves_from_single_warehouse() {
    let repo = FakeInventoryRepo::default().seed("1", "WH1", 10).seed("2", "WH1", 5);
    let (svc, _, movements) = service(repo);

    let outcome = svc
        .reserve(ReserveCommand {
            order_id: OrderId::new("o1"),
            idempotency_key: "k1".into(),
            items: vec![item("1", 2), item("2", 1)],
        })
        .await
        .unwrap();

    match outcome {
        ReserveOutcome::Reserved {
            reservations,
            idempotent,
            ..
        } => {
            assert_eq!(reservations.len(), 2);
            assert!(!idempotent);
        }
        other => panic!("expected Reserved, got {other:?}"),
    }
    assert_eq!(movements.entries.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn no_single_warehouse_fits_all_of_one_item_is_partial() {
    let repo = FakeInventoryRepo::default().seed("1", "WH1", 2).seed("1", "WH2", 3);
    let (svc, _, _) = service(repo);

    let outcome = svc
        .reserve(ReserveCommand {
            order_id: OrderId::new("o2"),
            idempotency_key: "k2".into(),
            items: vec![item("1", 4)],
        })
        .await
        .unwrap();

    match outcome {
        ReserveOutcome::Partial { unfulfilled, .. } => {
            assert_eq!(unfulfilled.len(), 1);
            assert_eq!(unfulfilled[0].action_required, "BACKORDER_OR_REDUCE");
        }
        other => panic!("expected Partial, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_reserve_with_same_key_replays_idempotently() {
    let repo = FakeInventoryRepo::default().seed("1", "WH1", 10);
    let (svc, _, _) = service(repo);

    let cmd = ReserveCommand {
        order_id: OrderId::new("o42"),
        idempotency_key: "k2".into(),
        items: vec![item("1", 2)],
    };

    let first = svc.reserve(cmd.clone()).await.unwrap();
    let second = svc.reserve(cmd).await.unwrap();

    let first_ids: Vec<_> = match first {
        ReserveOutcome::Reserved { reservations, .. } => {
            reservations.into_iter().map(|r| r.reservation_id).collect()
        }
        other => panic!("expected Reserved, got {other:?}"),
    };
    match second {
        ReserveOutcome::Reserved {
            reservations,
            idempotent,
            ..
        } => {
            assert!(idempotent);
            let second_ids: Vec<_> = reservations.into_iter().map(|r| r.reservation_id).collect();
            assert_eq!(first_ids, second_ids);
        }
        other => panic!("expected Reserved, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_quantity_is_rejected_without_writes() {
    let repo = FakeInventoryRepo::default().seed("1", "WH1", 10);
    let (svc, _, movements) = service(repo);

    let result = svc
        .reserve(ReserveCommand {
            order_id: OrderId::new("o3"),
            idempotency_key: "k3".into(),
            items: vec![item("1", 0)],
        })
        .await;

    assert!(matches!(result, Err(InventoryError::Validation(_))));
    assert!(movements.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reaper_expires_and_releases_stale_reservations() {
    let repo = FakeInventoryRepo::default().seed("1", "WH1", 10);
    let (svc, reservations, _) = service(repo);

    svc.reserve(ReserveCommand {
        order_id: OrderId::new("o5"),
        idempotency_key: "k5".into(),
        items: vec![item("1", 2)],
    })
    .await
    .unwrap();

    // Force the reservation's expiry into the past.
    {
        let mut rows = reservations.rows.lock().unwrap();
        for r in rows.values_mut() {
            r.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    let report = svc.reap(Utc::now()).await.unwrap();
    assert_eq!(report.expired_count, 1);
}

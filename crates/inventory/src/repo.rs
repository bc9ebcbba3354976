//! Postgres-backed persistence for stock rows, reservations, and the
//! movement ledger (spec §3, §5 "Locking discipline").
//!
//! Each repository method is its own atomic unit (single statement, or a
//! short-lived local transaction for the reserve/release/ship paths that
//! touch more than one table). Per spec §4.2.1 step 5, a reserve call
//! spanning several line items deliberately does NOT wrap all items in one
//! outer transaction — a partial allocation keeps whatever items already
//! committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use model::{
    InventoryRow, Movement, MovementType, OrderId, ProductId, Reservation, ReservationId,
    ReservationStatus, Sku, WarehouseId,
};
use tokio_postgres::Row;

use crate::error::InventoryError;

fn reservation_status_to_str(status: ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Active => "ACTIVE",
        ReservationStatus::Confirmed => "CONFIRMED",
        ReservationStatus::Released => "RELEASED",
        ReservationStatus::Expired => "EXPIRED",
    }
}

fn reservation_status_from_str(value: &str) -> ReservationStatus {
    match value {
        "CONFIRMED" => ReservationStatus::Confirmed,
        "RELEASED" => ReservationStatus::Released,
        "EXPIRED" => ReservationStatus::Expired,
        _ => ReservationStatus::Active,
    }
}

fn movement_type_to_str(kind: MovementType) -> &'static str {
    match kind {
        MovementType::Reserve => "RESERVE",
        MovementType::Release => "RELEASE",
        MovementType::Ship => "SHIP",
    }
}

fn row_to_inventory(row: &Row) -> InventoryRow {
    InventoryRow {
        product_id: ProductId::new(row.get::<_, String>("product_id")),
        warehouse: WarehouseId::new(row.get::<_, String>("warehouse")),
        on_hand: row.get::<_, i32>("on_hand") as u32,
        reserved: row.get::<_, i32>("reserved") as u32,
        updated_at: row.get::<_, DateTime<Utc>>("updated_at"),
    }
}

fn row_to_reservation(row: &Row) -> Reservation {
    Reservation {
        id: ReservationId::new(row.get::<_, String>("id")),
        order_id: OrderId::new(row.get::<_, String>("order_id")),
        product_id: ProductId::new(row.get::<_, String>("product_id")),
        sku: Sku::new(row.get::<_, String>("sku")),
        warehouse: WarehouseId::new(row.get::<_, String>("warehouse")),
        quantity: row.get::<_, i32>("quantity") as u32,
        idempotency_key: row.get("idempotency_key"),
        reserved_at: row.get::<_, DateTime<Utc>>("reserved_at"),
        expires_at: row.get::<_, DateTime<Utc>>("expires_at"),
        status: reservation_status_from_str(row.get::<_, &str>("status")),
    }
}

/// Stock rows: `inventory(product_id, warehouse)` unique key.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// All rows across every warehouse for the given products, used to
    /// rank allocation candidates. Not row-locked — the guarded update in
    /// [`InventoryRepository::try_reserve`] is what actually protects
    /// correctness under concurrency (spec §5).
    async fn rows_for_products(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<InventoryRow>, InventoryError>;

    async fn get_row(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<Option<InventoryRow>, InventoryError>;

    /// Guarded conditional reserve: `reserved += qty` only if
    /// `on_hand - reserved >= qty`. Returns `true` iff the row was
    /// updated (spec §4.2.1 step 3, §5 "guarded UPDATE").
    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<bool, InventoryError>;

    /// Decrements `reserved` by `min(reserved, qty)`, never going negative
    /// (spec §4.2.3).
    async fn release(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError>;

    /// Decrements both `on_hand` and `reserved` by `qty`, clamped at zero
    /// (spec §4.2.4).
    async fn ship(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError>;
}

/// Reservations: unique key `(idempotency_key, order_id, product_id)`.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn find_by_key_and_order(
        &self,
        idempotency_key: &str,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Inserts a new ACTIVE reservation. On a unique-key collision (the
    /// product was already reserved for this order under this key), the
    /// existing row is returned instead of erroring (spec §4.2.1 step 4).
    async fn insert_or_get(&self, reservation: &Reservation) -> Result<Reservation, InventoryError>;

    async fn list_active_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Transitions every ACTIVE reservation for `order_id` to `status`
    /// and returns the rows that were actually transitioned.
    async fn transition_active_for_order(
        &self,
        order_id: &OrderId,
        status: ReservationStatus,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Transitions a specific set of ACTIVE reservations for `order_id`
    /// to CONFIRMED (spec §4.2.2).
    async fn confirm_for_order(
        &self,
        order_id: &OrderId,
        reservation_ids: Option<&[ReservationId]>,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// ACTIVE reservations whose `expires_at` is before `now` (spec
    /// §4.2.5).
    async fn list_expired_active(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Transitions a single reservation ACTIVE -> EXPIRED. Returns `false`
    /// if it was no longer ACTIVE (lost the race to a concurrent confirm
    /// or release — spec §5 "Reaper safety").
    async fn mark_expired(&self, id: &ReservationId) -> Result<bool, InventoryError>;
}

/// Append-only movement ledger.
#[async_trait]
pub trait MovementRepository: Send + Sync {
    async fn append(&self, movement: &Movement) -> Result<(), InventoryError>;
}

pub struct PgInventoryRepository {
    pool: Pool,
}

impl PgInventoryRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn rows_for_products(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<InventoryRow>, InventoryError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.pool.get().await?;
        let ids: Vec<&str> = product_ids.iter().map(ProductId::as_str).collect();
        let rows = client
            .query(
                "SELECT * FROM inventory WHERE product_id = ANY($1)",
                &[&ids],
            )
            .await?;
        Ok(rows.iter().map(row_to_inventory).collect())
    }

    async fn get_row(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<Option<InventoryRow>, InventoryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM inventory WHERE product_id = $1 AND warehouse = $2",
                &[&product_id.as_str(), &warehouse.as_str()],
            )
            .await?;
        Ok(row.as_ref().map(row_to_inventory))
    }

    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<bool, InventoryError> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE inventory
                SET reserved = reserved + $1, updated_at = now()
                WHERE product_id = $2 AND warehouse = $3 AND on_hand - reserved >= $1
                "#,
                &[&(qty as i32), &product_id.as_str(), &warehouse.as_str()],
            )
            .await?;
        Ok(affected == 1)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE inventory
                SET reserved = GREATEST(reserved - $1, 0), updated_at = now()
                WHERE product_id = $2 AND warehouse = $3
                "#,
                &[&(qty as i32), &product_id.as_str(), &warehouse.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn ship(
        &self,
        product_id: &ProductId,
        warehouse: &WarehouseId,
        qty: u32,
    ) -> Result<(), InventoryError> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE inventory
                SET on_hand = GREATEST(on_hand - $1, 0),
                    reserved = GREATEST(reserved - $1, 0),
                    updated_at = now()
                WHERE product_id = $2 AND warehouse = $3
                "#,
                &[&(qty as i32), &product_id.as_str(), &warehouse.as_str()],
            )
            .await?;
        Ok(())
    }
}

pub struct PgReservationRepository {
    pool: Pool,
}

impl PgReservationRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn find_by_key_and_order(
        &self,
        idempotency_key: &str,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM reservations WHERE idempotency_key = $1 AND order_id = $2",
                &[&idempotency_key, &order_id.as_str()],
            )
            .await?;
        Ok(rows.iter().map(row_to_reservation).collect())
    }

    async fn insert_or_get(&self, reservation: &Reservation) -> Result<Reservation, InventoryError> {
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO reservations
                    (id, order_id, product_id, sku, warehouse, quantity, idempotency_key, reserved_at, expires_at, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (idempotency_key, order_id, product_id) DO NOTHING
                "#,
                &[
                    &reservation.id.as_str(),
                    &reservation.order_id.as_str(),
                    &reservation.product_id.as_str(),
                    &reservation.sku.as_str(),
                    &reservation.warehouse.as_str(),
                    &(reservation.quantity as i32),
                    &reservation.idempotency_key,
                    &reservation.reserved_at,
                    &reservation.expires_at,
                    &reservation_status_to_str(reservation.status),
                ],
            )
            .await?;

        if inserted == 1 {
            return Ok(reservation.clone());
        }

        let row = client
            .query_one(
                "SELECT * FROM reservations WHERE idempotency_key = $1 AND order_id = $2 AND product_id = $3",
                &[
                    &reservation.idempotency_key,
                    &reservation.order_id.as_str(),
                    &reservation.product_id.as_str(),
                ],
            )
            .await?;
        Ok(row_to_reservation(&row))
    }

    async fn list_active_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM reservations WHERE order_id = $1 AND status = 'ACTIVE'",
                &[&order_id.as_str()],
            )
            .await?;
        Ok(rows.iter().map(row_to_reservation).collect())
    }

    async fn transition_active_for_order(
        &self,
        order_id: &OrderId,
        status: ReservationStatus,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                UPDATE reservations
                SET status = $1
                WHERE order_id = $2 AND status = 'ACTIVE'
                RETURNING *
                "#,
                &[&reservation_status_to_str(status), &order_id.as_str()],
            )
            .await?;
        Ok(rows.iter().map(row_to_reservation).collect())
    }

    async fn confirm_for_order(
        &self,
        order_id: &OrderId,
        reservation_ids: Option<&[ReservationId]>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let client = self.pool.get().await?;
        let rows = match reservation_ids {
            None => {
                client
                    .query(
                        r#"
                        UPDATE reservations
                        SET status = 'CONFIRMED'
                        WHERE order_id = $1 AND status = 'ACTIVE'
                        RETURNING *
                        "#,
                        &[&order_id.as_str()],
                    )
                    .await?
            }
            Some(ids) => {
                let id_strs: Vec<&str> = ids.iter().map(ReservationId::as_str).collect();
                client
                    .query(
                        r#"
                        UPDATE reservations
                        SET status = 'CONFIRMED'
                        WHERE order_id = $1 AND status = 'ACTIVE' AND id = ANY($2)
                        RETURNING *
                        "#,
                        &[&order_id.as_str(), &id_strs],
                    )
                    .await?
            }
        };
        Ok(rows.iter().map(row_to_reservation).collect())
    }

    async fn list_expired_active(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM reservations WHERE status = 'ACTIVE' AND expires_at < $1",
                &[&now],
            )
            .await?;
        Ok(rows.iter().map(row_to_reservation).collect())
    }

    async fn mark_expired(&self, id: &ReservationId) -> Result<bool, InventoryError> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "UPDATE reservations SET status = 'EXPIRED' WHERE id = $1 AND status = 'ACTIVE'",
                &[&id.as_str()],
            )
            .await?;
        Ok(affected == 1)
    }
}

pub struct PgMovementRepository {
    pool: Pool,
}

impl PgMovementRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovementRepository for PgMovementRepository {
    async fn append(&self, movement: &Movement) -> Result<(), InventoryError> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO movements (product_id, sku, warehouse, movement_type, quantity, order_id, note, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &movement.product_id.as_str(),
                    &movement.sku.as_str(),
                    &movement.warehouse.as_str(),
                    &movement_type_to_str(movement.movement_type),
                    &(movement.quantity as i32),
                    &movement.order_id.as_str(),
                    &movement.note,
                    &movement.created_at,
                ],
            )
            .await?;
        Ok(())
    }
}

//! Inventory Engine service layer (spec §4.2): allocation policy, TTL
//! reservations, and the expiration reaper.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use model::{
    InventoryRow, Movement, MovementType, OrderId, ProductId, Reservation, ReservationId,
    ReservationStatus, Sku, WarehouseId,
};
use tracing::{info, instrument, warn};

use crate::error::InventoryError;
use crate::repo::{InventoryRepository, MovementRepository, ReservationRepository};

/// One requested line of a reserve command.
#[derive(Debug, Clone)]
pub struct ReserveItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub sku: Option<Sku>,
}

#[derive(Debug, Clone)]
pub struct ReserveCommand {
    pub order_id: OrderId,
    pub idempotency_key: String,
    pub items: Vec<ReserveItem>,
}

/// Which allocation policy satisfied a RESERVED outcome (spec §8
/// "allocation_strategy field present").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    SingleWarehouse,
    Split,
}

/// A single reserved line in a RESERVED/PARTIAL response.
#[derive(Debug, Clone)]
pub struct ReservedLine {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub sku: Sku,
    pub warehouse: WarehouseId,
    pub quantity: u32,
}

/// A line that could not be (fully) allocated in a PARTIAL response
/// (spec §4.2.1 "Result").
#[derive(Debug, Clone)]
pub struct UnfulfilledLine {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
    pub action_required: &'static str,
}

#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved {
        reservations: Vec<ReservedLine>,
        expires_at: DateTime<Utc>,
        strategy: AllocationStrategy,
        idempotent: bool,
    },
    Partial {
        reserved: Vec<ReservedLine>,
        unfulfilled: Vec<UnfulfilledLine>,
    },
    DuplicateIdempotencyKey,
}

pub struct InventoryService {
    inventory_repo: Arc<dyn InventoryRepository>,
    reservation_repo: Arc<dyn ReservationRepository>,
    movement_repo: Arc<dyn MovementRepository>,
    reservation_ttl: Duration,
    low_stock_threshold: u32,
}

impl InventoryService {
    pub fn new(
        inventory_repo: Arc<dyn InventoryRepository>,
        reservation_repo: Arc<dyn ReservationRepository>,
        movement_repo: Arc<dyn MovementRepository>,
        reservation_ttl: Duration,
        low_stock_threshold: u32,
    ) -> Self {
        Self {
            inventory_repo,
            reservation_repo,
            movement_repo,
            reservation_ttl,
            low_stock_threshold,
        }
    }

    /// Implements the 5-step reserve algorithm of spec §4.2.1.
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id, idempotency_key = %cmd.idempotency_key))]
    pub async fn reserve(&self, cmd: ReserveCommand) -> Result<ReserveOutcome, InventoryError> {
        if cmd.items.is_empty() {
            return Err(InventoryError::Validation("items must not be empty".into()));
        }
        for item in &cmd.items {
            if item.quantity == 0 {
                return Err(InventoryError::Validation(
                    "quantity must be positive".into(),
                ));
            }
        }

        // Step 1: idempotent replay / duplicate detection.
        let existing = self
            .reservation_repo
            .find_by_key_and_order(&cmd.idempotency_key, &cmd.order_id)
            .await?;
        if !existing.is_empty() {
            let any_active = existing
                .iter()
                .any(|r| r.status == ReservationStatus::Active);
            if any_active {
                let expires_at = existing
                    .iter()
                    .map(|r| r.expires_at)
                    .max()
                    .unwrap_or_else(Utc::now);
                return Ok(ReserveOutcome::Reserved {
                    reservations: existing.iter().map(reservation_to_line).collect(),
                    expires_at,
                    strategy: AllocationStrategy::Split,
                    idempotent: true,
                });
            }
            return Ok(ReserveOutcome::DuplicateIdempotencyKey);
        }

        // Step 2: allocation strategy — single-warehouse-first, else split.
        let product_ids: Vec<ProductId> = cmd.items.iter().map(|i| i.product_id.clone()).collect();
        let rows = self.inventory_repo.rows_for_products(&product_ids).await?;
        let (strategy, winner) = choose_strategy(&cmd.items, &rows);

        let mut reserved_lines = Vec::new();
        let mut unfulfilled = Vec::new();
        let now = Utc::now();
        let expires_at = now + self.reservation_ttl;

        for item in &cmd.items {
            let candidates = candidate_warehouses(&item.product_id, &rows, winner.as_ref());
            let mut placed = false;

            for (warehouse, available) in &candidates {
                if *available < item.quantity {
                    continue;
                }
                // Step 3: guarded conditional update; zero-affected-rows
                // means a concurrent reserver won the race on this row —
                // move on to the next candidate warehouse.
                if !self
                    .inventory_repo
                    .try_reserve(&item.product_id, warehouse, item.quantity)
                    .await?
                {
                    continue;
                }

                // Step 4: persist the reservation + movement.
                let sku = item.sku.clone().unwrap_or_else(|| Sku::new(""));
                let reservation = Reservation {
                    id: ReservationId::generate(),
                    order_id: cmd.order_id.clone(),
                    product_id: item.product_id.clone(),
                    sku: sku.clone(),
                    warehouse: warehouse.clone(),
                    quantity: item.quantity,
                    idempotency_key: cmd.idempotency_key.clone(),
                    reserved_at: now,
                    expires_at,
                    status: ReservationStatus::Active,
                };
                let stored = self.reservation_repo.insert_or_get(&reservation).await?;

                self.movement_repo
                    .append(&Movement {
                        product_id: item.product_id.clone(),
                        sku,
                        warehouse: warehouse.clone(),
                        movement_type: MovementType::Reserve,
                        quantity: item.quantity,
                        order_id: cmd.order_id.clone(),
                        note: "reserve".to_string(),
                        created_at: now,
                    })
                    .await?;

                self.maybe_warn_low_stock(&item.product_id, warehouse, *available - item.quantity);

                reserved_lines.push(reservation_to_line(&stored));
                placed = true;
                break;
            }

            if !placed {
                let best_available = candidates.first().map(|(_, a)| *a).unwrap_or(0);
                unfulfilled.push(UnfulfilledLine {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: best_available,
                    action_required: "BACKORDER_OR_REDUCE",
                });
            }
        }

        if unfulfilled.is_empty() {
            info!(reserved = reserved_lines.len(), "reservation complete");
            Ok(ReserveOutcome::Reserved {
                reservations: reserved_lines,
                expires_at,
                strategy,
                idempotent: false,
            })
        } else {
            Ok(ReserveOutcome::Partial {
                reserved: reserved_lines,
                unfulfilled,
            })
        }
    }

    /// Spec §4.2.2: ACTIVE -> CONFIRMED, optional if the shipment pipeline
    /// accepts ACTIVE reservations directly.
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        order_id: &OrderId,
        reservation_ids: Option<&[ReservationId]>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.reservation_repo
            .confirm_for_order(order_id, reservation_ids)
            .await
    }

    /// Spec §4.2.3: release every ACTIVE reservation for the order.
    /// Idempotent — re-release of an order with no ACTIVE reservations is
    /// a no-op.
    #[instrument(skip(self))]
    pub async fn release(&self, order_id: &OrderId) -> Result<(), InventoryError> {
        let released = self
            .reservation_repo
            .transition_active_for_order(order_id, ReservationStatus::Released)
            .await?;

        for reservation in &released {
            self.inventory_repo
                .release(&reservation.product_id, &reservation.warehouse, reservation.quantity)
                .await?;
            self.movement_repo
                .append(&Movement {
                    product_id: reservation.product_id.clone(),
                    sku: reservation.sku.clone(),
                    warehouse: reservation.warehouse.clone(),
                    movement_type: MovementType::Release,
                    quantity: reservation.quantity,
                    order_id: order_id.clone(),
                    note: "release".to_string(),
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    /// Spec §4.2.4: consume previously reserved stock.
    #[instrument(skip(self, items))]
    pub async fn ship(&self, order_id: &OrderId, items: &[ShipItem]) -> Result<(), InventoryError> {
        for item in items {
            self.inventory_repo
                .ship(&item.product_id, &item.warehouse, item.quantity)
                .await?;
            self.movement_repo
                .append(&Movement {
                    product_id: item.product_id.clone(),
                    sku: item.sku.clone().unwrap_or_else(|| Sku::new("")),
                    warehouse: item.warehouse.clone(),
                    movement_type: MovementType::Ship,
                    quantity: item.quantity,
                    order_id: order_id.clone(),
                    note: "ship".to_string(),
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    /// Spec §4.2.5: garbage-collect expired ACTIVE reservations.
    #[instrument(skip(self))]
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<ReaperReport, InventoryError> {
        let expired = self.reservation_repo.list_expired_active(now).await?;
        let mut released = Vec::new();

        for reservation in &expired {
            // A concurrent confirm may have already moved this reservation
            // out of ACTIVE; mark_expired only succeeds if it is still
            // ACTIVE (spec §5 "Reaper safety").
            if !self.reservation_repo.mark_expired(&reservation.id).await? {
                continue;
            }
            self.inventory_repo
                .release(&reservation.product_id, &reservation.warehouse, reservation.quantity)
                .await?;
            self.movement_repo
                .append(&Movement {
                    product_id: reservation.product_id.clone(),
                    sku: reservation.sku.clone(),
                    warehouse: reservation.warehouse.clone(),
                    movement_type: MovementType::Release,
                    quantity: reservation.quantity,
                    order_id: reservation.order_id.clone(),
                    note: "auto-release: reservation expired".to_string(),
                    created_at: Utc::now(),
                })
                .await?;
            released.push(reservation.id.clone());
        }

        Ok(ReaperReport {
            expired_count: released.len(),
            released_reservations: released,
        })
    }

    fn maybe_warn_low_stock(&self, product_id: &ProductId, warehouse: &WarehouseId, available_after: u32) {
        if available_after < self.low_stock_threshold {
            warn!(
                product_id = %product_id,
                warehouse = %warehouse,
                available = available_after,
                threshold = self.low_stock_threshold,
                "low stock"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShipItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub warehouse: WarehouseId,
    pub sku: Option<Sku>,
}

#[derive(Debug, Clone)]
pub struct ReaperReport {
    pub expired_count: usize,
    pub released_reservations: Vec<ReservationId>,
}

fn reservation_to_line(r: &Reservation) -> ReservedLine {
    ReservedLine {
        reservation_id: r.id.clone(),
        product_id: r.product_id.clone(),
        sku: r.sku.clone(),
        warehouse: r.warehouse.clone(),
        quantity: r.quantity,
    }
}

/// Spec §4.2.1 step 2: prefer a single warehouse that can satisfy every
/// requested item; fall back to splitting item-by-item across whichever
/// warehouse holds the most available stock for that item.
fn choose_strategy(
    items: &[ReserveItem],
    rows: &[InventoryRow],
) -> (AllocationStrategy, Option<WarehouseId>) {
    let mut warehouses: Vec<&WarehouseId> = Vec::new();
    for row in rows {
        if !warehouses.contains(&&row.warehouse) {
            warehouses.push(&row.warehouse);
        }
    }

    for warehouse in warehouses {
        let satisfies_all = items.iter().all(|item| {
            rows.iter()
                .find(|r| &r.warehouse == warehouse && r.product_id == item.product_id)
                .map(|r| r.available() >= item.quantity)
                .unwrap_or(false)
        });
        if satisfies_all {
            return (AllocationStrategy::SingleWarehouse, Some(warehouse.clone()));
        }
    }
    (AllocationStrategy::Split, None)
}

/// Candidate warehouses for one item, sorted by descending available
/// quantity, with the single-warehouse winner (if any) pinned first so
/// every item is tried against it before falling back to the next-best
/// warehouse (spec §4.2.1 step 3's per-row retry).
fn candidate_warehouses(
    product_id: &ProductId,
    rows: &[InventoryRow],
    winner: Option<&WarehouseId>,
) -> Vec<(WarehouseId, u32)> {
    let mut candidates: Vec<(WarehouseId, u32)> = rows
        .iter()
        .filter(|r| &r.product_id == product_id)
        .map(|r| (r.warehouse.clone(), r.available()))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    if let Some(winner) = winner {
        if let Some(pos) = candidates.iter().position(|(w, _)| w == winner) {
            let entry = candidates.remove(pos);
            candidates.insert(0, entry);
        }
    }
    candidates
}

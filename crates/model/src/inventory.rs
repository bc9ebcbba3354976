//! Inventory aggregates: stock rows, reservations, and the movement ledger
//! (spec §3 "InventoryRow", "Reservation", "Movement").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, ProductId, ReservationId, Sku, WarehouseId};

/// Per-(product, warehouse) stock row.
///
/// Invariant: `0 <= reserved <= on_hand` must hold after every committed
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub product_id: ProductId,
    pub warehouse: WarehouseId,
    pub on_hand: u32,
    pub reserved: u32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRow {
    pub fn available(&self) -> u32 {
        self.on_hand.saturating_sub(self.reserved)
    }
}

/// A time-bounded hold on stock for one product at one warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Released,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku: Sku,
    pub warehouse: WarehouseId,
    pub quantity: u32,
    pub idempotency_key: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// Append-only audit entry for a stock change (spec §3 "Movement").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Reserve,
    Release,
    Ship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub product_id: ProductId,
    pub sku: Sku,
    pub warehouse: WarehouseId,
    pub movement_type: MovementType,
    pub quantity: u32,
    pub order_id: OrderId,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

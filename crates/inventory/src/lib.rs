//! Inventory Engine (spec §4.2): multi-warehouse stock, time-bounded
//! reservations, the movement ledger, and the expiration reaper.

pub mod error;
pub mod repo;
pub mod service;

pub use error::InventoryError;
pub use repo::{
    InventoryRepository, MovementRepository, PgInventoryRepository, PgMovementRepository,
    PgReservationRepository, ReservationRepository,
};
pub use service::{
    AllocationStrategy, InventoryService, ReaperReport, ReserveCommand, ReserveItem,
    ReserveOutcome, ReservedLine, ShipItem, UnfulfilledLine,
};

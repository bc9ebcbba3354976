//! Shared domain and wire types for the order orchestrator and inventory
//! engine.
//!
//! This crate holds only plain data: identifiers, aggregates, and their
//! serde representations. No business logic or I/O lives here, matching
//! the role the `model` crate plays in the rest of this workspace.

pub mod error;
pub mod idempotency;
pub mod ids;
pub mod inventory;
pub mod order;
pub mod totals;

pub use error::ErrorEnvelope;
pub use idempotency::IdempotencyRecord;
pub use ids::{
    CustomerId, OrderId, OrderItemId, PaymentId, ProductId, ReservationId, Sku, WarehouseId,
};
pub use inventory::{InventoryRow, Movement, MovementType, Reservation, ReservationStatus};
pub use order::{LineStatus, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus};
pub use totals::Totals;

//! Typed clients for the orchestrator's external collaborators: the
//! Catalog read service and the Payment gateway (spec §4.4, §4.6), plus
//! the client the orchestrator uses to call the sibling Inventory Engine
//! over HTTP (spec §4.1 phase 4).
//!
//! Only the *consuming* side is implemented here — the services
//! themselves are out of scope (spec §1) and are represented purely by
//! their contracts.

pub mod catalog;
pub mod error;
pub mod inventory_client;
pub mod payment;
pub mod stub;

pub use catalog::{CatalogClient, HttpCatalogClient, ProductDetails};
pub use error::ClientError;
pub use inventory_client::{
    HttpInventoryClient, InventoryClient, InventoryClientError, ReserveLineRequest, ReserveOutcome,
    ReservedLine, UnallocatedLine,
};
pub use payment::{ChargeResult, HttpPaymentClient, PaymentClient, PaymentOutcome};

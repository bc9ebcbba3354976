//! Order and order item aggregates (spec §3 "Order", "OrderItem").

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, OrderId, OrderItemId, PaymentId, ProductId, Sku};

/// Order status lifecycle: PENDING -> DELIVERED or PENDING -> CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Delivered,
    Cancelled,
}

/// Payment status as tracked on the order aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// Per-line status, independent of the order's own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Pending,
    Shipped,
    Cancelled,
}

/// The central order aggregate (spec §3 "Order").
///
/// `totals_signature` is the opaque 64-hex-character SHA-256 signature
/// produced by the totals calculator over the order's totals breakdown;
/// it is advisory on the wire and used internally for tamper detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub totals_signature: String,
    pub payment_reference: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

/// A single order line item, with immutable snapshots of price/name/SKU
/// taken at order-creation time (spec §3 "OrderItem").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku: Sku,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub status: LineStatus,
}

/// An order together with its line items and totals breakdown, the shape
/// returned to clients on `POST /v1/orders` and `GET /v1/orders/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub totals: crate::totals::Totals,
}

//! Data repository layer for the order orchestrator's own schema
//! (`orders`, `order_items` — spec §3 "Order", "OrderItem").
//!
//! The Inventory Engine and the Idempotency Store own their own schemas
//! (`crates/inventory`, `crates/idempotency`) — per spec §6 "No shared
//! tables", this crate never reaches across that boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use model::{
    CustomerId, LineStatus, Order, OrderId, OrderItem, OrderItemId, OrderStatus, PaymentId,
    PaymentStatus, ProductId, Sku,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_postgres::Row;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("not found")]
    NotFound,
}

/// An order together with its line items, as read back from storage
/// (totals are recomputed by the caller from these items, not stored
/// redundantly beyond the `total`/`totals_signature` columns).
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

fn order_status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Delivered => "DELIVERED",
        OrderStatus::Cancelled => "CANCELLED",
    }
}

fn order_status_from_str(value: &str) -> OrderStatus {
    match value {
        "DELIVERED" => OrderStatus::Delivered,
        "CANCELLED" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

fn payment_status_to_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Success => "SUCCESS",
        PaymentStatus::Failed => "FAILED",
    }
}

fn payment_status_from_str(value: &str) -> PaymentStatus {
    match value {
        "SUCCESS" => PaymentStatus::Success,
        "FAILED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

fn line_status_to_str(status: LineStatus) -> &'static str {
    match status {
        LineStatus::Pending => "PENDING",
        LineStatus::Shipped => "SHIPPED",
        LineStatus::Cancelled => "CANCELLED",
    }
}

fn line_status_from_str(value: &str) -> LineStatus {
    match value {
        "SHIPPED" => LineStatus::Shipped,
        "CANCELLED" => LineStatus::Cancelled,
        _ => LineStatus::Pending,
    }
}

fn row_to_order(row: &Row) -> Order {
    Order {
        id: OrderId::new(row.get::<_, String>("id")),
        customer_id: CustomerId::new(row.get::<_, String>("customer_id")),
        status: order_status_from_str(row.get::<_, &str>("status")),
        payment_status: payment_status_from_str(row.get::<_, &str>("payment_status")),
        total: row.get::<_, Decimal>("total"),
        totals_signature: row.get("totals_signature"),
        payment_reference: row
            .get::<_, Option<String>>("payment_reference")
            .map(PaymentId::new),
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
    }
}

fn row_to_item(row: &Row) -> OrderItem {
    OrderItem {
        id: OrderItemId::new(row.get::<_, String>("id")),
        order_id: OrderId::new(row.get::<_, String>("order_id")),
        product_id: ProductId::new(row.get::<_, String>("product_id")),
        sku: Sku::new(row.get::<_, String>("sku")),
        product_name: row.get("product_name"),
        quantity: row.get::<_, i32>("quantity") as u32,
        unit_price: row.get::<_, Decimal>("unit_price"),
        tax_rate: row.get::<_, Decimal>("tax_rate"),
        status: line_status_from_str(row.get::<_, &str>("status")),
    }
}

#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Persists a new order and its line items in one local transaction
    /// (spec §4.1 phase 3). Item insertion order matches `items`' order
    /// (spec §4.1 "Ordering & tie-breaks").
    async fn insert_with_items(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: &OrderId) -> Result<OrderRecord, RepositoryError>;

    /// Last `limit` orders, newest first (spec §6 `GET /v1/orders`).
    async fn list_recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError>;

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError>;

    async fn finalize_payment(
        &self,
        id: &OrderId,
        payment_status: PaymentStatus,
        payment_reference: Option<&PaymentId>,
    ) -> Result<(), RepositoryError>;
}

pub struct PgOrdersRepository {
    pool: Pool,
}

impl PgOrdersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert_with_items(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), RepositoryError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO orders (id, customer_id, status, payment_status, total, totals_signature, payment_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            &[
                &order.id.as_str(),
                &order.customer_id.as_str(),
                &order_status_to_str(order.status),
                &payment_status_to_str(order.payment_status),
                &order.total,
                &order.totals_signature,
                &order.payment_reference.as_ref().map(|p| p.as_str()),
                &order.created_at,
            ],
        )
        .await?;

        for item in items {
            tx.execute(
                r#"
                INSERT INTO order_items (id, order_id, product_id, sku, product_name, quantity, unit_price, tax_rate, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                &[
                    &item.id.as_str(),
                    &item.order_id.as_str(),
                    &item.product_id.as_str(),
                    &item.sku.as_str(),
                    &item.product_name,
                    &(item.quantity as i32),
                    &item.unit_price,
                    &item.tax_rate,
                    &line_status_to_str(item.status),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<OrderRecord, RepositoryError> {
        let client = self.pool.get().await?;
        let order_row = client
            .query_opt("SELECT * FROM orders WHERE id = $1", &[&id.as_str()])
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let item_rows = client
            .query(
                "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
                &[&id.as_str()],
            )
            .await?;

        Ok(OrderRecord {
            order: row_to_order(&order_row),
            items: item_rows.iter().map(row_to_item).collect(),
        })
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1",
                &[&limit],
            )
            .await?;
        Ok(rows.iter().map(row_to_order).collect())
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE orders SET status = $1 WHERE id = $2",
                &[&order_status_to_str(status), &id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn finalize_payment(
        &self,
        id: &OrderId,
        payment_status: PaymentStatus,
        payment_reference: Option<&PaymentId>,
    ) -> Result<(), RepositoryError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE orders SET payment_status = $1, payment_reference = $2 WHERE id = $3",
                &[
                    &payment_status_to_str(payment_status),
                    &payment_reference.map(|p| p.as_str()),
                    &id.as_str(),
                ],
            )
            .await?;
        Ok(())
    }
}

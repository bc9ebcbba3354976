//! In-memory, read-through cache of recently created orders (with their
//! items and totals), with thread-safe access. Used by the HTTP surface's
//! `GET /v1/orders/{id}` and `GET /v1/orders` to avoid round-tripping to
//! Postgres on every read (spec §6; the cache itself is ambient
//! infrastructure, not named by the spec, carried over from this
//! workspace's own conventions).

use std::collections::HashMap;
use std::sync::Arc;

use model::{OrderId, OrderWithItems};
use tokio::sync::RwLock;

/// Thread-safe in-memory order cache.
#[derive(Debug, Default)]
pub struct OrderCache {
    inner: Arc<RwLock<HashMap<String, OrderWithItems>>>,
}

impl OrderCache {
    /// Create a new, empty order cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a cloned order by its id (None if not found).
    pub async fn get(&self, order_id: &OrderId) -> Option<OrderWithItems> {
        let map = self.inner.read().await;
        map.get(order_id.as_str()).cloned()
    }

    /// Insert or update an order in the cache.
    pub async fn set(&self, order: OrderWithItems) {
        let mut map = self.inner.write().await;
        map.insert(order.order.id.as_str().to_string(), order);
    }

    /// The `limit` most recently created orders, newest first (spec §6
    /// `GET /v1/orders` "last 50 orders desc by creation").
    pub async fn recent(&self, limit: usize) -> Vec<OrderWithItems> {
        let map = self.inner.read().await;
        let mut all: Vec<OrderWithItems> = map.values().cloned().collect();
        all.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use model::{
        CustomerId, LineStatus, Order, OrderItem, OrderItemId, OrderStatus, PaymentStatus,
        ProductId, Sku, Totals,
    };
    use rust_decimal::Decimal;

    fn sample(id: &str, created_offset_secs: i64) -> OrderWithItems {
        let order = Order {
            id: OrderId::new(id),
            customer_id: CustomerId::new("cust1"),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total: Decimal::new(1000, 2),
            totals_signature: "sig".to_string(),
            payment_reference: None,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
        };
        let item = OrderItem {
            id: OrderItemId::generate(),
            order_id: order.id.clone(),
            product_id: ProductId::new("p1"),
            sku: Sku::new("SKU1"),
            product_name: "Widget".to_string(),
            quantity: 1,
            unit_price: Decimal::new(1000, 2),
            tax_rate: Decimal::new(5, 2),
            status: LineStatus::Pending,
        };
        OrderWithItems {
            order,
            items: vec![item],
            totals: Totals {
                subtotal: Decimal::new(1000, 2),
                tax_rate: Decimal::new(5, 2),
                tax_amount: Decimal::new(50, 2),
                shipping: Decimal::new(1000, 2),
                total: Decimal::new(2050, 2),
                signature: "sig".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn empty_cache_misses() {
        let cache = OrderCache::new();
        assert!(cache.get(&OrderId::new("missing")).await.is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = OrderCache::new();
        cache.set(sample("o1", 0)).await;
        let got = cache.get(&OrderId::new("o1")).await;
        assert_eq!(got.unwrap().order.id, OrderId::new("o1"));
    }

    #[tokio::test]
    async fn recent_orders_sorted_newest_first() {
        let cache = OrderCache::new();
        cache.set(sample("old", -100)).await;
        cache.set(sample("new", 0)).await;
        let recent = cache.recent(10).await;
        assert_eq!(recent[0].order.id, OrderId::new("new"));
        assert_eq!(recent[1].order.id, OrderId::new("old"));
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let cache = OrderCache::new();
        for i in 0..5 {
            cache.set(sample(&format!("o{i}"), i)).await;
        }
        let recent = cache.recent(2).await;
        assert_eq!(recent.len(), 2);
    }
}

//! Composition root for the Order Orchestrator process (spec §2, §6).
//!
//! Wires the Postgres-backed repositories, the HTTP-backed Catalog/
//! Payment/Inventory adapters, and the in-memory read-through cache into
//! an [`orchestrator::OrchestratorService`], then serves it over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use app_config::AppConfig;
use cache::OrderCache;
use clients::{HttpCatalogClient, HttpInventoryClient, HttpPaymentClient};
use idempotency::PgIdempotencyStore;
use orchestrator::OrchestratorService;
use repository::PgOrdersRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::load().context("failed to load configuration")?;
    info!(port = cfg.http_port, "starting orders service");

    let pool = db::init_db_pool(&cfg)
        .await
        .context("failed to initialize database pool")?;

    let orders_repo = Arc::new(PgOrdersRepository::new(pool.clone()));
    let idempotency_store = Arc::new(PgIdempotencyStore::new(pool));
    let catalog = Arc::new(HttpCatalogClient::new(
        cfg.catalog_base_url.clone(),
        cfg.catalog_timeout,
    ));
    let payment = Arc::new(HttpPaymentClient::new(
        cfg.payment_base_url.clone(),
        cfg.payment_timeout,
    ));
    let inventory = Arc::new(HttpInventoryClient::new(
        cfg.inventory_base_url.clone(),
        cfg.inventory_timeout,
    ));

    let metrics = Arc::new(orders_server::Metrics::new());

    let orchestrator = Arc::new(
        OrchestratorService::new(
            orders_repo.clone(),
            idempotency_store,
            catalog,
            payment,
            inventory,
            cfg.tax_rate(),
        )
        .with_reconciliation_sink(metrics.clone()),
    );

    let cache = Arc::new(OrderCache::new());

    let server =
        orders_server::Server::with_metrics(cfg.http_port, orchestrator, cache, orders_repo, metrics);
    server.start().await.context("orders HTTP server exited with an error")
}

//! Composition root for the Inventory Engine process (spec §2, §6).
//!
//! Wires the Postgres-backed inventory/reservation/movement repositories
//! into an [`inventory::InventoryService`], then serves it over HTTP
//! alongside the background reaper task.

use std::sync::Arc;

use anyhow::{Context, Result};
use app_config::AppConfig;
use chrono::Duration as ChronoDuration;
use inventory::{InventoryService, PgInventoryRepository, PgMovementRepository, PgReservationRepository};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::load().context("failed to load configuration")?;
    info!(port = cfg.http_port, "starting inventory service");

    let pool = db::init_db_pool(&cfg)
        .await
        .context("failed to initialize database pool")?;

    let inventory_repo = Arc::new(PgInventoryRepository::new(pool.clone()));
    let reservation_repo = Arc::new(PgReservationRepository::new(pool.clone()));
    let movement_repo = Arc::new(PgMovementRepository::new(pool));

    let reservation_ttl = ChronoDuration::from_std(cfg.reservation_ttl)
        .context("reservation_ttl does not fit in a chrono::Duration")?;

    let service = Arc::new(InventoryService::new(
        inventory_repo,
        reservation_repo,
        movement_repo,
        reservation_ttl,
        cfg.low_stock_threshold as u32,
    ));

    let server = inventory_server::Server::new(cfg.http_port, service, cfg.reaper_interval);
    server.start().await.context("inventory HTTP server exited with an error")
}

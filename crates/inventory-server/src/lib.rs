//! HTTP Surface for the Inventory Engine (spec §6 "HTTP surface —
//! Inventory"): axum router fronting [`inventory::InventoryService`], plus
//! a background periodic reaper task (spec §4.2.5 "externally scheduled,
//! recommended every 5 minutes" — here run as both an HTTP-triggered
//! endpoint and an internal `tokio::time::interval` task, the ambient
//! scheduling glue a real deployment of this would run).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use inventory::{InventoryError, InventoryService, ReserveCommand, ReserveItem, ReserveOutcome, ShipItem};
use model::{ErrorEnvelope, OrderId, ProductId, ReservationId, Sku, WarehouseId};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

pub struct Server {
    state: AppState,
    port: u16,
    reaper_interval: StdDuration,
}

#[derive(Clone)]
struct AppState {
    inventory: Arc<InventoryService>,
    metrics: Arc<Metrics>,
}

struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    reservations_total: CounterVec,
    reaper_expired_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();
        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .unwrap();
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .unwrap();
        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .unwrap();
        let reservations_total = CounterVec::new(
            Opts::new("reservations_total", "Total number of reserve outcomes"),
            &["outcome"],
        )
        .unwrap();
        let reaper_expired_total = CounterVec::new(
            Opts::new(
                "reaper_expired_total",
                "Total number of reservations expired by the reaper",
            ),
            &["trigger"],
        )
        .unwrap();

        registry.register(Box::new(http_requests_total.clone())).unwrap();
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();
        registry.register(Box::new(reservations_total.clone())).unwrap();
        registry.register(Box::new(reaper_expired_total.clone())).unwrap();

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            reservations_total,
            reaper_expired_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: StdDuration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
        if status >= 400 {
            self.errors_total.with_label_values(&["http", endpoint]).inc();
        }
    }
}

impl Server {
    pub fn new(port: u16, inventory: Arc<InventoryService>, reaper_interval: StdDuration) -> Self {
        Self {
            state: AppState {
                inventory,
                metrics: Arc::new(Metrics::new()),
            },
            port,
            reaper_interval,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("failed to bind inventory-server port")?;

        info!(port = self.port, "inventory HTTP server listening");

        let reaper_state = self.state.clone();
        let reaper_interval = self.reaper_interval;
        let reaper_handle = tokio::spawn(async move {
            run_background_reaper(reaper_state, reaper_interval).await;
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("inventory HTTP server error")?;

        reaper_handle.abort();
        info!("inventory HTTP server shut down gracefully");
        Ok(())
    }

    fn router(&self) -> Router {
        let metrics = self.state.metrics.clone();

        Router::new()
            .route("/v1/inventory/reserve", post(reserve))
            .route("/v1/inventory/reserve/confirm", post(confirm))
            .route("/v1/inventory/release", post(release))
            .route("/v1/inventory/ship", post(ship))
            .route("/v1/inventory/reaper/expired", post(reap_now))
            .route("/health", get(health))
            .route("/metrics", get(metrics_handler))
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                metrics_middleware,
            ))
            .with_state(self.state.clone())
    }
}

/// Internal periodic sweep (spec §4.2.5 "recommended every 5 minutes" —
/// configurable via `reaper_interval`).
async fn run_background_reaper(state: AppState, interval: StdDuration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match state.inventory.reap(Utc::now()).await {
            Ok(report) => {
                if report.expired_count > 0 {
                    info!(expired = report.expired_count, "background reaper swept expired reservations");
                    state
                        .metrics
                        .reaper_expired_total
                        .with_label_values(&["interval"])
                        .inc_by(report.expired_count as f64);
                }
            }
            Err(e) => error!(error = %e, "background reaper sweep failed"),
        }
    }
}

async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    metrics.record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveItemHttp {
    product_id: ProductId,
    qty: u32,
    sku: Option<Sku>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveRequest {
    order_id: OrderId,
    items: Vec<ReserveItemHttp>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservedItemHttp {
    product_id: ProductId,
    sku: Sku,
    warehouse: WarehouseId,
    reservation_id: ReservationId,
    qty_reserved: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnfulfilledItemHttp {
    product_id: ProductId,
    requested: u32,
    available: u32,
    action_required: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReserveLineHttp {
    Reserved(ReservedItemHttp),
    Unfulfilled(UnfulfilledItemHttp),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReserveResponse {
    status: &'static str,
    order_id: OrderId,
    items: Vec<ReserveLineHttp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<chrono::DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allocation_strategy: Option<&'static str>,
}

async fn reserve(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let idempotency_key = match headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        Some(key) if !key.trim().is_empty() => key,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new("VALIDATION_ERROR", "Idempotency-Key header is required"),
            )
        }
    };

    let request: ReserveRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new("VALIDATION_ERROR", format!("invalid request body: {e}")),
            )
        }
    };

    let order_id = request.order_id;
    let cmd = ReserveCommand {
        order_id: order_id.clone(),
        idempotency_key,
        items: request
            .items
            .into_iter()
            .map(|item| ReserveItem {
                product_id: item.product_id,
                quantity: item.qty,
                sku: item.sku,
            })
            .collect(),
    };

    match state.inventory.reserve(cmd).await {
        Ok(ReserveOutcome::Reserved {
            reservations,
            expires_at,
            strategy,
            idempotent,
        }) => {
            state
                .metrics
                .reservations_total
                .with_label_values(&["reserved"])
                .inc();
            let items = reservations
                .into_iter()
                .map(|r| {
                    ReserveLineHttp::Reserved(ReservedItemHttp {
                        product_id: r.product_id,
                        sku: r.sku,
                        warehouse: r.warehouse,
                        reservation_id: r.reservation_id,
                        qty_reserved: r.quantity,
                    })
                })
                .collect();
            (
                StatusCode::OK,
                Json(ReserveResponse {
                    status: "RESERVED",
                    order_id,
                    items,
                    expires_at: Some(expires_at),
                    idempotent: Some(idempotent),
                    allocation_strategy: Some(match strategy {
                        inventory::AllocationStrategy::SingleWarehouse => "SINGLE_WAREHOUSE",
                        inventory::AllocationStrategy::Split => "SPLIT",
                    }),
                }),
            )
                .into_response()
        }
        Ok(ReserveOutcome::Partial { reserved, unfulfilled }) => {
            state
                .metrics
                .reservations_total
                .with_label_values(&["partial"])
                .inc();
            let mut items: Vec<ReserveLineHttp> = reserved
                .into_iter()
                .map(|r| {
                    ReserveLineHttp::Reserved(ReservedItemHttp {
                        product_id: r.product_id,
                        sku: r.sku,
                        warehouse: r.warehouse,
                        reservation_id: r.reservation_id,
                        qty_reserved: r.quantity,
                    })
                })
                .collect();
            items.extend(unfulfilled.into_iter().map(|u| {
                ReserveLineHttp::Unfulfilled(UnfulfilledItemHttp {
                    product_id: u.product_id,
                    requested: u.requested,
                    available: u.available,
                    action_required: u.action_required,
                })
            }));
            (
                StatusCode::OK,
                Json(ReserveResponse {
                    status: "PARTIAL",
                    order_id,
                    items,
                    expires_at: None,
                    idempotent: None,
                    allocation_strategy: None,
                }),
            )
                .into_response()
        }
        Ok(ReserveOutcome::DuplicateIdempotencyKey) => error_response(
            StatusCode::CONFLICT,
            ErrorEnvelope::new("DUPLICATE_IDEMPOTENCY_KEY", "a reservation already exists for this idempotency key")
                .with_order_id(order_id),
        ),
        Err(InventoryError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, ErrorEnvelope::new("VALIDATION_ERROR", msg))
        }
        Err(e) => {
            error!(error = %e, "reserve failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "reserve failed"),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    order_id: OrderId,
    reservation_ids: Option<Vec<ReservationId>>,
}

async fn confirm(State(state): State<AppState>, Json(request): Json<ConfirmRequest>) -> Response {
    match state
        .inventory
        .confirm(&request.order_id, request.reservation_ids.as_deref())
        .await
    {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "CONFIRMED" }))).into_response(),
        Err(e) => {
            error!(error = %e, "confirm failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "confirm failed"),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseRequest {
    order_id: OrderId,
}

async fn release(State(state): State<AppState>, Json(request): Json<ReleaseRequest>) -> Response {
    match state.inventory.release(&request.order_id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "RELEASED" }))).into_response(),
        Err(e) => {
            error!(error = %e, "release failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "release failed"),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipItemHttp {
    product_id: ProductId,
    qty: u32,
    warehouse: WarehouseId,
    sku: Option<Sku>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipRequest {
    order_id: OrderId,
    items: Vec<ShipItemHttp>,
}

async fn ship(State(state): State<AppState>, Json(request): Json<ShipRequest>) -> Response {
    let items: Vec<ShipItem> = request
        .items
        .into_iter()
        .map(|item| ShipItem {
            product_id: item.product_id,
            quantity: item.qty,
            warehouse: item.warehouse,
            sku: item.sku,
        })
        .collect();

    match state.inventory.ship(&request.order_id, &items).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "SHIPPED" }))).into_response(),
        Err(e) => {
            error!(error = %e, "ship failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "ship failed"),
            )
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReaperResponse {
    status: &'static str,
    expired_count: usize,
    released_reservations: Vec<ReservationId>,
}

/// `POST /v1/inventory/reaper/expired` (spec §6) — manual/externally
/// scheduled trigger, in addition to the internal periodic task.
async fn reap_now(State(state): State<AppState>) -> Response {
    match state.inventory.reap(Utc::now()).await {
        Ok(report) => {
            state
                .metrics
                .reaper_expired_total
                .with_label_values(&["http"])
                .inc_by(report.expired_count as f64);
            (
                StatusCode::OK,
                Json(ReaperResponse {
                    status: "PROCESSED",
                    expired_count: report.expired_count,
                    released_reservations: report.released_reservations,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "reaper sweep failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "reaper sweep failed"),
            )
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (StatusCode::OK, buffer).into_response()
}

fn error_response(status: StatusCode, envelope: ErrorEnvelope) -> Response {
    (status, Json(envelope)).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

//! HTTP Surface for the Order Orchestrator (spec §6 "HTTP surface —
//! Orchestrator"): a thin axum router that validates payloads, extracts
//! the idempotency header, and delegates to [`orchestrator::OrchestratorService`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cache::OrderCache;
use model::{CustomerId, ErrorEnvelope, ProductId, Sku};
use orchestrator::{CreateOrderCommand, CreateOrderItem, OrchestratorError, OrchestratorService};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use repository::OrdersRepository;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Server for the Order Orchestrator's HTTP surface.
pub struct Server {
    state: AppState,
    port: u16,
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<OrchestratorService>,
    cache: Arc<OrderCache>,
    orders_repo: Arc<dyn OrdersRepository>,
    metrics: Arc<Metrics>,
}

/// Request/saga-level metrics for the orders HTTP surface. Public so the
/// composition root can build one before the [`OrchestratorService`] it
/// wires into, and attach it as that service's
/// [`orchestrator::ReconciliationSink`] (spec §4.1 "Compensation
/// failure").
pub struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    saga_compensations_total: CounterVec,
    compensation_failures_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("metric registration is infallible for a well-formed Opts");
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .expect("metric registration is infallible for a well-formed Opts");
        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .expect("metric registration is infallible for a well-formed Opts");
        let saga_compensations_total = CounterVec::new(
            Opts::new(
                "saga_compensations_total",
                "Total number of create-order sagas that triggered compensation",
            ),
            &["reason"],
        )
        .expect("metric registration is infallible for a well-formed Opts");
        let compensation_failures_total = CounterVec::new(
            Opts::new(
                "compensation_failures_total",
                "Total number of compensation steps that themselves failed (reconciliation required)",
            ),
            &["step"],
        )
        .expect("metric registration is infallible for a well-formed Opts");

        registry.register(Box::new(http_requests_total.clone())).unwrap();
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();
        registry
            .register(Box::new(saga_compensations_total.clone()))
            .unwrap();
        registry
            .register(Box::new(compensation_failures_total.clone()))
            .unwrap();

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            saga_compensations_total,
            compensation_failures_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl orchestrator::ReconciliationSink for Metrics {
    fn record_compensation_failure(&self, order_id: &model::OrderId, step: &str) {
        warn!(order_id = %order_id, step, "reconciliation required: compensation step failed");
        self.compensation_failures_total.with_label_values(&[step]).inc();
    }
}

impl Server {
    /// Builds the server with its own freshly-constructed `Metrics`. Use
    /// [`Server::with_metrics`] instead when the composition root needs
    /// to attach the same `Metrics` to the orchestrator as a
    /// [`orchestrator::ReconciliationSink`] before building this server.
    pub fn new(
        port: u16,
        orchestrator: Arc<OrchestratorService>,
        cache: Arc<OrderCache>,
        orders_repo: Arc<dyn OrdersRepository>,
    ) -> Self {
        Self::with_metrics(port, orchestrator, cache, orders_repo, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(
        port: u16,
        orchestrator: Arc<OrchestratorService>,
        cache: Arc<OrderCache>,
        orders_repo: Arc<dyn OrdersRepository>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state: AppState {
                orchestrator,
                cache,
                orders_repo,
                metrics,
            },
            port,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("failed to bind orders-server port")?;

        info!(port = self.port, "orders HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("orders HTTP server error")?;

        info!("orders HTTP server shut down gracefully");
        Ok(())
    }

    fn router(&self) -> Router {
        let metrics = self.state.metrics.clone();

        Router::new()
            .route("/v1/orders", post(create_order).get(list_orders))
            .route("/v1/orders/{id}", get(get_order))
            .route("/health", get(health))
            .route("/metrics", get(metrics_handler))
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                metrics_middleware,
            ))
            .with_state(self.state.clone())
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
struct CreateOrderItemHttp {
    product_id: ProductId,
    quantity: u32,
    sku: Option<Sku>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    customer_id: CustomerId,
    items: Vec<CreateOrderItemHttp>,
    payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrdersListResponse<'a> {
    orders: &'a [model::Order],
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
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

    let request: CreateOrderRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new("VALIDATION_ERROR", format!("invalid request body: {e}")),
            )
        }
    };

    let body_hash = idempotency::hash_request_body(&body);

    let cmd = CreateOrderCommand {
        customer_id: request.customer_id,
        items: request
            .items
            .into_iter()
            .map(|item| CreateOrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                sku: item.sku,
            })
            .collect(),
        idempotency_key,
        payment_method: request.payment_method,
        body_hash,
    };

    match state.orchestrator.create_order(cmd).await {
        Ok(order) => {
            state.cache.set(order.clone()).await;
            (StatusCode::CREATED, Json(order)).into_response()
        }
        Err(err) => {
            if matches!(
                err,
                OrchestratorError::OrderCreationFailed { .. } | OrchestratorError::TotalsTampered { .. }
            ) {
                state
                    .metrics
                    .saga_compensations_total
                    .with_label_values(&[err.code()])
                    .inc();
            }
            warn!(error = %err, "create_order failed");
            let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, err.envelope())
        }
    }
}

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let order_id = model::OrderId::new(id);

    if let Some(order) = state.cache.get(&order_id).await {
        return (StatusCode::OK, Json(order)).into_response();
    }

    match state.orders_repo.get_by_id(&order_id).await {
        Ok(record) => {
            let totals_opts = totals::TotalsOptions {
                tax_rate: record
                    .items
                    .first()
                    .map(|i| i.tax_rate)
                    .unwrap_or_default(),
                shipping: None,
            };
            let line_inputs: Vec<totals::LineInput> = record
                .items
                .iter()
                .map(|i| totals::LineInput {
                    product_id: i.product_id.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect();
            let computed = totals::compute(&line_inputs, &totals_opts);
            let order_with_items = model::OrderWithItems {
                order: record.order,
                items: record.items,
                totals: computed,
            };
            state.cache.set(order_with_items.clone()).await;
            (StatusCode::OK, Json(order_with_items)).into_response()
        }
        Err(repository::RepositoryError::NotFound) => error_response(
            StatusCode::NOT_FOUND,
            ErrorEnvelope::new("NOT_FOUND", "order not found"),
        ),
        Err(e) => {
            error!(error = %e, "failed to load order");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "failed to load order"),
            )
        }
    }
}

/// `GET /v1/orders` — last 50 orders, newest first (spec §6).
async fn list_orders(State(state): State<AppState>) -> Response {
    let cached = state.cache.recent(50).await;
    if !cached.is_empty() {
        let orders: Vec<model::Order> = cached.into_iter().map(|o| o.order).collect();
        return (StatusCode::OK, Json(OrdersListResponse { orders: &orders })).into_response();
    }

    match state.orders_repo.list_recent(50).await {
        Ok(orders) => (StatusCode::OK, Json(OrdersListResponse { orders: &orders })).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list recent orders");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::new("INTERNAL_ERROR", "failed to list orders"),
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

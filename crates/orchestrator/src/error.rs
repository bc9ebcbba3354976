use model::{ErrorEnvelope, OrderId};
use thiserror::Error;

/// Saga-level error kinds (spec §7 "Error kinds"). Each variant carries
/// enough to build the wire [`ErrorEnvelope`] and pick an HTTP status at
/// the server layer. `order_id` is populated whenever the failure occurs
/// after phase 3 has persisted the order (spec §4.1 "Output contract":
/// "when the order record was created before the failure, its
/// identifier").
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("idempotency conflict")]
    IdempotencyConflict,
    #[error("pricing failed: {0}")]
    PricingFailed(String),
    #[error("order creation failed: {message}")]
    OrderCreationFailed { message: String, order_id: Option<OrderId> },
    #[error("totals signature mismatch")]
    TotalsTampered { order_id: Option<OrderId> },
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// HTTP status this error maps to (spec §6, §7).
    pub fn status_code(&self) -> u16 {
        match self {
            OrchestratorError::Validation(_) => 400,
            OrchestratorError::IdempotencyConflict => 409,
            OrchestratorError::PricingFailed(_) => 500,
            OrchestratorError::OrderCreationFailed { .. } => 500,
            OrchestratorError::TotalsTampered { .. } => 500,
            OrchestratorError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code for the wire envelope (spec §6
    /// "Error envelope").
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "VALIDATION_ERROR",
            OrchestratorError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            OrchestratorError::PricingFailed(_) => "PRICING_FAILED",
            OrchestratorError::OrderCreationFailed { .. } => "ORDER_CREATION_FAILED",
            OrchestratorError::TotalsTampered { .. } => "TOTALS_TAMPERED",
            OrchestratorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The order identifier this failure pertains to, if the order was
    /// already persisted when it occurred.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            OrchestratorError::OrderCreationFailed { order_id, .. } => order_id.as_ref(),
            OrchestratorError::TotalsTampered { order_id } => order_id.as_ref(),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let mut envelope = ErrorEnvelope::new(self.code(), self.to_string());
        if let Some(id) = self.order_id() {
            envelope = envelope.with_order_id(id.clone());
        }
        envelope
    }
}

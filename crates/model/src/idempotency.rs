//! Idempotency record (spec §3 "IdempotencyRecord", §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted idempotency record, keyed by the client-supplied key.
///
/// Invariant: once `response_status` is `Some` (finalized), the record is
/// immutable — callers must never update a finalized record in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub resource_path: String,
    pub request_body_hash: String,
    pub response_status: Option<u16>,
    pub response_body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_finalized(&self) -> bool {
        self.response_status.is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.response_status, Some(status) if (200..300).contains(&status))
    }
}

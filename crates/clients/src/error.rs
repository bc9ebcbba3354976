//! Typed client errors (spec §4.4 "The adapter surfaces typed errors to
//! the orchestrator; it does not retry").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned non-success status {0}")]
    NonSuccess(u16),
    #[error("missing entry: {0}")]
    MissingEntry(String),
    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

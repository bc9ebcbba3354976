//! Idempotency Store (spec §4.3).
//!
//! Persists client-supplied idempotency keys with pending/finalized
//! response envelopes, so `POST /v1/orders` (and the inventory reserve
//! endpoint) can be safely retried by the client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use model::IdempotencyRecord;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// SHA-256 hex digest of a raw request body, stored on the
/// [`IdempotencyRecord`] for auditing only (spec §4.3 "Policy": it does
/// not gate replay).
pub fn hash_request_body(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("record for key was already finalized")]
    AlreadyFinalized,
}

/// Outcome of a non-blocking acquire attempt (spec §4.3 "Contract").
#[derive(Debug, Clone)]
pub enum Acquired {
    /// No record existed; a new pending record was inserted.
    Created,
    /// A finalized record already exists; replay its response verbatim.
    Replay {
        status: u16,
        body: serde_json::Value,
    },
    /// A record exists that is either still pending, or finalized with a
    /// non-2xx status — the caller must reject with 409.
    Conflict(ConflictState),
}

#[derive(Debug, Clone)]
pub enum ConflictState {
    Pending,
    FinalizedNonSuccess { status: u16 },
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Attempts to claim `key` for `resource_path`. The request body hash
    /// is recorded for auditing only; it does not gate replay (spec
    /// §4.3 "Policy": mismatched bodies on the same key are not rejected).
    async fn acquire(
        &self,
        key: &str,
        resource_path: &str,
        body_hash: &str,
    ) -> Result<Acquired, IdempotencyError>;

    /// Finalizes a previously-acquired pending record exactly once.
    /// Finalizing an already-finalized record returns
    /// [`IdempotencyError::AlreadyFinalized`]; callers should log and
    /// swallow this rather than propagate it (spec §4.3).
    async fn finalize(
        &self,
        key: &str,
        status: u16,
        body: &serde_json::Value,
    ) -> Result<(), IdempotencyError>;

    /// Reads back the current record for a key, if any.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;
}

/// PostgreSQL-backed idempotency store. No TTL: records persist
/// indefinitely under operator-managed retention (spec §4.3 "Policy").
pub struct PgIdempotencyStore {
    pool: Pool,
}

impl PgIdempotencyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &tokio_postgres::Row) -> IdempotencyRecord {
    IdempotencyRecord {
        key: row.get("key"),
        resource_path: row.get("resource_path"),
        request_body_hash: row.get("request_body_hash"),
        response_status: row
            .get::<_, Option<i32>>("response_status")
            .map(|v| v as u16),
        response_body: row.get("response_body"),
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn acquire(
        &self,
        key: &str,
        resource_path: &str,
        body_hash: &str,
    ) -> Result<Acquired, IdempotencyError> {
        let client = self.pool.get().await?;

        let inserted = client
            .execute(
                r#"
                INSERT INTO idempotency_keys (key, resource_path, request_body_hash, created_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (key) DO NOTHING
                "#,
                &[&key, &resource_path, &body_hash],
            )
            .await?;

        if inserted == 1 {
            return Ok(Acquired::Created);
        }

        let row = client
            .query_one(
                r#"
                SELECT key, resource_path, request_body_hash, response_status, response_body, created_at
                FROM idempotency_keys WHERE key = $1
                "#,
                &[&key],
            )
            .await?;
        let record = row_to_record(&row);

        match record.response_status {
            None => Ok(Acquired::Conflict(ConflictState::Pending)),
            Some(status) if (200..300).contains(&status) => Ok(Acquired::Replay {
                status,
                body: record.response_body.unwrap_or(serde_json::Value::Null),
            }),
            Some(status) => Ok(Acquired::Conflict(ConflictState::FinalizedNonSuccess {
                status,
            })),
        }
    }

    async fn finalize(
        &self,
        key: &str,
        status: u16,
        body: &serde_json::Value,
    ) -> Result<(), IdempotencyError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE idempotency_keys
                SET response_status = $1, response_body = $2
                WHERE key = $3 AND response_status IS NULL
                "#,
                &[&(status as i32), body, &key],
            )
            .await?;

        if updated == 0 {
            return Err(IdempotencyError::AlreadyFinalized);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT key, resource_path, request_body_hash, response_status, response_body, created_at
                FROM idempotency_keys WHERE key = $1
                "#,
                &[&key],
            )
            .await?;
        Ok(row.as_ref().map(row_to_record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store for exercising acquire/finalize semantics without a
    /// live Postgres instance.
    #[derive(Default)]
    pub struct InMemoryIdempotencyStore {
        records: Mutex<HashMap<String, IdempotencyRecord>>,
    }

    #[async_trait]
    impl IdempotencyStore for InMemoryIdempotencyStore {
        async fn acquire(
            &self,
            key: &str,
            resource_path: &str,
            body_hash: &str,
        ) -> Result<Acquired, IdempotencyError> {
            let mut records = self.records.lock().unwrap();
            if let Some(existing) = records.get(key) {
                return Ok(match existing.response_status {
                    None => Acquired::Conflict(ConflictState::Pending),
                    Some(status) if (200..300).contains(&status) => Acquired::Replay {
                        status,
                        body: existing
                            .response_body
                            .clone()
                            .unwrap_or(serde_json::Value::Null),
                    },
                    Some(status) => {
                        Acquired::Conflict(ConflictState::FinalizedNonSuccess { status })
                    }
                });
            }
            records.insert(
                key.to_string(),
                IdempotencyRecord {
                    key: key.to_string(),
                    resource_path: resource_path.to_string(),
                    request_body_hash: body_hash.to_string(),
                    response_status: None,
                    response_body: None,
                    created_at: Utc::now(),
                },
            );
            Ok(Acquired::Created)
        }

        async fn finalize(
            &self,
            key: &str,
            status: u16,
            body: &serde_json::Value,
        ) -> Result<(), IdempotencyError> {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(key) {
                Some(record) if record.response_status.is_none() => {
                    record.response_status = Some(status);
                    record.response_body = Some(body.clone());
                    Ok(())
                }
                Some(_) => Err(IdempotencyError::AlreadyFinalized),
                None => Err(IdempotencyError::AlreadyFinalized),
            }
        }

        async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
            Ok(self.records.lock().unwrap().get(key).cloned())
        }
    }

    #[tokio::test]
    async fn first_acquire_creates_pending_record() {
        let store = InMemoryIdempotencyStore::default();
        let result = store.acquire("k1", "/v1/orders", "hash").await.unwrap();
        assert!(matches!(result, Acquired::Created));
    }

    #[tokio::test]
    async fn second_acquire_while_pending_is_conflict() {
        let store = InMemoryIdempotencyStore::default();
        store.acquire("k1", "/v1/orders", "hash").await.unwrap();
        let result = store.acquire("k1", "/v1/orders", "hash2").await.unwrap();
        assert!(matches!(
            result,
            Acquired::Conflict(ConflictState::Pending)
        ));
    }

    #[tokio::test]
    async fn acquire_after_success_finalize_replays() {
        let store = InMemoryIdempotencyStore::default();
        store.acquire("k1", "/v1/orders", "hash").await.unwrap();
        store
            .finalize("k1", 201, &serde_json::json!({"id": "o1"}))
            .await
            .unwrap();

        let result = store.acquire("k1", "/v1/orders", "different").await.unwrap();
        match result {
            Acquired::Replay { status, body } => {
                assert_eq!(status, 201);
                assert_eq!(body, serde_json::json!({"id": "o1"}));
            }
            other => panic!("expected replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finalize_twice_errors() {
        let store = InMemoryIdempotencyStore::default();
        store.acquire("k1", "/v1/orders", "hash").await.unwrap();
        store.finalize("k1", 201, &serde_json::json!({})).await.unwrap();
        let second = store.finalize("k1", 201, &serde_json::json!({})).await;
        assert!(matches!(second, Err(IdempotencyError::AlreadyFinalized)));
    }
}

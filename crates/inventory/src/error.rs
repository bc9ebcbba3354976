use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("validation error: {0}")]
    Validation(String),
}

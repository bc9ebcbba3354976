//! Database initialization and migration logic shared by the orders and
//! inventory services.
//!
//! Provides `init_db_pool` for creating a connection pool and
//! auto-applying SQL migrations from a service-specific migrations
//! directory (spec §6 "No shared tables" — each service runs its own
//! migration set against its own schema, even though both may point at
//! the same Postgres instance in local/dev deployments).

use anyhow::{Context, Result};
use app_config::AppConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::fs;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::info;

/// Initializes the database connection pool and runs the migrations found
/// under `cfg.migrations_dir`.
///
/// # Errors
/// Returns an error if the pool cannot be created, if no connection can
/// be obtained after retrying, or if a migration fails to apply.
pub async fn init_db_pool(cfg: &AppConfig) -> Result<Pool> {
    let dsn = format!(
        "host={} port={} user={} password={} dbname={} sslmode=disable",
        cfg.db_host, cfg.db_port, cfg.db_user, cfg.db_password, cfg.db_name
    );

    let pg_config: PgConfig = dsn.parse().context("Failed to parse Postgres DSN")?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(16)
        .runtime(Runtime::Tokio1)
        .build()
        .context("Failed to create database pool")?;

    // Try to get a connection with retries
    let max_retries = 5;
    let mut retry_count = 0;
    let mut last_error = None;

    while retry_count < max_retries {
        match pool.get().await {
            Ok(client) => {
                info!(
                    "Successfully connected to database after {} retries",
                    retry_count
                );

                if tokio::fs::metadata(&cfg.migrations_dir).await.is_ok() {
                    info!("Using migrations directory: {}", cfg.migrations_dir);
                    run_migrations(&client, &cfg.migrations_dir).await?;
                } else {
                    info!(
                        "Migrations directory {} not found, skipping migrations",
                        cfg.migrations_dir
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                last_error = Some(e);
                info!(
                    "Failed to connect to database (attempt {}/{}), retrying in 1 second...",
                    retry_count, max_retries
                );
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    // If we get here, all retries failed
    Err(anyhow::anyhow!(
        "Failed to get DB connection after {} retries: {:?}",
        max_retries,
        last_error.unwrap()
    ))
}

/// Applies all `.sql` migration files from `migrations_dir`, in filename
/// order, to the provided client.
///
/// # Errors
/// Returns an error if migration files cannot be read or applied.
pub async fn run_migrations(client: &Client, migrations_dir: &str) -> Result<()> {
    let mut entries = fs::read_dir(migrations_dir)
        .await
        .context("Failed to read migrations directory")?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let file_name = path.file_name().unwrap().to_string_lossy();
        info!("Applying migration: {}", file_name);
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {file_name}"))?;

        client
            .batch_execute(&content)
            .await
            .with_context(|| format!("Failed to execute migration {file_name}"))?;
    }
    Ok(())
}

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// `AppConfig` holds all configuration parameters required by either the
/// orders service or the inventory service.
///
/// Both binaries (`app-orders`, `app-inventory`) load an instance of this
/// same struct from their own environment (optionally via a `.env` file);
/// each process only reads the fields relevant to it, the rest simply take
/// their defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Directory of `.sql` migration files this process applies on startup.
    /// The orders and inventory services point this at disjoint
    /// directories — neither owns the other's schema.
    pub migrations_dir: String,

    // --- HTTP server ---
    /// The port on which this process's HTTP server will listen.
    pub http_port: u16,

    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    // --- Outbound adapters (orders service) ---
    /// Base URL of the Catalog service.
    pub catalog_base_url: String,
    /// Per-request timeout for Catalog calls.
    #[serde(deserialize_with = "deserialize_duration")]
    pub catalog_timeout: Duration,
    /// Base URL of the Payment service.
    pub payment_base_url: String,
    /// Per-request timeout for Payment calls.
    #[serde(deserialize_with = "deserialize_duration")]
    pub payment_timeout: Duration,
    /// Base URL of the Inventory Engine's HTTP surface.
    pub inventory_base_url: String,
    /// Per-request timeout for Inventory calls.
    #[serde(deserialize_with = "deserialize_duration")]
    pub inventory_timeout: Duration,

    // --- Totals calculator ---
    /// Sales tax rate applied to the subtotal, expressed in basis points
    /// (500 = 5.00%) so the value survives a round trip through the
    /// config source exactly, without a float.
    pub tax_rate_bps: u32,

    // --- Inventory engine ---
    /// How long an unconfirmed reservation holds stock before the reaper
    /// releases it back to available.
    #[serde(deserialize_with = "deserialize_duration")]
    pub reservation_ttl: Duration,
    /// Available-quantity threshold below which the low-stock signal
    /// fires for a SKU.
    pub low_stock_threshold: i64,
    /// How often the reservation reaper sweeps for expired reservations.
    #[serde(deserialize_with = "deserialize_duration")]
    pub reaper_interval: Duration,
}

impl AppConfig {
    /// The sales tax rate as a [`Decimal`] (e.g. `0.0500` for 500 bps).
    pub fn tax_rate(&self) -> Decimal {
        Decimal::new(self.tax_rate_bps as i64, 4)
    }
}

/// Custom deserializer accepting human-readable durations like "5s", "1m".
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from
    /// a `.env` file).
    ///
    /// Fields not set via env will be filled with default values suitable
    /// for local development.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or missing
    /// required values.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "orders_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "orders_db")?
            .set_default("migrations_dir", "./migrations")?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Outbound adapters
            .set_default("catalog_base_url", "http://localhost:8082")?
            .set_default("catalog_timeout", "5s")?
            .set_default("payment_base_url", "http://localhost:8083")?
            .set_default("payment_timeout", "10s")?
            .set_default("inventory_base_url", "http://localhost:8084")?
            .set_default("inventory_timeout", "8s")?
            // Totals
            .set_default("tax_rate_bps", 500)?
            // Inventory
            .set_default("reservation_ttl", "15m")?
            .set_default("low_stock_threshold", 10)?
            .set_default("reaper_interval", "60s")?
            .add_source(config::Environment::default().separator("_"))
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_rate_converts_bps_to_decimal() {
        let cfg = default_for_test();
        assert_eq!(cfg.tax_rate(), Decimal::new(5, 2));
    }

    fn default_for_test() -> AppConfig {
        AppConfig {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "orders_user".into(),
            db_password: "pw".into(),
            db_name: "orders_db".into(),
            migrations_dir: "./migrations".into(),
            http_port: 8081,
            shutdown_timeout: Duration::from_secs(5),
            catalog_base_url: "http://localhost:8082".into(),
            catalog_timeout: Duration::from_secs(5),
            payment_base_url: "http://localhost:8083".into(),
            payment_timeout: Duration::from_secs(10),
            inventory_base_url: "http://localhost:8084".into(),
            inventory_timeout: Duration::from_secs(8),
            tax_rate_bps: 500,
            reservation_ttl: Duration::from_secs(900),
            low_stock_threshold: 10,
            reaper_interval: Duration::from_secs(60),
        }
    }
}

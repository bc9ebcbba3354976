//! Catalog Adapter (spec §4.4, §6 "Catalog dependency (consumed)").
//!
//! Read-only client: given product identifiers, returns current unit
//! prices, SKUs, and names. A pure function from the orchestrator's
//! viewpoint — it never retries and never mutates state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use model::{ProductId, Sku};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct ProductDetails {
    pub sku: Sku,
    pub name: String,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches current unit prices for every requested product in a
    /// single call (spec §4.1 phase 2).
    async fn prices(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Decimal>, ClientError>;

    /// Fetches SKU and display name for one product.
    async fn details(&self, id: &ProductId) -> Result<ProductDetails, ClientError>;
}

/// HTTP implementation against `GET /v1/products/prices` and
/// `GET /v1/products/{id}` (spec §6).
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a sane default TLS backend");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct ProductDetailsResponse {
    sku: String,
    name: String,
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn prices(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Decimal>, ClientError> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("productIds", id.as_str())).collect();
        let response = self
            .client
            .get(format!("{}/v1/products/prices", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::NonSuccess(response.status().as_u16()));
        }

        let raw: HashMap<String, Decimal> = response.json().await?;
        let mut prices = HashMap::with_capacity(ids.len());
        for id in ids {
            match raw.get(id.as_str()) {
                Some(price) => {
                    prices.insert(id.clone(), *price);
                }
                None => return Err(ClientError::MissingEntry(id.as_str().to_string())),
            }
        }
        Ok(prices)
    }

    async fn details(&self, id: &ProductId) -> Result<ProductDetails, ClientError> {
        let response = self
            .client
            .get(format!("{}/v1/products/{}", self.base_url, id.as_str()))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::MissingEntry(id.as_str().to_string()));
        }
        if !response.status().is_success() {
            return Err(ClientError::NonSuccess(response.status().as_u16()));
        }

        let body: ProductDetailsResponse = response.json().await?;
        Ok(ProductDetails {
            sku: Sku::new(body.sku),
            name: body.name,
        })
    }
}

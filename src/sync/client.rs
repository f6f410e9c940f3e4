//! HTTP client for the storefront's batch offer endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::util::env::{env_opt, env_parse, env_req};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOffer {
    pub supplier_id: i32,
    pub supplier: String,
    pub supplier_uid: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// One product as the storefront sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProduct {
    pub external_ref: String,
    pub sku: String,
    pub stock_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_offer_price: Option<BigDecimal>,
    pub offers: Vec<SyncOffer>,
}

/// Transport seam so the batcher can be exercised without a live endpoint.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push_batch(&self, products: &[SyncProduct]) -> Result<()>;
}

pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout_secs: u64 = env_parse("SYNC_API_TIMEOUT_SECS", 30);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("stocksync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building sync http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// `SYNC_API_URL` is required; `SYNC_API_KEY` is attached when present.
    pub fn from_env() -> Result<Self> {
        let mut client = Self::new(env_req("SYNC_API_URL")?)?;
        if let Some(key) = env_opt("SYNC_API_KEY") {
            client = client.with_api_key(key);
        }
        Ok(client)
    }
}

#[async_trait]
impl SyncTransport for SyncClient {
    #[instrument(skip(self, products), fields(batch = products.len()))]
    async fn push_batch(&self, products: &[SyncProduct]) -> Result<()> {
        let url = format!("{}/offers/batch", self.base_url);
        let mut request = self.http.post(&url).json(products);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        let response = request.send().await.context("sync request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            bail!("sync API returned {status}: {body}");
        }
        debug!("batch accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn product_serializes_without_empty_best_offer() {
        let product = SyncProduct {
            external_ref: "EXT-1".to_string(),
            sku: "P1".to_string(),
            stock_status: "out_of_stock".to_string(),
            best_offer_price: None,
            offers: Vec::new(),
        };
        let value = serde_json::to_value(&product).unwrap();
        assert!(value.get("best_offer_price").is_none());
        assert_eq!(value["external_ref"], "EXT-1");
    }

    #[test]
    fn offer_prices_serialize_as_decimal_strings() {
        let product = SyncProduct {
            external_ref: "EXT-2".to_string(),
            sku: "P2".to_string(),
            stock_status: "backorder".to_string(),
            best_offer_price: Some(BigDecimal::from_str("124.20").unwrap()),
            offers: vec![SyncOffer {
                supplier_id: 1,
                supplier: "deltyre".to_string(),
                supplier_uid: "DLT".to_string(),
                quantity: 6,
                price: BigDecimal::from_str("124.20").unwrap(),
            }],
        };
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["best_offer_price"], "124.20");
        assert_eq!(value["offers"][0]["price"], "124.20");
        assert_eq!(value["offers"][0]["quantity"], 6);
        assert_eq!(value["offers"][0]["supplier_uid"], "DLT");
    }
}

//! In-memory catalog used by the test suites. Behaves like the Postgres
//! store from the pipeline's point of view and exposes plain accessors for
//! asserting on the resulting state.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::{OfferRow, ProductSnapshot, StockState};
use crate::pricing::Coefficient;

use super::store::{CatalogStore, CoefficientSource};

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<i64, ProductSnapshot>,
    stock: BTreeMap<i64, StockState>,
    extras: BTreeMap<i64, BTreeMap<String, String>>,
    coefficients: Vec<Coefficient>,
    fail_writes: bool,
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, snapshot: ProductSnapshot) {
        let mut state = self.state.lock().await;
        state.products.insert(snapshot.product_id, snapshot);
    }

    pub async fn set_coefficients(&self, coefficients: Vec<Coefficient>) {
        self.state.lock().await.coefficients = coefficients;
    }

    /// Makes every subsequent write fail, for exercising abort paths.
    pub async fn fail_writes(&self, on: bool) {
        self.state.lock().await.fail_writes = on;
    }

    pub async fn product(&self, id: i64) -> Option<ProductSnapshot> {
        self.state.lock().await.products.get(&id).cloned()
    }

    pub async fn stock_state(&self, id: i64) -> Option<StockState> {
        self.state.lock().await.stock.get(&id).cloned()
    }

    pub async fn extras(&self, id: i64) -> Option<BTreeMap<String, String>> {
        self.state.lock().await.extras.get(&id).cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn resolve_skus(&self, skus: &[String]) -> Result<HashMap<String, i64>> {
        let state = self.state.lock().await;
        let mut out = HashMap::new();
        for snapshot in state.products.values() {
            if skus.iter().any(|s| s == &snapshot.sku) {
                out.insert(snapshot.sku.clone(), snapshot.product_id);
            }
        }
        Ok(out)
    }

    async fn load_snapshots(&self, ids: &[i64]) -> Result<HashMap<i64, ProductSnapshot>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn write_offers(&self, offers: &BTreeMap<i64, Vec<OfferRow>>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_writes {
            bail!("injected storage failure");
        }
        for (id, rows) in offers {
            if let Some(snapshot) = state.products.get_mut(id) {
                snapshot.offers = rows.clone();
            }
        }
        Ok(())
    }

    async fn write_stock_status(&self, states: &BTreeMap<i64, StockState>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_writes {
            bail!("injected storage failure");
        }
        for (id, stock) in states {
            state.stock.insert(*id, stock.clone());
        }
        Ok(())
    }

    async fn write_extra_fields(
        &self,
        fields: &BTreeMap<i64, BTreeMap<String, String>>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_writes {
            bail!("injected storage failure");
        }
        for (id, patch) in fields {
            state
                .extras
                .entry(*id)
                .or_default()
                .extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }
}

#[async_trait]
impl CoefficientSource for MemoryCatalog {
    async fn list_all(&self) -> Result<Vec<Coefficient>> {
        Ok(self.state.lock().await.coefficients.clone())
    }
}

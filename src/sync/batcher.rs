//! Splits changed products into batches, shapes the payload and pushes each
//! batch through the rate limiter. Failures are accounted per batch and
//! never abort the rest of the queue.

use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::catalog::CatalogStore;
use crate::model::{ProductSnapshot, SyncRunStats};
use crate::reconcile::derive_stock_state;
use crate::suppliers::registry::SupplierRegistry;
use crate::util::env::env_parse;

use super::client::{SyncOffer, SyncProduct, SyncTransport};
use super::limiter::RateLimiter;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Pushes the given products downstream, deduplicated and in id order.
/// Products without an external reference are counted as skipped.
#[instrument(skip_all, fields(requested = ids.len()))]
pub async fn sync_products<S, T>(
    store: &S,
    transport: &T,
    registry: &SupplierRegistry,
    limiter: &RateLimiter,
    ids: &[i64],
) -> SyncRunStats
where
    S: CatalogStore,
    T: SyncTransport,
{
    let batch_size = env_parse::<usize>("SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1);
    run_batches(store, transport, registry, limiter, ids, batch_size).await
}

async fn run_batches<S, T>(
    store: &S,
    transport: &T,
    registry: &SupplierRegistry,
    limiter: &RateLimiter,
    ids: &[i64],
    batch_size: usize,
) -> SyncRunStats
where
    S: CatalogStore,
    T: SyncTransport,
{
    let unique: Vec<i64> = ids.iter().copied().sorted_unstable().dedup().collect();
    let mut stats = SyncRunStats::default();

    for batch in unique.chunks(batch_size) {
        let snapshots = match store.load_snapshots(batch).await {
            Ok(snapshots) => snapshots,
            Err(error) => {
                warn!(batch = batch.len(), %error, "snapshot load failed, batch not synced");
                stats.errors += batch.len() as u64;
                continue;
            }
        };

        let mut payload = Vec::with_capacity(batch.len());
        for id in batch {
            match snapshots.get(id) {
                Some(snapshot) if snapshot.sync_eligible() => {
                    payload.push(build_product(snapshot, registry));
                }
                Some(_) | None => stats.skipped += 1,
            }
        }
        if payload.is_empty() {
            continue;
        }

        limiter.acquire().await;
        match transport.push_batch(&payload).await {
            Ok(()) => stats.synced += payload.len() as u64,
            Err(error) => {
                warn!(batch = payload.len(), %error, "batch push failed");
                stats.errors += payload.len() as u64;
            }
        }
    }

    info!(%stats, "sync finished");
    stats
}

fn build_product(snapshot: &ProductSnapshot, registry: &SupplierRegistry) -> SyncProduct {
    let state = derive_stock_state(snapshot.local_stock_quantity, &snapshot.offers);
    SyncProduct {
        external_ref: snapshot.external_ref.clone().unwrap_or_default(),
        sku: snapshot.sku.clone(),
        stock_status: state.status.as_str().to_string(),
        best_offer_price: state.best_offer.map(|b| b.price),
        offers: snapshot
            .offers
            .iter()
            .map(|offer| {
                let (supplier, supplier_uid) = match registry.by_id(offer.supplier_id) {
                    Some(identity) => (identity.name.clone(), identity.external_uid.clone()),
                    None => (format!("supplier-{}", offer.supplier_id), String::new()),
                };
                SyncOffer {
                    supplier_id: offer.supplier_id,
                    supplier,
                    supplier_uid,
                    quantity: offer.quantity,
                    price: offer.price.clone(),
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;

    use crate::catalog::MemoryCatalog;
    use crate::model::OfferRow;

    struct RecordingTransport {
        batches: Mutex<Vec<Vec<SyncProduct>>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn batches(&self) -> Vec<Vec<SyncProduct>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncTransport for RecordingTransport {
        async fn push_batch(&self, products: &[SyncProduct]) -> Result<()> {
            self.batches.lock().unwrap().push(products.to_vec());
            if self.fail {
                bail!("simulated endpoint failure");
            }
            Ok(())
        }
    }

    fn dec(v: &str) -> BigDecimal {
        BigDecimal::from_str(v).unwrap()
    }

    fn product(id: i64, sku: &str, external_ref: Option<&str>) -> crate::model::ProductSnapshot {
        crate::model::ProductSnapshot {
            product_id: id,
            sku: sku.to_string(),
            local_stock_quantity: 0,
            base_price: None,
            product_type: "tyre".to_string(),
            brand: "brandx".to_string(),
            external_ref: external_ref.map(str::to_string),
            offers: vec![OfferRow {
                supplier_id: 1,
                quantity: 6,
                price: dec("124.20"),
            }],
        }
    }

    fn wide_open_limiter() -> RateLimiter {
        RateLimiter::new(1000, Duration::from_secs(60), Duration::ZERO)
    }

    #[tokio::test]
    async fn duplicate_ids_are_pushed_once() {
        let catalog = MemoryCatalog::new();
        catalog.insert_product(product(42, "P42", Some("EXT-42"))).await;
        let transport = RecordingTransport::new();
        let registry = SupplierRegistry::with_defaults();
        let limiter = wide_open_limiter();

        let stats =
            sync_products(&catalog, &transport, &registry, &limiter, &[42, 42, 42]).await;

        assert_eq!(stats.synced, 1);
        assert_eq!(stats.errors, 0);
        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].external_ref, "EXT-42");
        assert_eq!(batches[0][0].offers[0].supplier, "deltyre");
        assert_eq!(batches[0][0].offers[0].supplier_uid, "DLT");
        assert_eq!(batches[0][0].stock_status, "backorder");
    }

    #[tokio::test]
    async fn products_without_external_ref_are_skipped() {
        let catalog = MemoryCatalog::new();
        catalog.insert_product(product(1, "P1", Some("EXT-1"))).await;
        catalog.insert_product(product(2, "P2", None)).await;
        let transport = RecordingTransport::new();
        let registry = SupplierRegistry::with_defaults();
        let limiter = wide_open_limiter();

        let stats = sync_products(&catalog, &transport, &registry, &limiter, &[1, 2, 3]).await;

        assert_eq!(stats.synced, 1);
        // one missing ref, one unknown id
        assert_eq!(stats.skipped, 2);
        assert_eq!(transport.batches().len(), 1);
    }

    #[tokio::test]
    async fn failed_batches_count_every_product() {
        let catalog = MemoryCatalog::new();
        catalog.insert_product(product(1, "P1", Some("EXT-1"))).await;
        catalog.insert_product(product(2, "P2", Some("EXT-2"))).await;
        let transport = RecordingTransport::failing();
        let registry = SupplierRegistry::with_defaults();
        let limiter = wide_open_limiter();

        let stats = sync_products(&catalog, &transport, &registry, &limiter, &[1, 2]).await;

        assert_eq!(stats.synced, 0);
        assert_eq!(stats.errors, 2);
    }

    #[tokio::test]
    async fn splits_into_batches_of_the_given_size() {
        let catalog = MemoryCatalog::new();
        for id in 1..=5 {
            catalog
                .insert_product(product(id, &format!("P{id}"), Some(&format!("EXT-{id}"))))
                .await;
        }
        let transport = RecordingTransport::new();
        let registry = SupplierRegistry::with_defaults();
        let limiter = wide_open_limiter();

        let stats = run_batches(
            &catalog,
            &transport,
            &registry,
            &limiter,
            &[1, 2, 3, 4, 5],
            2,
        )
        .await;

        assert_eq!(stats.synced, 5);
        let batches = transport.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[tokio::test]
    async fn unknown_supplier_ids_get_a_placeholder_name() {
        let catalog = MemoryCatalog::new();
        let mut snapshot = product(9, "P9", Some("EXT-9"));
        snapshot.offers[0].supplier_id = 77;
        catalog.insert_product(snapshot).await;
        let transport = RecordingTransport::new();
        let registry = SupplierRegistry::with_defaults();
        let limiter = wide_open_limiter();

        sync_products(&catalog, &transport, &registry, &limiter, &[9]).await;

        let offer = transport.batches()[0][0].offers[0].clone();
        assert_eq!(offer.supplier, "supplier-77");
        assert_eq!(offer.supplier_id, 77);
        assert!(offer.supplier_uid.is_empty());
    }
}

//! The chunked merge loop. Each chunk resolves its SKUs, preloads product
//! snapshots, merges priced offers into the per-product collections and
//! persists offers, attributes and derived stock status in batch writes.

use std::collections::{BTreeMap, HashSet};

use bigdecimal::{BigDecimal, Zero};
use tracing::{debug, warn};

use crate::catalog::CatalogStore;
use crate::error::ImportError;
use crate::model::{
    merge_offer, ImportMode, ImportRunStats, OfferRow, ProductSnapshot, StockState,
    SupplierFeedRow,
};
use crate::pricing::CoefficientResolver;
use crate::suppliers::descriptor::FeedDescriptor;
use crate::suppliers::registry::SupplierIdentity;
use crate::util::env::env_parse;

use super::guard::{GuardStop, ResourceGuard};
use super::stock::derive_stock_state;

const DEFAULT_CHUNK_SIZE: usize = 50;
const BULK_LARGE_ROWS: usize = 5_000;
const BULK_XL_ROWS: usize = 10_000;

/// Chunk size for a run. Bulk runs widen the chunks on large feeds so the
/// write count stays reasonable.
pub fn chunk_size_for(mode: ImportMode, total_rows: usize) -> usize {
    scaled_chunk_size(
        env_parse("IMPORT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
        mode,
        total_rows,
    )
}

fn scaled_chunk_size(base: usize, mode: ImportMode, total_rows: usize) -> usize {
    let base = base.max(1);
    match mode {
        ImportMode::Interactive => base,
        ImportMode::Bulk if total_rows >= BULK_XL_ROWS => base.max(200),
        ImportMode::Bulk if total_rows >= BULK_LARGE_ROWS => base.max(100),
        ImportMode::Bulk => base,
    }
}

#[derive(Debug)]
pub struct EngineReport {
    pub stats: ImportRunStats,
    /// Set when a guard cut the run short; everything persisted before the
    /// stop stays persisted.
    pub stopped: Option<GuardStop>,
}

/// Reconciles one supplier's parsed rows into the catalog.
///
/// `changed` collects the ids of products whose offer collection actually
/// changed; the caller owns it so ids from completed chunks survive even
/// when a later chunk fails.
#[allow(clippy::too_many_arguments)]
pub async fn run<S: CatalogStore>(
    store: &S,
    identity: &SupplierIdentity,
    descriptor: &FeedDescriptor,
    rows: Vec<SupplierFeedRow>,
    resolver: &CoefficientResolver,
    mode: ImportMode,
    guard: &ResourceGuard,
    changed: &mut HashSet<i64>,
) -> Result<EngineReport, ImportError> {
    let mut stats = ImportRunStats::default();
    let mut stopped = None;
    let chunk_size = chunk_size_for(mode, rows.len());
    debug!(
        supplier = %identity.name,
        rows = rows.len(),
        chunk_size,
        mode = mode.label(),
        "reconciling feed"
    );

    for chunk in rows.chunks(chunk_size) {
        if let Some(stop) = guard.check() {
            warn!(supplier = %identity.name, %stop, "stopping run early");
            stopped = Some(stop);
            break;
        }
        process_chunk(store, identity, descriptor, chunk, resolver, &mut stats, changed).await?;
    }
    Ok(EngineReport { stats, stopped })
}

#[allow(clippy::too_many_arguments)]
async fn process_chunk<S: CatalogStore>(
    store: &S,
    identity: &SupplierIdentity,
    descriptor: &FeedDescriptor,
    chunk: &[SupplierFeedRow],
    resolver: &CoefficientResolver,
    stats: &mut ImportRunStats,
    changed: &mut HashSet<i64>,
) -> Result<(), ImportError> {
    // last row per SKU wins within a chunk
    let mut staged: BTreeMap<&str, &SupplierFeedRow> = BTreeMap::new();
    for row in chunk {
        staged.insert(row.sku.as_str(), row);
    }

    let skus: Vec<String> = staged.keys().map(|s| s.to_string()).collect();
    let mapping = store
        .resolve_skus(&skus)
        .await
        .map_err(ImportError::Persistence)?;

    let mut ids: Vec<i64> = mapping.values().copied().collect();
    ids.sort_unstable();
    ids.dedup();
    let mut snapshots = store
        .load_snapshots(&ids)
        .await
        .map_err(ImportError::Persistence)?;

    let mut new_offers: BTreeMap<i64, Vec<OfferRow>> = BTreeMap::new();
    let mut extra_fields: BTreeMap<i64, BTreeMap<String, String>> = BTreeMap::new();

    for (sku, row) in &staged {
        let Some(id) = mapping.get(*sku) else {
            stats.skipped += 1;
            continue;
        };
        let Some(snapshot) = snapshots.get_mut(id) else {
            // resolved a moment ago but gone from the snapshot read
            stats.skipped += 1;
            continue;
        };
        let Some(price) = offer_price(descriptor, row, snapshot, resolver, &identity.name) else {
            stats.skipped += 1;
            continue;
        };

        let before = snapshot.offers.clone();
        merge_offer(
            &mut snapshot.offers,
            OfferRow {
                supplier_id: identity.id,
                quantity: row.quantity,
                price,
            },
        );
        stats.processed += 1;
        if snapshot.offers != before {
            new_offers.insert(*id, snapshot.offers.clone());
        }
        if !row.extra.is_empty() {
            extra_fields
                .entry(*id)
                .or_default()
                .extend(row.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    if !new_offers.is_empty() {
        store
            .write_offers(&new_offers)
            .await
            .map_err(ImportError::Persistence)?;
        stats.updated += new_offers.len() as u64;
    }
    if !extra_fields.is_empty() {
        store
            .write_extra_fields(&extra_fields)
            .await
            .map_err(ImportError::Persistence)?;
    }

    let mut states: BTreeMap<i64, StockState> = BTreeMap::new();
    for (id, snapshot) in &snapshots {
        states.insert(
            *id,
            derive_stock_state(snapshot.local_stock_quantity, &snapshot.offers),
        );
    }
    if !states.is_empty() {
        store
            .write_stock_status(&states)
            .await
            .map_err(ImportError::Persistence)?;
    }

    changed.extend(new_offers.keys().copied());
    Ok(())
}

/// Two price tiers: a positive feed price wins, otherwise the product's own
/// base price when the supplier allows the fallback. No usable price means
/// the row is skipped.
fn offer_price(
    descriptor: &FeedDescriptor,
    row: &SupplierFeedRow,
    snapshot: &ProductSnapshot,
    resolver: &CoefficientResolver,
    supplier_name: &str,
) -> Option<BigDecimal> {
    let zero = BigDecimal::zero();
    let base = if row.price > zero {
        row.price.clone()
    } else if descriptor.product_price_fallback {
        match &snapshot.base_price {
            Some(base) if *base > zero => base.clone(),
            _ => return None,
        }
    } else {
        return None;
    };
    Some(resolver.calculate_price(
        supplier_name,
        &base,
        &snapshot.product_type,
        &snapshot.brand,
        descriptor.surcharge_cents,
    ))
}

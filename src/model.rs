//! Core data model shared across the import pipeline.

use std::collections::BTreeMap;
use std::fmt;

use bigdecimal::BigDecimal;

/// One decoded line from a supplier feed. Ephemeral: built by the parser,
/// consumed by the reconciliation engine, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierFeedRow {
    pub sku: String,
    pub quantity: i32,
    /// Zero means "price the product from its own stored base price".
    pub price: BigDecimal,
    /// Supplier-specific side fields (DOT code, EPREL id, ...).
    pub extra: BTreeMap<String, String>,
}

/// One supplier's current standing offer on one product.
///
/// A product owns an ordered collection of these with at most one entry per
/// `supplier_id`. Entries are replaced in place or appended, never dropped
/// wholesale: a supplier missing from today's feed keeps its last known offer
/// until a later feed supersedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRow {
    pub supplier_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// Merges `incoming` into `offers`: replace-in-place when the supplier
/// already has an entry, append otherwise. Re-merging the same offer is a
/// no-op in collection shape, which is what makes partial runs safe to
/// repeat.
pub fn merge_offer(offers: &mut Vec<OfferRow>, incoming: OfferRow) {
    match offers
        .iter_mut()
        .find(|o| o.supplier_id == incoming.supplier_id)
    {
        Some(existing) => *existing = incoming,
        None => offers.push(incoming),
    }
}

/// Derived availability of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockStatus {
    InStock,
    Backorder,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::Backorder => "backorder",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    pub fn parse(raw: &str) -> Option<StockStatus> {
        match raw {
            "in_stock" => Some(StockStatus::InStock),
            "backorder" => Some(StockStatus::Backorder),
            "out_of_stock" => Some(StockStatus::OutOfStock),
            _ => None,
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheapest external offer that can back a backorder, kept as a derived
/// field next to the status.
#[derive(Debug, Clone, PartialEq)]
pub struct BestOffer {
    pub quantity: i32,
    pub price: BigDecimal,
}

/// Stock status plus the derived best-offer pair, written together.
#[derive(Debug, Clone, PartialEq)]
pub struct StockState {
    pub status: StockStatus,
    pub best_offer: Option<BestOffer>,
}

/// Catalog-side view of one product, preloaded per chunk so the merge stage
/// never queries per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub product_id: i64,
    pub sku: String,
    pub local_stock_quantity: i32,
    /// The product's own stored price; base for suppliers whose feed carries
    /// no price column.
    pub base_price: Option<BigDecimal>,
    pub product_type: String,
    pub brand: String,
    /// Identifier in the downstream inventory system; empty or absent means
    /// the product is not sync-eligible.
    pub external_ref: Option<String>,
    pub offers: Vec<OfferRow>,
}

impl ProductSnapshot {
    pub fn sync_eligible(&self) -> bool {
        self.external_ref.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Whether a run competes with a person waiting at a terminal or owns the
/// machine for the night. Selects chunk sizing and the wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Interactive,
    Bulk,
}

impl ImportMode {
    pub fn label(&self) -> &'static str {
        match self {
            ImportMode::Interactive => "interactive",
            ImportMode::Bulk => "bulk",
        }
    }
}

/// Counters for one supplier reconciliation run. Pure output, never
/// persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportRunStats {
    /// Rows that made it through pricing and were staged for an offer write.
    pub processed: u64,
    /// Products whose offer collection was rewritten.
    pub updated: u64,
    /// Rows lost to parse or lookup failures.
    pub errors: u64,
    /// Rows dropped at the price/lookup stage (unknown SKU, no usable price).
    pub skipped: u64,
}

impl ImportRunStats {
    pub fn merge(&mut self, other: &ImportRunStats) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }

    pub fn is_empty(&self) -> bool {
        *self == ImportRunStats::default()
    }
}

impl fmt::Display for ImportRunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} updated={} errors={} skipped={}",
            self.processed, self.updated, self.errors, self.skipped
        )
    }
}

/// Counters for one downstream sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub synced: u64,
    pub errors: u64,
    pub skipped: u64,
}

impl fmt::Display for SyncRunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "synced={} errors={} skipped={}",
            self.synced, self.errors, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn offer(supplier_id: i32, quantity: i32, price: &str) -> OfferRow {
        OfferRow {
            supplier_id,
            quantity,
            price: BigDecimal::from_str(price).unwrap(),
        }
    }

    #[test]
    fn merge_appends_new_supplier() {
        let mut offers = vec![offer(1, 5, "10.00")];
        merge_offer(&mut offers, offer(2, 3, "9.50"));
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[1].supplier_id, 2);
    }

    #[test]
    fn merge_replaces_existing_supplier_in_place() {
        let mut offers = vec![offer(1, 5, "10.00"), offer(2, 3, "9.50")];
        merge_offer(&mut offers, offer(1, 7, "11.00"));
        assert_eq!(offers.len(), 2);
        // position is preserved
        assert_eq!(offers[0].supplier_id, 1);
        assert_eq!(offers[0].quantity, 7);
        assert_eq!(offers[0].price, BigDecimal::from_str("11.00").unwrap());
    }

    #[test]
    fn merge_is_idempotent() {
        let mut offers = vec![offer(1, 5, "10.00")];
        for _ in 0..3 {
            merge_offer(&mut offers, offer(1, 5, "10.00"));
        }
        assert_eq!(offers, vec![offer(1, 5, "10.00")]);
    }

    #[test]
    fn stock_status_round_trips_through_text() {
        for status in [
            StockStatus::InStock,
            StockStatus::Backorder,
            StockStatus::OutOfStock,
        ] {
            assert_eq!(StockStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StockStatus::parse("unknown"), None);
    }

    #[test]
    fn stats_merge_adds_counters() {
        let mut total = ImportRunStats {
            processed: 1,
            updated: 1,
            errors: 0,
            skipped: 2,
        };
        total.merge(&ImportRunStats {
            processed: 3,
            updated: 2,
            errors: 1,
            skipped: 0,
        });
        assert_eq!(total.processed, 4);
        assert_eq!(total.updated, 3);
        assert_eq!(total.errors, 1);
        assert_eq!(total.skipped, 2);
        assert!(!total.is_empty());
    }
}

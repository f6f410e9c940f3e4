//! Per-supplier feed shape, as data.
//!
//! Every supplier ships the same thing (a `;`-delimited text file with SKU,
//! quantity and usually a price) with its own small deviations: header rows,
//! EAN in a second column, decimal commas, flag columns marking rows we must
//! not import, a file without prices at all. All of that is captured here as
//! plain values; the parser and engine stay supplier-agnostic.

use crate::feed::fetch::Transport;

use super::SupplierKey;

/// Marks rows as not importable when a flag column matches one of the given
/// values (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectRule {
    pub column: usize,
    pub values: &'static [&'static str],
}

/// Copies a raw column into `SupplierFeedRow.extra` under a stable field
/// name, for side-field persistence (e.g. DOT code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraCapture {
    pub column: usize,
    pub field: &'static str,
}

/// The complete parsing and pricing profile of one supplier's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDescriptor {
    pub key: SupplierKey,
    pub transport: Transport,
    pub delimiter: u8,
    /// Header rows to drop before data starts (0..=3 in practice).
    pub skip_rows: usize,
    /// Candidate SKU/EAN columns, tried in order; first non-empty wins.
    pub sku_columns: &'static [usize],
    pub quantity_column: usize,
    /// None when the feed carries no price at all.
    pub price_column: Option<usize>,
    /// Feed uses `10,50` instead of `10.50`.
    pub decimal_comma: bool,
    /// When the feed price is absent or zero, fall back to the product's own
    /// stored price as the pricing base.
    pub product_price_fallback: bool,
    pub reject: Option<RejectRule>,
    pub extras: &'static [ExtraCapture],
    /// Fixed amount in cents added after coefficient pricing and rounding.
    pub surcharge_cents: Option<i64>,
}

impl FeedDescriptor {
    pub fn for_supplier(key: SupplierKey) -> FeedDescriptor {
        let base = FeedDescriptor {
            key,
            transport: Transport::Http,
            delimiter: b';',
            skip_rows: 0,
            sku_columns: &[0],
            quantity_column: 1,
            price_column: Some(2),
            decimal_comma: false,
            product_price_fallback: false,
            reject: None,
            extras: &[],
            surcharge_cents: None,
        };
        match key {
            SupplierKey::Deltyre => FeedDescriptor {
                transport: Transport::Ftp,
                skip_rows: 1,
                quantity_column: 2,
                price_column: Some(3),
                decimal_comma: true,
                extras: &[ExtraCapture {
                    column: 4,
                    field: "dot_code",
                }],
                ..base
            },
            SupplierKey::Rimexpo => FeedDescriptor {
                transport: Transport::Ftp,
                skip_rows: 1,
                // article number, falling back to the EAN column
                sku_columns: &[0, 1],
                quantity_column: 2,
                price_column: Some(3),
                reject: Some(RejectRule {
                    column: 5,
                    values: &["demo"],
                }),
                ..base
            },
            SupplierKey::Nordwheel => FeedDescriptor {
                transport: Transport::Sftp,
                sku_columns: &[1],
                quantity_column: 4,
                price_column: Some(5),
                ..base
            },
            SupplierKey::Gripfield => FeedDescriptor {
                skip_rows: 3,
                quantity_column: 1,
                // no price in the feed; priced from the product record
                price_column: None,
                product_price_fallback: true,
                surcharge_cents: Some(420),
                ..base
            },
            SupplierKey::Autopart24 => FeedDescriptor {
                skip_rows: 1,
                quantity_column: 3,
                price_column: Some(2),
                decimal_comma: true,
                extras: &[ExtraCapture {
                    column: 6,
                    field: "eprel_id",
                }],
                ..base
            },
            SupplierKey::Vulkanexpress => FeedDescriptor {
                transport: Transport::Ftp,
                skip_rows: 2,
                quantity_column: 1,
                price_column: Some(2),
                reject: Some(RejectRule {
                    column: 3,
                    values: &["old", "stale"],
                }),
                ..base
            },
        }
    }

    /// One-line summary of the quirks, for the `suppliers` listing.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(format!("{:?}", self.transport).to_lowercase());
        parts.push(format!("skip={}", self.skip_rows));
        parts.push(format!("sku_cols={:?}", self.sku_columns));
        match self.price_column {
            Some(col) => parts.push(format!("price_col={col}")),
            None => parts.push("price=product-base".to_string()),
        }
        if self.decimal_comma {
            parts.push("decimal-comma".to_string());
        }
        if let Some(rule) = &self.reject {
            parts.push(format!("reject_col={}", rule.column));
        }
        if let Some(cents) = self.surcharge_cents {
            parts.push(format!("surcharge={}.{:02}", cents / 100, cents % 100));
        }
        parts.join(" ")
    }
}

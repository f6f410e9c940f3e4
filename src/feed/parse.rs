//! Decodes a raw feed file into normalized rows, driven entirely by the
//! supplier's [`FeedDescriptor`].
//!
//! The filters here are deliberate about what counts where: rows rejected by
//! a supplier flag or missing a SKU are hard-filtered (they never existed as
//! far as the stats are concerned), while structurally broken records count
//! as parse errors. Rows that survive but later fail pricing or SKU lookup
//! become `skipped` in the engine, not here.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::model::SupplierFeedRow;
use crate::suppliers::descriptor::FeedDescriptor;

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub rows: Vec<SupplierFeedRow>,
    /// Structurally unreadable records.
    pub parse_errors: u64,
    /// Rows dropped by rejection rules or for lacking a SKU.
    pub filtered: u64,
}

pub fn parse_feed(descriptor: &FeedDescriptor, bytes: &[u8], limit: Option<usize>) -> ParsedFeed {
    let mut out = ParsedFeed::default();
    let mut reader = ReaderBuilder::new()
        .delimiter(descriptor.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    for (index, record) in reader.records().enumerate() {
        if index < descriptor.skip_rows {
            continue;
        }
        if limit.is_some_and(|cap| out.rows.len() >= cap) {
            break;
        }
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                warn!(%error, line = index + 1, supplier = %descriptor.key, "unreadable feed record");
                out.parse_errors += 1;
                continue;
            }
        };
        match decode_record(descriptor, &record) {
            Some(row) => out.rows.push(row),
            None => out.filtered += 1,
        }
    }

    debug!(
        supplier = %descriptor.key,
        rows = out.rows.len(),
        parse_errors = out.parse_errors,
        filtered = out.filtered,
        "feed decoded"
    );
    out
}

fn decode_record(descriptor: &FeedDescriptor, record: &csv::StringRecord) -> Option<SupplierFeedRow> {
    let field = |i: usize| record.get(i).unwrap_or("").trim();

    if let Some(rule) = &descriptor.reject {
        let flag = field(rule.column);
        if rule.values.iter().any(|v| flag.eq_ignore_ascii_case(v)) {
            return None;
        }
    }

    // candidate columns in order, first non-empty wins
    let sku = descriptor
        .sku_columns
        .iter()
        .map(|&i| field(i))
        .find(|v| !v.is_empty())?
        .to_string();

    let quantity = parse_quantity(field(descriptor.quantity_column));
    let price = match descriptor.price_column {
        Some(i) => parse_decimal(field(i), descriptor.decimal_comma),
        None => BigDecimal::zero(),
    };

    let mut extra = BTreeMap::new();
    for capture in descriptor.extras {
        let value = field(capture.column);
        if !value.is_empty() {
            extra.insert(capture.field.to_string(), value.to_string());
        }
    }

    Some(SupplierFeedRow {
        sku,
        quantity,
        price,
        extra,
    })
}

/// Lenient integer read: junk and negatives collapse to 0, which is how the
/// feeds themselves express "not available".
fn parse_quantity(raw: &str) -> i32 {
    raw.parse::<i32>().map(|q| q.max(0)).unwrap_or(0)
}

/// Lenient decimal read with optional comma-locale normalization; anything
/// unreadable collapses to 0 and is handled by the pricing tier rules.
fn parse_decimal(raw: &str, decimal_comma: bool) -> BigDecimal {
    let cleaned = if decimal_comma {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };
    BigDecimal::from_str(cleaned.trim()).unwrap_or_else(|_| BigDecimal::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetch::Transport;
    use crate::suppliers::SupplierKey;

    fn plain_descriptor() -> FeedDescriptor {
        FeedDescriptor {
            key: SupplierKey::Deltyre,
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
        }
    }

    #[test]
    fn deltyre_rows_decode_with_comma_prices_and_dot_capture() {
        let descriptor = FeedDescriptor::for_supplier(SupplierKey::Deltyre);
        let feed = b"artnr;descr;qty;price;dot\n4001234;195/65R15;12;54,90;2024\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.parse_errors, 0);
        let row = &parsed.rows[0];
        assert_eq!(row.sku, "4001234");
        assert_eq!(row.quantity, 12);
        assert_eq!(row.price, BigDecimal::from_str("54.90").unwrap());
        assert_eq!(row.extra.get("dot_code").map(String::as_str), Some("2024"));
    }

    #[test]
    fn rimexpo_falls_back_to_ean_and_drops_demo_rows() {
        let descriptor = FeedDescriptor::for_supplier(SupplierKey::Rimexpo);
        let feed = b"head;head;head;head;head;head\n\
            ;4012345678901;3;80.00;;\n\
            R-77;;5;60.00;;DEMO\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].sku, "4012345678901");
        assert_eq!(parsed.filtered, 1, "demo row is hard-filtered");
    }

    #[test]
    fn rows_without_any_sku_never_surface() {
        let descriptor = plain_descriptor();
        let feed = b";5;10.00\nP1;2;3.00\n;;\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].sku, "P1");
        assert_eq!(parsed.filtered, 2);
    }

    #[test]
    fn gripfield_skips_three_headers_and_has_no_feed_price() {
        let descriptor = FeedDescriptor::for_supplier(SupplierKey::Gripfield);
        let feed = b"Gripfield GmbH\nstock export\nsku;qty\nW-55;4\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.sku, "W-55");
        assert_eq!(row.quantity, 4);
        assert!(row.price.is_zero(), "priceless feed decodes to zero");
    }

    #[test]
    fn vulkanexpress_rejects_stale_flags_case_insensitively() {
        let descriptor = FeedDescriptor::for_supplier(SupplierKey::Vulkanexpress);
        let feed = b"h1\nh2\nV1;5;12.00;\nV2;9;11.00;Stale\nV3;2;10.00;OLD\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].sku, "V1");
        assert_eq!(parsed.filtered, 2);
    }

    #[test]
    fn junk_quantities_and_prices_collapse_to_zero() {
        let descriptor = plain_descriptor();
        let feed = b"P1;many;n/a\nP2;-3;4.50\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].quantity, 0);
        assert!(parsed.rows[0].price.is_zero());
        assert_eq!(parsed.rows[1].quantity, 0, "negative clamps to zero");
        assert_eq!(parsed.rows[1].price, BigDecimal::from_str("4.50").unwrap());
    }

    #[test]
    fn row_limit_caps_decoded_rows() {
        let descriptor = plain_descriptor();
        let feed = b"P1;1;1.00\nP2;2;2.00\nP3;3;3.00\n";
        let parsed = parse_feed(&descriptor, feed, Some(2));
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn broken_records_count_as_parse_errors() {
        let descriptor = plain_descriptor();
        // second record carries bytes that are not UTF-8
        let feed = b"P1;1;2.00\nP2;\xff\xfe;9\nP3;3;3.00\n";
        let parsed = parse_feed(&descriptor, feed, None);

        assert_eq!(parsed.parse_errors, 1);
        let skus: Vec<&str> = parsed.rows.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, vec!["P1", "P3"]);
    }
}

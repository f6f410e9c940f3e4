//! Supplier/type/brand markup coefficients.
//!
//! A coefficient row matches a pricing request when the supplier name is an
//! exact case-insensitive match and each of type/brand either matches
//! case-insensitively or is a stored wildcard (`None`). A requested empty
//! attribute only ever matches a stored wildcard. The most specific matching
//! row wins: type+brand, then type-only, then brand-only, then the full
//! wildcard. No match at all prices at 1.0 so a gap in the table never
//! blocks an import.

use std::collections::HashMap;
use std::sync::Mutex;

use bigdecimal::{num_bigint::BigInt, BigDecimal, One, RoundingMode};
use tracing::debug;

/// One markup rule. `None` in type/brand is the wildcard.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    pub supplier: String,
    pub product_type: Option<String>,
    pub brand: Option<String>,
    pub multiplier: BigDecimal,
}

impl Coefficient {
    pub fn new(
        supplier: &str,
        product_type: Option<&str>,
        brand: Option<&str>,
        multiplier: BigDecimal,
    ) -> Self {
        Coefficient {
            supplier: supplier.to_string(),
            product_type: product_type.map(str::to_string),
            brand: brand.map(str::to_string),
            multiplier,
        }
    }

    fn specificity(&self) -> u8 {
        match (self.product_type.is_some(), self.brand.is_some()) {
            (true, true) => 3,
            (true, false) => 2,
            (false, true) => 1,
            (false, false) => 0,
        }
    }

    fn matches(&self, supplier: &str, product_type: &str, brand: &str) -> bool {
        self.supplier.eq_ignore_ascii_case(supplier)
            && wildcard_match(self.product_type.as_deref(), product_type)
            && wildcard_match(self.brand.as_deref(), brand)
    }
}

fn wildcard_match(stored: Option<&str>, requested: &str) -> bool {
    match stored {
        None => true,
        // a concrete stored value never matches an empty request
        Some(value) => !requested.is_empty() && value.eq_ignore_ascii_case(requested),
    }
}

struct ResolverCache {
    version: u64,
    entries: HashMap<(String, String, String), (u64, BigDecimal)>,
}

/// Matching plus a version-tagged lookup cache. `invalidate()` bumps the
/// version; stale entries are recomputed lazily on their next hit.
pub struct CoefficientResolver {
    table: Vec<Coefficient>,
    cache: Mutex<ResolverCache>,
}

impl CoefficientResolver {
    pub fn new(mut table: Vec<Coefficient>) -> Self {
        // most specific first, so a linear scan returns the winner
        table.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        CoefficientResolver {
            table,
            cache: Mutex::new(ResolverCache {
                version: 0,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    pub fn get_coefficient(&self, supplier: &str, product_type: &str, brand: &str) -> BigDecimal {
        let key = (
            supplier.to_ascii_lowercase(),
            product_type.to_ascii_lowercase(),
            brand.to_ascii_lowercase(),
        );
        let version = {
            let cache = self.lock_cache();
            if let Some((tag, value)) = cache.entries.get(&key) {
                if *tag == cache.version {
                    return value.clone();
                }
            }
            cache.version
        };

        let value = self
            .table
            .iter()
            .find(|c| c.matches(supplier, product_type, brand))
            .map(|c| c.multiplier.clone())
            .unwrap_or_else(BigDecimal::one);

        let mut cache = self.lock_cache();
        cache.entries.insert(key, (version, value.clone()));
        value
    }

    /// Drops every cached resolution; the table itself is unchanged.
    pub fn invalidate(&self) {
        let mut cache = self.lock_cache();
        cache.version += 1;
        debug!(version = cache.version, "coefficient cache invalidated");
    }

    /// Final sale price: base times the matched coefficient, rounded half-up
    /// to cents, plus the supplier's fixed surcharge after rounding.
    pub fn calculate_price(
        &self,
        supplier: &str,
        base_price: &BigDecimal,
        product_type: &str,
        brand: &str,
        surcharge_cents: Option<i64>,
    ) -> BigDecimal {
        let coefficient = self.get_coefficient(supplier, product_type, brand);
        let mut price =
            (base_price * coefficient).with_scale_round(2, RoundingMode::HalfUp);
        if let Some(cents) = surcharge_cents {
            price += BigDecimal::new(BigInt::from(cents), 2);
        }
        price
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResolverCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(raw: &str) -> BigDecimal {
        BigDecimal::from_str(raw).unwrap()
    }

    fn resolver() -> CoefficientResolver {
        CoefficientResolver::new(vec![
            Coefficient::new("deltyre", Some("tyre"), None, dec("1.1")),
            Coefficient::new("deltyre", None, None, dec("1.0")),
            Coefficient::new("deltyre", Some("tyre"), Some("brandx"), dec("1.3")),
            Coefficient::new("rimexpo", None, Some("brandx"), dec("1.2")),
        ])
    }

    #[test]
    fn type_match_beats_full_wildcard() {
        let r = resolver();
        assert_eq!(r.get_coefficient("deltyre", "tyre", "otherbrand"), dec("1.1"));
    }

    #[test]
    fn unmatched_type_falls_through_to_wildcard() {
        let r = resolver();
        assert_eq!(r.get_coefficient("deltyre", "wheel", ""), dec("1.0"));
    }

    #[test]
    fn type_and_brand_beats_type_only() {
        let r = resolver();
        assert_eq!(r.get_coefficient("deltyre", "tyre", "BrandX"), dec("1.3"));
    }

    #[test]
    fn empty_request_only_matches_stored_wildcards() {
        let r = resolver();
        // rimexpo's only rule requires a brand; an empty brand cannot use it
        assert_eq!(r.get_coefficient("rimexpo", "tyre", ""), dec("1"));
        assert_eq!(r.get_coefficient("rimexpo", "tyre", "brandx"), dec("1.2"));
    }

    #[test]
    fn unknown_supplier_defaults_to_identity() {
        let r = resolver();
        assert_eq!(r.get_coefficient("nordwheel", "tyre", "brandx"), dec("1"));
    }

    #[test]
    fn supplier_match_is_case_insensitive() {
        let r = resolver();
        assert_eq!(r.get_coefficient("DelTyre", "TYRE", "x"), dec("1.1"));
    }

    #[test]
    fn cached_value_survives_repeat_lookups_and_invalidation_recomputes() {
        let r = resolver();
        assert_eq!(r.get_coefficient("deltyre", "tyre", "y"), dec("1.1"));
        assert_eq!(r.get_coefficient("deltyre", "tyre", "y"), dec("1.1"));
        r.invalidate();
        assert_eq!(r.get_coefficient("deltyre", "tyre", "y"), dec("1.1"));
    }

    #[test]
    fn price_rounds_half_up_to_cents() {
        let r = CoefficientResolver::new(vec![Coefficient::new(
            "deltyre",
            None,
            None,
            dec("1.2"),
        )]);
        let price = r.calculate_price("deltyre", &dec("100"), "tyre", "b", None);
        assert_eq!(price, dec("120.00"));
        assert_eq!(price.to_string(), "120.00");

        // 33.335 * 1 -> 33.34 under half-up
        let r1 = CoefficientResolver::new(vec![]);
        assert_eq!(
            r1.calculate_price("any", &dec("33.335"), "", "", None),
            dec("33.34")
        );
    }

    #[test]
    fn surcharge_applies_after_rounding() {
        let r = CoefficientResolver::new(vec![Coefficient::new(
            "gripfield",
            None,
            None,
            dec("1.2"),
        )]);
        let price = r.calculate_price("gripfield", &dec("100"), "wheel", "", Some(420));
        assert_eq!(price, dec("124.20"));
    }
}

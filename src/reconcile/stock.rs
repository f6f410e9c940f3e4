//! Stock status derivation from local stock and the merged offer collection.

use bigdecimal::BigDecimal;

use crate::model::{BestOffer, OfferRow, StockState, StockStatus};

/// An external offer must hold at least this many units before the product
/// can be promoted to backorder.
pub const BACKORDER_MIN_QUANTITY: i32 = 4;

/// Local stock always wins. Without it, the cheapest offer with a positive
/// price and enough quantity backs a backorder; ties keep the offer that
/// comes first in the collection.
pub fn derive_stock_state(local_quantity: i32, offers: &[OfferRow]) -> StockState {
    if local_quantity > 0 {
        return StockState {
            status: StockStatus::InStock,
            best_offer: None,
        };
    }
    let zero = BigDecimal::from(0);
    let best = offers
        .iter()
        .filter(|o| o.quantity >= BACKORDER_MIN_QUANTITY && o.price > zero)
        .min_by(|a, b| a.price.cmp(&b.price));
    match best {
        Some(offer) => StockState {
            status: StockStatus::Backorder,
            best_offer: Some(BestOffer {
                quantity: offer.quantity,
                price: offer.price.clone(),
            }),
        },
        None => StockState {
            status: StockStatus::OutOfStock,
            best_offer: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn offer(supplier_id: i32, quantity: i32, price: &str) -> OfferRow {
        OfferRow {
            supplier_id,
            quantity,
            price: BigDecimal::from_str(price).unwrap(),
        }
    }

    #[test]
    fn local_stock_wins_over_everything() {
        let state = derive_stock_state(2, &[offer(1, 100, "9.99")]);
        assert_eq!(state.status, StockStatus::InStock);
        assert!(state.best_offer.is_none());
    }

    #[test]
    fn sufficient_offer_backs_a_backorder() {
        let state = derive_stock_state(0, &[offer(1, 4, "12.50")]);
        assert_eq!(state.status, StockStatus::Backorder);
        let best = state.best_offer.unwrap();
        assert_eq!(best.quantity, 4);
        assert_eq!(best.price, BigDecimal::from_str("12.50").unwrap());
    }

    #[test]
    fn thin_offers_do_not_count() {
        let state = derive_stock_state(0, &[offer(1, 3, "12.50")]);
        assert_eq!(state.status, StockStatus::OutOfStock);
        assert!(state.best_offer.is_none());
    }

    #[test]
    fn zero_priced_offers_do_not_count() {
        let state = derive_stock_state(0, &[offer(1, 50, "0")]);
        assert_eq!(state.status, StockStatus::OutOfStock);
    }

    #[test]
    fn cheapest_eligible_offer_is_chosen() {
        let offers = vec![
            offer(1, 10, "15.00"),
            offer(2, 4, "11.00"),
            offer(3, 3, "5.00"),
        ];
        let state = derive_stock_state(0, &offers);
        assert_eq!(state.status, StockStatus::Backorder);
        let best = state.best_offer.unwrap();
        assert_eq!(best.price, BigDecimal::from_str("11.00").unwrap());
        assert_eq!(best.quantity, 4);
    }

    #[test]
    fn price_ties_keep_the_first_offer() {
        let offers = vec![offer(5, 8, "11.00"), offer(2, 20, "11.00")];
        let state = derive_stock_state(0, &offers);
        assert_eq!(state.best_offer.unwrap().quantity, 8);
    }

    #[test]
    fn no_offers_means_out_of_stock() {
        let state = derive_stock_state(0, &[]);
        assert_eq!(state.status, StockStatus::OutOfStock);
    }
}

//! Trigger rule
//!
//! Determines when a resting limit order is satisfied by a market price.

use types::numeric::Price;
use types::order::Side;

/// Check if a tick at `market_price` satisfies a limit order
///
/// - BUY triggers when the market trades at or below the limit
/// - SELL triggers when the market trades at or above the limit
pub fn triggers(side: Side, limit_price: Price, market_price: Price) -> bool {
    match side {
        Side::BUY => market_price <= limit_price,
        Side::SELL => market_price >= limit_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_buy_triggers_at_or_below_limit() {
        let limit = Decimal::from(100);
        assert!(triggers(Side::BUY, limit, Decimal::from(95)));
        assert!(triggers(Side::BUY, limit, limit), "Equal prices should trigger");
        assert!(!triggers(Side::BUY, limit, Decimal::new(10001, 2)));
    }

    #[test]
    fn test_sell_triggers_at_or_above_limit() {
        let limit = Decimal::from(100);
        assert!(triggers(Side::SELL, limit, Decimal::from(105)));
        assert!(triggers(Side::SELL, limit, limit));
        assert!(!triggers(Side::SELL, limit, Decimal::new(9999, 2)));
    }

    proptest::proptest! {
        // Away from the limit exactly one side triggers; at the limit both do
        #[test]
        fn prop_sides_partition_prices(limit in 1i64..1_000_000, market in 1i64..1_000_000) {
            let (limit, market) = (Decimal::new(limit, 2), Decimal::new(market, 2));
            let buy = triggers(Side::BUY, limit, market);
            let sell = triggers(Side::SELL, limit, market);
            if limit == market {
                proptest::prop_assert!(buy && sell);
            } else {
                proptest::prop_assert!(buy != sell);
            }
        }
    }
}

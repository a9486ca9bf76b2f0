//! Price and quantity helpers
//!
//! Prices are `rust_decimal::Decimal` (no floating-point drift in the
//! ledger). Quantities are whole shares.

use rust_decimal::Decimal;

/// Quoted or traded price per share.
pub type Price = Decimal;

/// Number of shares. Always positive on a live order.
pub type Quantity = u64;

/// Cash value of `quantity` shares at `price`.
pub fn notional(quantity: Quantity, price: Price) -> Decimal {
    Decimal::from(quantity) * price
}

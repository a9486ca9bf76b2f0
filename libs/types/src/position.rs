//! Holdings and positions
//!
//! A single record shape covers both: Delivery records are the user's
//! holdings, Intraday records are open positions. The `product` field
//! tells the record store which collection a record belongs to.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::numeric::{notional, Price, Quantity};
use crate::order::Product;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub product: Product,
    pub quantity: Quantity,
    /// Weighted average cost per share
    #[serde(with = "rust_decimal::serde::float")]
    pub average_price: Price,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        user_id: UserId,
        symbol: Symbol,
        product: Product,
        quantity: Quantity,
        average_price: Price,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            symbol,
            product,
            quantity,
            average_price,
            updated_at: timestamp,
        }
    }

    /// Cost basis of `quantity` shares at the average cost.
    pub fn basis_for(&self, quantity: Quantity) -> Decimal {
        notional(quantity, self.average_price)
    }

    /// Add shares bought at `price`, re-weighting the average cost.
    pub fn add(&mut self, quantity: Quantity, price: Price, timestamp: DateTime<Utc>) {
        let total = self.quantity + quantity;
        if total > 0 {
            let cost = self.basis_for(self.quantity) + notional(quantity, price);
            self.average_price = cost / Decimal::from(total);
        }
        self.quantity = total;
        self.updated_at = timestamp;
    }

    /// Remove sold shares. Returns the remaining quantity; zero means the
    /// record should be deleted.
    pub fn reduce(&mut self, quantity: Quantity, timestamp: DateTime<Utc>) -> Quantity {
        self.quantity = self.quantity.saturating_sub(quantity);
        self.updated_at = timestamp;
        self.quantity
    }
}

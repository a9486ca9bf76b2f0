//! Order lifecycle types
//!
//! An order is created pending, may be edited while pending (identity is
//! preserved), and ends in exactly one terminal state: executed or
//! cancelled. Terminal orders are never mutated again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, UserId};
use crate::numeric::{notional, Price, Quantity};
use crate::symbol::Symbol;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order
    BUY,
    /// Sell order
    SELL,
}

/// Instrument class of an order.
///
/// Delivery trades settle into long-term holdings; intraday trades open
/// positions that are force-closed before the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    Delivery,
    Intraday,
}

/// Lifecycle state derived from the executed/cancelled flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Executed,
    Cancelled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Limit order as stored in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub product: Product,
    pub quantity: Quantity,
    /// Limit price
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Price,
    /// Recorded cost basis per share. Set on synthesized exit orders so the
    /// ledger does not need to look the position up again.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub average_price: Option<Price>,
    pub executed: bool,
    pub cancelled: bool,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub executed_price: Option<Price>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new pending order
    pub fn new(
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        product: Product,
        quantity: Quantity,
        price: Price,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            user_id,
            symbol,
            side,
            product,
            quantity,
            price,
            average_price: None,
            executed: false,
            cancelled: false,
            placed_at,
            executed_at: None,
            executed_price: None,
            cancelled_at: None,
        }
    }

    /// Attach a recorded cost basis (builder style).
    pub fn with_average_price(mut self, average: Price) -> Self {
        self.average_price = Some(average);
        self
    }

    pub fn status(&self) -> OrderStatus {
        if self.executed {
            OrderStatus::Executed
        } else if self.cancelled {
            OrderStatus::Cancelled
        } else {
            OrderStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == OrderStatus::Pending
    }

    /// Cash value at the limit price
    pub fn notional(&self) -> Decimal {
        notional(self.quantity, self.price)
    }

    /// Transition to executed.
    ///
    /// # Panics
    /// Panics if the order is already terminal
    pub fn mark_executed(&mut self, price: Price, at: DateTime<Utc>) {
        assert!(self.is_pending(), "Cannot execute terminal order");
        self.executed = true;
        self.executed_price = Some(price);
        self.executed_at = Some(at);
    }

    /// Transition to cancelled.
    ///
    /// # Panics
    /// Panics if the order is already terminal
    pub fn mark_cancelled(&mut self, at: DateTime<Utc>) {
        assert!(self.is_pending(), "Cannot cancel terminal order");
        self.cancelled = true;
        self.cancelled_at = Some(at);
    }
}

//! Events emitted by the engine and the order desk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Product, Side};
use types::symbol::Symbol;

/// A pending order settled against a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecutedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub product: Product,
    pub quantity: Quantity,
    /// Settlement price (the order's limit)
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Price,
    /// Market price of the tick that triggered the execution
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Price,
    pub executed_at: DateTime<Utc>,
}

/// Order cancelled event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub cancelled_by: CancelSource,
    pub cancelled_at: DateTime<Utc>,
}

/// Who cancelled the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CancelSource {
    User,
    System,
}

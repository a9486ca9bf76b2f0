use std::collections::BTreeMap;

use ledger::LedgerStats;
use market_data::{FanoutStats, FeedStatus};
use matching_engine::{EditOrder, EngineStats, PlaceOrder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, Product, Side};
use types::symbol::Symbol;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub product: Product,
    pub quantity: Quantity,
    pub price: Price,
}

impl CreateOrderRequest {
    pub fn into_place(self) -> Result<PlaceOrder, AppError> {
        let symbol = Symbol::parse(&self.symbol).map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(PlaceOrder {
            symbol,
            side: self.side,
            product: self.product,
            quantity: self.quantity,
            price: self.price,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditOrderRequest {
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub product: Option<Product>,
}

impl EditOrderRequest {
    pub fn into_edit(self) -> Result<EditOrder, AppError> {
        if self.quantity.is_none() && self.price.is_none() && self.product.is_none() {
            return Err(AppError::BadRequest("Nothing to edit".into()));
        }
        Ok(EditOrder {
            quantity: self.quantity,
            price: self.price,
            product: self.product,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub status: OrderStatus,
    #[serde(flatten)]
    pub order: Order,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            status: order.status(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub feed: FeedStatus,
    pub sessions: usize,
    pub pending_orders: usize,
    pub counters: BTreeMap<&'static str, u64>,
}

/// Flatten the component counters into one map.
pub fn counters(
    engine: &EngineStats,
    ledger: &LedgerStats,
    fanout: &FanoutStats,
) -> BTreeMap<&'static str, u64> {
    let read = |counter: &std::sync::atomic::AtomicU64| counter.load(Ordering::Relaxed);
    BTreeMap::from([
        ("engine_ticks", read(&engine.ticks)),
        ("engine_claims", read(&engine.claims)),
        ("engine_executions", read(&engine.executions)),
        ("engine_skipped", read(&engine.skipped)),
        ("engine_failures", read(&engine.failures)),
        ("ledger_places", read(&ledger.places)),
        ("ledger_cancels", read(&ledger.cancels)),
        ("ledger_edits", read(&ledger.edits)),
        ("ledger_executions", read(&ledger.executions)),
        ("ledger_reversals", read(&ledger.reversals)),
        ("ledger_failures", read(&ledger.failures)),
        ("fanout_ticks_received", read(&fanout.ticks_received)),
        ("fanout_frames_sent", read(&fanout.frames_sent)),
        ("fanout_frames_dropped", read(&fanout.frames_dropped)),
        ("fanout_sessions_disconnected", read(&fanout.sessions_disconnected)),
    ])
}

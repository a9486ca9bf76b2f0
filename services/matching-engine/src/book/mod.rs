//! Pending order book
//!
//! In-memory index of every pending order, grouped by symbol so a tick only
//! scans the orders that can react to it. Each entry carries a small claim
//! state: a tick flips matching entries from `Resting` to `Executing` while
//! it holds the symbol's shard, so two ticks racing on the same order can
//! never both claim it. An entry whose funds were settled but whose order
//! record could not be written stays behind as `Settled`: no tick claims it
//! and the desk refuses to cancel or edit it.
//!
//! The record store stays authoritative. The book is rebuilt from it at
//! startup and kept in step by the order desk and the engine.

use std::collections::BTreeMap;

use dashmap::DashMap;
use types::ids::{OrderId, UserId};
use types::numeric::Price;
use types::order::{Order, Side};
use types::symbol::Symbol;

use crate::matching::triggers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Resting,
    Executing,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub limit_price: Price,
    pub state: ClaimState,
}

/// An order a tick has claimed for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
}

#[derive(Debug, Default)]
pub struct PendingBook {
    /// BTreeMap keeps v7 ids in placement order
    books: DashMap<Symbol, BTreeMap<OrderId, PendingEntry>>,
}

impl PendingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a pending order. Terminal orders are ignored.
    pub fn insert(&self, order: &Order) {
        if !order.is_pending() {
            return;
        }
        self.books
            .entry(order.symbol.clone())
            .or_default()
            .insert(order.order_id, Self::entry_for(order, ClaimState::Resting));
    }

    /// Refresh the limit of an edited order, keeping any claim in place.
    pub fn update(&self, order: &Order) {
        let mut book = self.books.entry(order.symbol.clone()).or_default();
        let state = book
            .get(&order.order_id)
            .map_or(ClaimState::Resting, |entry| entry.state);
        book.insert(order.order_id, Self::entry_for(order, state));
    }

    fn entry_for(order: &Order, state: ClaimState) -> PendingEntry {
        PendingEntry {
            order_id: order.order_id,
            user_id: order.user_id,
            side: order.side,
            limit_price: order.price,
            state,
        }
    }

    /// Drop an order. Returns whether it was tracked.
    pub fn remove(&self, symbol: &Symbol, order_id: OrderId) -> bool {
        let removed = match self.books.get_mut(symbol) {
            Some(mut book) => book.remove(&order_id).is_some(),
            None => false,
        };
        self.books.remove_if(symbol, |_, book| book.is_empty());
        removed
    }

    /// Return a claimed order to `Resting` so later ticks can retry it.
    pub fn release(&self, symbol: &Symbol, order_id: OrderId) {
        self.transition(symbol, order_id, ClaimState::Executing, ClaimState::Resting);
    }

    /// Pin a claimed order whose execution is settled in the ledger but not
    /// recorded in the store.
    pub fn mark_settled(&self, symbol: &Symbol, order_id: OrderId) {
        self.transition(symbol, order_id, ClaimState::Executing, ClaimState::Settled);
    }

    fn transition(&self, symbol: &Symbol, order_id: OrderId, from: ClaimState, to: ClaimState) {
        if let Some(mut book) = self.books.get_mut(symbol) {
            if let Some(entry) = book.get_mut(&order_id) {
                if entry.state == from {
                    entry.state = to;
                }
            }
        }
    }

    /// Claim every resting order on `symbol` that `price` triggers.
    pub fn claim_triggered(&self, symbol: &Symbol, price: Price) -> Vec<Claim> {
        let Some(mut book) = self.books.get_mut(symbol) else {
            return Vec::new();
        };
        let claims = book
            .values_mut()
            .filter(|entry| {
                entry.state == ClaimState::Resting
                    && triggers(entry.side, entry.limit_price, price)
            })
            .map(|entry| {
                entry.state = ClaimState::Executing;
                Claim {
                    order_id: entry.order_id,
                    user_id: entry.user_id,
                    symbol: symbol.clone(),
                }
            })
            .collect();
        claims
    }

    pub fn get(&self, symbol: &Symbol, order_id: OrderId) -> Option<PendingEntry> {
        self.books
            .get(symbol)
            .and_then(|book| book.get(&order_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.books.iter().map(|book| book.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Symbols with at least one pending order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use types::order::Product;

    fn order(side: Side, limit: i64) -> Order {
        Order::new(
            UserId::new(),
            Symbol::parse("RELIANCE").unwrap(),
            side,
            Product::Intraday,
            1,
            Decimal::from(limit),
            Utc::now(),
        )
    }

    #[test]
    fn test_claim_only_triggered_orders() {
        let book = PendingBook::new();
        let buy = order(Side::BUY, 100);
        let sell = order(Side::SELL, 120);
        book.insert(&buy);
        book.insert(&sell);

        let claims = book.claim_triggered(&buy.symbol, Decimal::from(95));
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].order_id, buy.order_id);
        assert_eq!(
            book.get(&buy.symbol, buy.order_id).unwrap().state,
            ClaimState::Executing
        );
        assert_eq!(
            book.get(&sell.symbol, sell.order_id).unwrap().state,
            ClaimState::Resting
        );
    }

    #[test]
    fn test_claimed_order_is_not_claimed_twice() {
        let book = PendingBook::new();
        let buy = order(Side::BUY, 100);
        book.insert(&buy);

        assert_eq!(book.claim_triggered(&buy.symbol, Decimal::from(95)).len(), 1);
        assert!(book.claim_triggered(&buy.symbol, Decimal::from(90)).is_empty());

        book.release(&buy.symbol, buy.order_id);
        assert_eq!(book.claim_triggered(&buy.symbol, Decimal::from(90)).len(), 1);
    }

    #[test]
    fn test_update_keeps_claim_and_moves_limit() {
        let book = PendingBook::new();
        let mut buy = order(Side::BUY, 100);
        book.insert(&buy);
        book.claim_triggered(&buy.symbol, Decimal::from(99));

        buy.price = Decimal::from(80);
        book.update(&buy);
        let entry = book.get(&buy.symbol, buy.order_id).unwrap();
        assert_eq!(entry.limit_price, Decimal::from(80));
        assert_eq!(entry.state, ClaimState::Executing);
    }

    #[test]
    fn test_remove_drops_empty_symbol() {
        let book = PendingBook::new();
        let buy = order(Side::BUY, 100);
        book.insert(&buy);
        assert_eq!(book.symbols().len(), 1);

        assert!(book.remove(&buy.symbol, buy.order_id));
        assert!(!book.remove(&buy.symbol, buy.order_id));
        assert!(book.is_empty());
        assert!(book.symbols().is_empty());
    }

    #[test]
    fn test_terminal_orders_are_not_tracked() {
        let book = PendingBook::new();
        let mut buy = order(Side::BUY, 100);
        buy.mark_cancelled(Utc::now());
        book.insert(&buy);
        assert!(book.is_empty());
    }

    #[test]
    fn test_settled_order_is_never_reclaimed() {
        let book = PendingBook::new();
        let buy = order(Side::BUY, 100);
        book.insert(&buy);
        book.claim_triggered(&buy.symbol, Decimal::from(95));

        book.mark_settled(&buy.symbol, buy.order_id);
        book.release(&buy.symbol, buy.order_id);
        assert_eq!(
            book.get(&buy.symbol, buy.order_id).unwrap().state,
            ClaimState::Settled
        );
        assert!(book.claim_triggered(&buy.symbol, Decimal::from(90)).is_empty());
        assert_eq!(book.len(), 1);
    }
}

//! In-memory record store
//!
//! Each collection is a `DashMap`, so every single-document operation is
//! atomic with respect to other operations on the same key.

use async_trait::async_trait;
use dashmap::DashMap;
use types::funds::FundsRecord;
use types::ids::{OrderId, UserId};
use types::order::{Order, Product};
use types::position::Position;
use types::symbol::Symbol;

use crate::{OrderFilter, RecordStore, StoreError};

type PositionKey = (UserId, Symbol);

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: DashMap<OrderId, Order>,
    funds: DashMap<UserId, FundsRecord>,
    holdings: DashMap<PositionKey, Position>,
    positions: DashMap<PositionKey, Position>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, product: Product) -> &DashMap<PositionKey, Position> {
        match product {
            Product::Delivery => &self.holdings,
            Product::Intraday => &self.positions,
        }
    }

    /// Number of stored orders in any state.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&order_id).map(|entry| entry.clone()))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.orders.entry(order.order_id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(order.order_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        match self.orders.get_mut(&order.order_id) {
            Some(mut entry) => {
                *entry = order.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(order.order_id.to_string())),
        }
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.orders.remove(&order_id).is_some())
    }

    async fn find_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut found: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        // UUID v7 ids sort by creation time
        found.sort_by_key(|order| order.order_id);
        Ok(found)
    }

    async fn load_funds(&self, user_id: UserId) -> Result<Option<FundsRecord>, StoreError> {
        Ok(self.funds.get(&user_id).map(|entry| entry.clone()))
    }

    async fn save_funds(&self, record: &FundsRecord) -> Result<(), StoreError> {
        self.funds.insert(record.user_id, record.clone());
        Ok(())
    }

    async fn load_position(
        &self,
        user_id: UserId,
        symbol: &Symbol,
        product: Product,
    ) -> Result<Option<Position>, StoreError> {
        Ok(self
            .book(product)
            .get(&(user_id, symbol.clone()))
            .map(|entry| entry.clone()))
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        self.book(position.product).insert(
            (position.user_id, position.symbol.clone()),
            position.clone(),
        );
        Ok(())
    }

    async fn delete_position(
        &self,
        user_id: UserId,
        symbol: &Symbol,
        product: Product,
    ) -> Result<bool, StoreError> {
        Ok(self
            .book(product)
            .remove(&(user_id, symbol.clone()))
            .is_some())
    }

    async fn find_positions(&self, product: Product) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .book(product)
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use types::order::Side;

    fn make_order(user_id: UserId, symbol: &str) -> Order {
        Order::new(
            user_id,
            Symbol::parse(symbol).unwrap(),
            Side::BUY,
            Product::Delivery,
            10,
            Decimal::from(100),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_load_order() {
        let store = MemoryStore::new();
        let order = make_order(UserId::new(), "INFY");
        store.insert_order(&order).await.unwrap();

        let loaded = store.load_order(order.order_id).await.unwrap();
        assert_eq!(loaded, Some(order.clone()));

        let err = store.insert_order(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_missing_order_fails() {
        let store = MemoryStore::new();
        let order = make_order(UserId::new(), "INFY");
        let err = store.update_order(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_pending_by_symbol() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let infy = make_order(user, "INFY");
        let tcs = make_order(user, "TCS");
        let mut done = make_order(user, "INFY");
        done.mark_executed(Decimal::from(100), Utc::now());

        for order in [&infy, &tcs, &done] {
            store.insert_order(order).await.unwrap();
        }

        let filter = OrderFilter::pending().for_symbol(Symbol::parse("infy").unwrap());
        let found = store.find_orders(&filter).await.unwrap();
        assert_eq!(found, vec![infy]);
    }

    #[tokio::test]
    async fn test_executed_before_filter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut old = make_order(UserId::new(), "INFY");
        old.mark_executed(Decimal::from(100), now - Duration::days(40));
        let mut recent = make_order(UserId::new(), "INFY");
        recent.mark_executed(Decimal::from(100), now - Duration::days(1));
        let pending = make_order(UserId::new(), "INFY");

        for order in [&old, &recent, &pending] {
            store.insert_order(order).await.unwrap();
        }

        let found = store
            .find_orders(&OrderFilter::executed_before(now - Duration::days(30)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, old.order_id);
    }

    #[tokio::test]
    async fn test_holdings_and_positions_are_separate() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let symbol = Symbol::parse("SBIN").unwrap();
        let holding = Position::new(user, symbol.clone(), Product::Delivery, 5, Decimal::from(80), Utc::now());
        store.save_position(&holding).await.unwrap();

        assert!(store
            .load_position(user, &symbol, Product::Intraday)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.load_position(user, &symbol, Product::Delivery).await.unwrap(),
            Some(holding)
        );
        assert_eq!(store.find_positions(Product::Delivery).await.unwrap().len(), 1);
        assert!(store.delete_position(user, &symbol, Product::Delivery).await.unwrap());
        assert!(!store.delete_position(user, &symbol, Product::Delivery).await.unwrap());
    }
}

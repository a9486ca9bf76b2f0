//! Order desk
//!
//! Entry points for placing, editing and cancelling limit orders. Each call
//! runs under the owner's lock and moves the order record, the funds ledger
//! and the pending book together, undoing the ledger step if the record
//! write that follows it fails.

use std::sync::Arc;

use chrono::Utc;
use ledger::{Fill, FundsLedger, LedgerAction, LedgerError, UserGuard};
use persistence::{OrderFilter, RecordStore, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use types::ids::{OrderId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, Product, Side};
use types::symbol::Symbol;

use crate::book::{ClaimState, PendingBook};
use crate::events::{CancelSource, OrderCancelledEvent};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeskError {
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(Quantity),

    #[error("Price must be positive, got {0}")]
    InvalidPrice(Price),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order {0} belongs to another user")]
    NotOwner(OrderId),

    #[error("Order {order_id} is already {status:?}")]
    AlreadyTerminal {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// New order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub product: Product,
    pub quantity: Quantity,
    pub price: Price,
}

/// Edit request; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditOrder {
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub product: Option<Product>,
}

pub struct OrderDesk {
    store: Arc<dyn RecordStore>,
    ledger: Arc<FundsLedger>,
    book: Arc<PendingBook>,
}

impl OrderDesk {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<FundsLedger>,
        book: Arc<PendingBook>,
    ) -> Self {
        Self { store, ledger, book }
    }

    pub async fn place(&self, user_id: UserId, request: PlaceOrder) -> Result<Order, DeskError> {
        validate(request.quantity, request.price)?;

        let guard = self.ledger.lock_user(user_id).await;
        let order = Order::new(
            user_id,
            request.symbol,
            request.side,
            request.product,
            request.quantity,
            request.price,
            Utc::now(),
        );

        if order.side == Side::BUY {
            self.ensure_cash(user_id, order.notional()).await?;
        }

        self.store.insert_order(&order).await?;
        if let Err(err) = self
            .ledger
            .apply(&guard, LedgerAction::Place, &order, None)
            .await
        {
            if let Err(cleanup) = self.store.delete_order(order.order_id).await {
                error!(order_id = %order.order_id, error = %cleanup, "Failed to remove order after ledger failure");
            }
            return Err(err.into());
        }

        self.book.insert(&order);
        info!(
            user_id = %user_id,
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = ?order.side,
            quantity = order.quantity,
            price = %order.price,
            "Order placed"
        );
        Ok(order)
    }

    pub async fn edit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        request: EditOrder,
    ) -> Result<Order, DeskError> {
        let guard = self.ledger.lock_user(user_id).await;
        let current = self.load_pending(order_id, Some(user_id)).await?;

        let mut edited = current.clone();
        edited.quantity = request.quantity.unwrap_or(current.quantity);
        edited.price = request.price.unwrap_or(current.price);
        edited.product = request.product.unwrap_or(current.product);
        validate(edited.quantity, edited.price)?;

        if edited.side == Side::BUY {
            let increment = edited.notional() - current.notional();
            if increment > Decimal::ZERO {
                self.ensure_cash(user_id, increment).await?;
            }
        }

        self.swap_reservation(&guard, &current, &edited).await?;
        if let Err(err) = self.store.update_order(&edited).await {
            if let Err(undo) = self.swap_reservation(&guard, &edited, &current).await {
                error!(order_id = %order_id, error = %undo, "Failed to restore ledger after edit failure");
            }
            return Err(err.into());
        }

        self.book.update(&edited);
        info!(
            user_id = %user_id,
            order_id = %order_id,
            quantity = edited.quantity,
            price = %edited.price,
            product = ?edited.product,
            "Order edited"
        );
        Ok(edited)
    }

    /// Cancel on behalf of the owner.
    pub async fn cancel(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<OrderCancelledEvent, DeskError> {
        let guard = self.ledger.lock_user(user_id).await;
        let order = self.load_pending(order_id, Some(user_id)).await?;
        self.cancel_locked(&guard, order, CancelSource::User).await
    }

    /// Cancel without an ownership check. Used by the scheduled sweep.
    pub async fn expire(&self, order: &Order) -> Result<OrderCancelledEvent, DeskError> {
        let guard = self.ledger.lock_user(order.user_id).await;
        let order = self.load_pending(order.order_id, None).await?;
        self.cancel_locked(&guard, order, CancelSource::System).await
    }

    /// A user's orders, oldest first.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Order>, DeskError> {
        Ok(self
            .store
            .find_orders(&OrderFilter::all().for_user(user_id))
            .await?)
    }

    async fn cancel_locked(
        &self,
        guard: &UserGuard,
        order: Order,
        source: CancelSource,
    ) -> Result<OrderCancelledEvent, DeskError> {
        self.ledger
            .apply(guard, LedgerAction::Cancel, &order, None)
            .await?;

        let mut cancelled = order.clone();
        let at = Utc::now();
        cancelled.mark_cancelled(at);
        if let Err(err) = self.store.update_order(&cancelled).await {
            if let Err(undo) = self
                .ledger
                .apply(guard, LedgerAction::Place, &order, None)
                .await
            {
                error!(order_id = %order.order_id, error = %undo, "Failed to restore ledger after cancel failure");
            }
            return Err(err.into());
        }

        self.book.remove(&order.symbol, order.order_id);
        info!(
            user_id = %order.user_id,
            order_id = %order.order_id,
            source = ?source,
            "Order cancelled"
        );
        Ok(OrderCancelledEvent {
            order_id: order.order_id,
            user_id: order.user_id,
            cancelled_by: source,
            cancelled_at: at,
        })
    }

    /// Release `from`'s amount and commit `to`'s.
    async fn swap_reservation(
        &self,
        guard: &UserGuard,
        from: &Order,
        to: &Order,
    ) -> Result<(), LedgerError> {
        let revert = Fill {
            quantity: from.quantity,
            price: from.price,
        };
        self.ledger
            .apply(guard, LedgerAction::EditRevert, from, Some(revert))
            .await?;

        if let Err(err) = self
            .ledger
            .apply(guard, LedgerAction::EditApply, to, None)
            .await
        {
            if let Err(undo) = self
                .ledger
                .apply(guard, LedgerAction::EditApply, from, None)
                .await
            {
                warn!(order_id = %from.order_id, error = %undo, "Failed to re-apply pre-edit amount");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn load_pending(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
    ) -> Result<Order, DeskError> {
        let order = self
            .store
            .load_order(order_id)
            .await?
            .ok_or(DeskError::OrderNotFound(order_id))?;

        if owner.is_some_and(|user_id| user_id != order.user_id) {
            return Err(DeskError::NotOwner(order_id));
        }
        if !order.is_pending() {
            return Err(DeskError::AlreadyTerminal {
                order_id,
                status: order.status(),
            });
        }
        // Settled in the ledger although the record still reads pending
        let settled = self
            .book
            .get(&order.symbol, order_id)
            .is_some_and(|entry| entry.state == ClaimState::Settled);
        if settled {
            return Err(DeskError::AlreadyTerminal {
                order_id,
                status: OrderStatus::Executed,
            });
        }
        Ok(order)
    }

    async fn ensure_cash(&self, user_id: UserId, required: Decimal) -> Result<(), DeskError> {
        let funds = self.ledger.funds(user_id).await?;
        if funds.available_cash < required {
            return Err(DeskError::InsufficientFunds {
                required,
                available: funds.available_cash,
            });
        }
        Ok(())
    }
}

fn validate(quantity: Quantity, price: Price) -> Result<(), DeskError> {
    if quantity == 0 {
        return Err(DeskError::InvalidQuantity(quantity));
    }
    if price <= Decimal::ZERO {
        return Err(DeskError::InvalidPrice(price));
    }
    // q·p must stay inside the decimal range
    if Decimal::from(quantity).checked_mul(price).is_none() {
        return Err(DeskError::InvalidPrice(price));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryStore;
    use types::funds::FundsRecord;

    struct Fixture {
        store: Arc<MemoryStore>,
        book: Arc<PendingBook>,
        desk: OrderDesk,
        user: UserId,
    }

    async fn fixture(cash: i64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        store
            .save_funds(&FundsRecord::new(user, Decimal::from(cash), Utc::now()))
            .await
            .unwrap();
        let ledger = Arc::new(FundsLedger::new(store.clone()));
        let book = Arc::new(PendingBook::new());
        let desk = OrderDesk::new(store.clone(), ledger, book.clone());
        Fixture { store, book, desk, user }
    }

    fn buy(quantity: Quantity, price: i64) -> PlaceOrder {
        PlaceOrder {
            symbol: Symbol::parse("INFY").unwrap(),
            side: Side::BUY,
            product: Product::Delivery,
            quantity,
            price: Decimal::from(price),
        }
    }

    async fn funds(f: &Fixture) -> FundsRecord {
        f.store.load_funds(f.user).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_place_reserves_and_tracks() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(10, 100)).await.unwrap();

        let record = funds(&f).await;
        assert_eq!(record.available_cash, Decimal::from(9_000));
        assert_eq!(record.used_margin, Decimal::from(1_000));
        assert!(f.book.get(&order.symbol, order.order_id).is_some());
        assert!(f.store.load_order(order.order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_place_rejects_bad_input() {
        let f = fixture(10_000).await;
        assert_eq!(
            f.desk.place(f.user, buy(0, 100)).await.unwrap_err(),
            DeskError::InvalidQuantity(0)
        );
        assert!(matches!(
            f.desk.place(f.user, buy(1, 0)).await.unwrap_err(),
            DeskError::InvalidPrice(_)
        ));
        assert_eq!(f.store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_place_rejects_insufficient_cash() {
        let f = fixture(500).await;
        let err = f.desk.place(f.user, buy(10, 100)).await.unwrap_err();
        assert!(matches!(err, DeskError::InsufficientFunds { .. }));
        assert_eq!(f.store.order_count(), 0);
        assert!(f.book.is_empty());
    }

    #[tokio::test]
    async fn test_place_without_funds_record_leaves_no_order() {
        let f = fixture(1_000).await;
        let stranger = UserId::new();
        let mut request = buy(1, 10);
        request.side = Side::SELL;

        let err = f.desk.place(stranger, request).await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Ledger(LedgerError::FundsNotFound { .. })
        ));
        assert_eq!(f.store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_edit_moves_reservation() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(10, 100)).await.unwrap();

        let edited = f
            .desk
            .edit(
                f.user,
                order.order_id,
                EditOrder {
                    quantity: Some(20),
                    price: Some(Decimal::from(110)),
                    product: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.quantity, 20);
        let record = funds(&f).await;
        assert_eq!(record.available_cash, Decimal::from(7_800));
        assert_eq!(record.used_margin, Decimal::from(2_200));
        assert_eq!(
            f.book.get(&order.symbol, order.order_id).unwrap().limit_price,
            Decimal::from(110)
        );
    }

    #[tokio::test]
    async fn test_edit_checks_only_the_increment() {
        let f = fixture(1_500).await;
        let order = f.desk.place(f.user, buy(10, 100)).await.unwrap();

        // 500 left; raising to 1400 needs 400 more
        f.desk
            .edit(
                f.user,
                order.order_id,
                EditOrder {
                    quantity: Some(14),
                    price: None,
                    product: None,
                },
            )
            .await
            .unwrap();

        let err = f
            .desk
            .edit(
                f.user,
                order.order_id,
                EditOrder {
                    quantity: Some(20),
                    price: None,
                    product: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::InsufficientFunds { .. }));
        assert_eq!(funds(&f).await.used_margin, Decimal::from(1_400));
    }

    #[tokio::test]
    async fn test_edit_switches_product() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(10, 100)).await.unwrap();

        let edited = f
            .desk
            .edit(
                f.user,
                order.order_id,
                EditOrder {
                    product: Some(Product::Intraday),
                    ..EditOrder::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.product, Product::Intraday);
        assert_eq!(edited.quantity, 10);
        assert_eq!(edited.price, Decimal::from(100));
        let stored = f.store.load_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.product, Product::Intraday);
        assert_eq!(funds(&f).await.used_margin, Decimal::from(1_000));
    }

    #[tokio::test]
    async fn test_cancel_releases_and_untracks() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(10, 100)).await.unwrap();

        let event = f.desk.cancel(f.user, order.order_id).await.unwrap();
        assert_eq!(event.cancelled_by, CancelSource::User);

        let record = funds(&f).await;
        assert_eq!(record.available_cash, Decimal::from(10_000));
        assert_eq!(record.used_margin, Decimal::ZERO);
        assert!(f.book.is_empty());

        let err = f.desk.cancel(f.user, order.order_id).await.unwrap_err();
        assert_eq!(
            err,
            DeskError::AlreadyTerminal {
                order_id: order.order_id,
                status: OrderStatus::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_order() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(1, 100)).await.unwrap();
        let intruder = UserId::new();

        assert_eq!(
            f.desk.cancel(intruder, order.order_id).await.unwrap_err(),
            DeskError::NotOwner(order.order_id)
        );
        assert_eq!(
            f.desk
                .edit(intruder, order.order_id, EditOrder::default())
                .await
                .unwrap_err(),
            DeskError::NotOwner(order.order_id)
        );
    }

    #[tokio::test]
    async fn test_expire_is_a_system_cancel() {
        let f = fixture(10_000).await;
        let order = f.desk.place(f.user, buy(2, 100)).await.unwrap();

        let event = f.desk.expire(&order).await.unwrap();
        assert_eq!(event.cancelled_by, CancelSource::System);
        assert_eq!(funds(&f).await.available_cash, Decimal::from(10_000));
    }

    #[tokio::test]
    async fn test_list_returns_users_orders() {
        let f = fixture(10_000).await;
        f.desk.place(f.user, buy(1, 100)).await.unwrap();
        f.desk.place(f.user, buy(2, 100)).await.unwrap();
        assert_eq!(f.desk.list(f.user).await.unwrap().len(), 2);
        assert!(f.desk.list(UserId::new()).await.unwrap().is_empty());
    }
}

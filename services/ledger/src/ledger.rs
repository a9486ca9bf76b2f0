//! Funds Ledger orchestrator
//!
//! One record per user, mutated only through [`FundsLedger::apply`]. Every
//! call loads the record, applies one lifecycle action, recomputes the
//! derived `available_margin` and persists, all under the caller-held
//! [`UserGuard`] for that user.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use persistence::{RecordStore, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use types::funds::FundsRecord;
use types::ids::{OrderId, UserId};
use types::numeric::{notional, Price, Quantity};
use types::order::{Order, Side};

use crate::locks::{UserGuard, UserLocks};
use crate::margin;

/// Order lifecycle action applied to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Place,
    Cancel,
    /// Undo the pre-edit amount before an edit takes effect
    EditRevert,
    /// Commit the post-edit amount
    EditApply,
    Execute,
    /// Undo an execution whose order record could not be written
    ExecuteRevert,
}

/// Quantity/price override for a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub quantity: Quantity,
    pub price: Price,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Funds record not found for user {user_id}")]
    FundsNotFound { user_id: UserId },

    #[error("Lock for user {held} does not cover order of user {owner}")]
    WrongUser { held: UserId, owner: UserId },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one successful ledger action.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub order_id: OrderId,
    pub action: LedgerAction,
    /// quantity × price used for the action
    pub amount: Decimal,
    /// Released basis, SELL executions only
    pub basis: Option<Decimal>,
    pub record: FundsRecord,
}

/// Per-action counters.
#[derive(Debug, Default)]
pub struct LedgerStats {
    pub places: AtomicU64,
    pub cancels: AtomicU64,
    pub edits: AtomicU64,
    pub executions: AtomicU64,
    pub reversals: AtomicU64,
    pub failures: AtomicU64,
}

impl LedgerStats {
    fn record(&self, action: LedgerAction) {
        let counter = match action {
            LedgerAction::Place => &self.places,
            LedgerAction::Cancel => &self.cancels,
            LedgerAction::EditRevert | LedgerAction::EditApply => &self.edits,
            LedgerAction::Execute => &self.executions,
            LedgerAction::ExecuteRevert => &self.reversals,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct FundsLedger {
    store: Arc<dyn RecordStore>,
    locks: UserLocks,
    stats: LedgerStats,
}

impl FundsLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
            stats: LedgerStats::default(),
        }
    }

    /// Acquire the user's lock. Hold it across every read-modify-persist
    /// step that must be atomic with the ledger mutation.
    pub async fn lock_user(&self, user_id: UserId) -> UserGuard {
        self.locks.lock(user_id).await
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }

    /// Current record for a user.
    pub async fn funds(&self, user_id: UserId) -> Result<FundsRecord, LedgerError> {
        self.store
            .load_funds(user_id)
            .await?
            .ok_or(LedgerError::FundsNotFound { user_id })
    }

    /// Apply one lifecycle action for `order`.
    ///
    /// `fill` overrides the order's own quantity/price (edits pass the pre-
    /// or post-edit values). A missing funds record fails the action; a
    /// record is never created implicitly.
    pub async fn apply(
        &self,
        guard: &UserGuard,
        action: LedgerAction,
        order: &Order,
        fill: Option<Fill>,
    ) -> Result<LedgerEntry, LedgerError> {
        let result = self.apply_inner(guard, action, order, fill).await;
        match &result {
            Ok(entry) => {
                self.stats.record(action);
                debug!(
                    user_id = %order.user_id,
                    order_id = %order.order_id,
                    action = ?action,
                    amount = %entry.amount,
                    available_margin = %entry.record.available_margin,
                    "Ledger action applied"
                );
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    user_id = %order.user_id,
                    order_id = %order.order_id,
                    action = ?action,
                    error = %err,
                    "Ledger action failed"
                );
            }
        }
        result
    }

    async fn apply_inner(
        &self,
        guard: &UserGuard,
        action: LedgerAction,
        order: &Order,
        fill: Option<Fill>,
    ) -> Result<LedgerEntry, LedgerError> {
        if guard.user_id() != order.user_id {
            return Err(LedgerError::WrongUser {
                held: guard.user_id(),
                owner: order.user_id,
            });
        }

        let user_id = order.user_id;
        let mut record = self
            .store
            .load_funds(user_id)
            .await?
            .ok_or(LedgerError::FundsNotFound { user_id })?;

        let Fill { quantity, price } = fill.unwrap_or(Fill {
            quantity: order.quantity,
            price: order.price,
        });
        let amount = notional(quantity, price);
        let mut basis = None;

        match (action, order.side) {
            (LedgerAction::Place | LedgerAction::EditApply, Side::BUY) => {
                margin::reserve(&mut record, amount);
            }
            (LedgerAction::Cancel | LedgerAction::EditRevert, Side::BUY) => {
                margin::release(&mut record, amount);
            }
            (LedgerAction::Execute, Side::BUY) => {
                margin::settle_buy(&mut record, amount);
            }
            (LedgerAction::Execute, Side::SELL) => {
                let released = self.sell_basis(order, quantity, amount).await?;
                margin::settle_sell(&mut record, amount, released);
                basis = Some(released);
            }
            (LedgerAction::ExecuteRevert, Side::BUY) => {
                margin::unsettle_buy(&mut record, amount);
            }
            // Runs before the fill touches the position, so the basis
            // resolves to the same value the execution released
            (LedgerAction::ExecuteRevert, Side::SELL) => {
                let released = self.sell_basis(order, quantity, amount).await?;
                margin::unsettle_sell(&mut record, amount, released);
                basis = Some(released);
            }
            // SELL orders commit nothing at placement
            (_, Side::SELL) => {}
        }

        record.recompute(Utc::now());
        self.store.save_funds(&record).await?;

        Ok(LedgerEntry {
            order_id: order.order_id,
            action,
            amount,
            basis,
            record,
        })
    }

    /// Basis released by a SELL: the order's recorded average, else the
    /// holding (Delivery) or position (Intraday) average cost, else the
    /// proceeds themselves (zero P&L).
    async fn sell_basis(
        &self,
        order: &Order,
        quantity: Quantity,
        proceeds: Decimal,
    ) -> Result<Decimal, LedgerError> {
        if let Some(average) = order.average_price {
            return Ok(notional(quantity, average));
        }

        let held = self
            .store
            .load_position(order.user_id, &order.symbol, order.product)
            .await?;

        Ok(match held {
            Some(position) => position.basis_for(quantity),
            None => proceeds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryStore;
    use types::order::Product;
    use types::position::Position;
    use types::symbol::Symbol;

    async fn setup(cash: i64) -> (Arc<MemoryStore>, FundsLedger, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        store
            .save_funds(&FundsRecord::new(user, Decimal::from(cash), Utc::now()))
            .await
            .unwrap();
        let ledger = FundsLedger::new(store.clone());
        (store, ledger, user)
    }

    fn make_order(user: UserId, side: Side, product: Product, qty: u64, price: i64) -> Order {
        Order::new(
            user,
            Symbol::parse("INFY").unwrap(),
            side,
            product,
            qty,
            Decimal::from(price),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_place_then_cancel_scenario() {
        let (_, ledger, user) = setup(10_000).await;
        let order = make_order(user, Side::BUY, Product::Delivery, 10, 100);
        let guard = ledger.lock_user(user).await;

        let placed = ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap();
        assert_eq!(placed.record.available_cash, Decimal::from(9_000));
        assert_eq!(placed.record.used_margin, Decimal::from(1_000));
        assert_eq!(placed.record.exposure, Decimal::from(1_000));

        let cancelled = ledger.apply(&guard, LedgerAction::Cancel, &order, None).await.unwrap();
        assert_eq!(cancelled.record.available_cash, Decimal::from(10_000));
        assert_eq!(cancelled.record.used_margin, Decimal::ZERO);
        assert_eq!(cancelled.record.exposure, Decimal::ZERO);
        assert!(cancelled.record.check_invariant());
    }

    #[tokio::test]
    async fn test_edit_revert_apply() {
        let (_, ledger, user) = setup(10_000).await;
        let order = make_order(user, Side::BUY, Product::Intraday, 10, 100);
        let guard = ledger.lock_user(user).await;
        ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap();

        ledger
            .apply(&guard, LedgerAction::EditRevert, &order, None)
            .await
            .unwrap();
        let applied = ledger
            .apply(
                &guard,
                LedgerAction::EditApply,
                &order,
                Some(Fill { quantity: 20, price: Decimal::from(90) }),
            )
            .await
            .unwrap();

        assert_eq!(applied.amount, Decimal::from(1_800));
        assert_eq!(applied.record.available_cash, Decimal::from(8_200));
        assert_eq!(applied.record.used_margin, Decimal::from(1_800));
        assert_eq!(applied.record.exposure, Decimal::from(1_800));
    }

    #[tokio::test]
    async fn test_execute_buy_releases_margin_only() {
        let (_, ledger, user) = setup(10_000).await;
        let order = make_order(user, Side::BUY, Product::Delivery, 10, 100);
        let guard = ledger.lock_user(user).await;
        ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap();

        let executed = ledger.apply(&guard, LedgerAction::Execute, &order, None).await.unwrap();
        assert_eq!(executed.record.available_cash, Decimal::from(9_000));
        assert_eq!(executed.record.used_margin, Decimal::ZERO);
        assert_eq!(executed.record.exposure, Decimal::ZERO);
        assert_eq!(ledger.stats().executions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_execute_revert_restores_reservation() {
        let (_, ledger, user) = setup(10_000).await;
        let order = make_order(user, Side::BUY, Product::Delivery, 10, 100);
        let guard = ledger.lock_user(user).await;
        let placed = ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap();
        ledger.apply(&guard, LedgerAction::Execute, &order, None).await.unwrap();

        let reverted = ledger
            .apply(&guard, LedgerAction::ExecuteRevert, &order, None)
            .await
            .unwrap();
        assert_eq!(reverted.record.available_cash, placed.record.available_cash);
        assert_eq!(reverted.record.used_margin, Decimal::from(1_000));
        assert_eq!(reverted.record.exposure, Decimal::from(1_000));
        assert_eq!(ledger.stats().reversals.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_sell_delivery_uses_holding_average() {
        let (store, ledger, user) = setup(0).await;
        let symbol = Symbol::parse("INFY").unwrap();
        store
            .save_position(&Position::new(
                user,
                symbol,
                Product::Delivery,
                10,
                Decimal::from(80),
                Utc::now(),
            ))
            .await
            .unwrap();

        let order = make_order(user, Side::SELL, Product::Delivery, 5, 100);
        let guard = ledger.lock_user(user).await;
        let entry = ledger.apply(&guard, LedgerAction::Execute, &order, None).await.unwrap();

        assert_eq!(entry.basis, Some(Decimal::from(400)));
        assert_eq!(entry.record.available_cash, Decimal::from(500));
        assert_eq!(entry.record.realised_pnl, Decimal::from(100));
        assert_eq!(entry.record.used_margin, Decimal::from(-400));
        assert_eq!(entry.record.exposure, Decimal::from(-400));
    }

    #[tokio::test]
    async fn test_sell_intraday_does_not_read_holdings() {
        let (store, ledger, user) = setup(0).await;
        store
            .save_position(&Position::new(
                user,
                Symbol::parse("INFY").unwrap(),
                Product::Delivery,
                10,
                Decimal::from(80),
                Utc::now(),
            ))
            .await
            .unwrap();

        let order = make_order(user, Side::SELL, Product::Intraday, 5, 100);
        let guard = ledger.lock_user(user).await;
        let entry = ledger.apply(&guard, LedgerAction::Execute, &order, None).await.unwrap();

        // No intraday position: zero P&L fallback
        assert_eq!(entry.basis, Some(Decimal::from(500)));
        assert_eq!(entry.record.realised_pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_sell_prefers_recorded_average() {
        let (_, ledger, user) = setup(0).await;
        let order = make_order(user, Side::SELL, Product::Intraday, 4, 50)
            .with_average_price(Decimal::from(60));
        let guard = ledger.lock_user(user).await;
        let entry = ledger.apply(&guard, LedgerAction::Execute, &order, None).await.unwrap();

        assert_eq!(entry.basis, Some(Decimal::from(240)));
        assert_eq!(entry.record.realised_pnl, Decimal::from(-40));
    }

    #[tokio::test]
    async fn test_missing_record_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let ledger = FundsLedger::new(store.clone());
        let user = UserId::new();
        let order = make_order(user, Side::BUY, Product::Delivery, 1, 10);
        let guard = ledger.lock_user(user).await;

        let err = ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap_err();
        assert_eq!(err, LedgerError::FundsNotFound { user_id: user });
        assert!(store.load_funds(user).await.unwrap().is_none());
        assert_eq!(ledger.stats().failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_sell_cancel_still_requires_record() {
        let store = Arc::new(MemoryStore::new());
        let ledger = FundsLedger::new(store);
        let user = UserId::new();
        let order = make_order(user, Side::SELL, Product::Delivery, 1, 10);
        let guard = ledger.lock_user(user).await;

        assert!(ledger.apply(&guard, LedgerAction::Cancel, &order, None).await.is_err());
    }

    #[tokio::test]
    async fn test_guard_must_match_owner() {
        let (_, ledger, user) = setup(1_000).await;
        let order = make_order(user, Side::BUY, Product::Delivery, 1, 10);
        let other = UserId::new();
        let guard = ledger.lock_user(other).await;

        let err = ledger.apply(&guard, LedgerAction::Place, &order, None).await.unwrap_err();
        assert_eq!(err, LedgerError::WrongUser { held: other, owner: user });
    }
}

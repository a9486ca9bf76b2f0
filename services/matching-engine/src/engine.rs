//! Matching engine core
//!
//! Consumes ticks, finds the pending orders each tick triggers and settles
//! them. Settlement of one order is at-most-once:
//!
//! 1. the tick claims the order in the [`PendingBook`] (only one claim can
//!    be outstanding per order)
//! 2. the owner's lock is taken and the order re-read from the store; a
//!    terminal order or one an edit moved out of range is skipped
//! 3. the ledger settles at the order's limit price
//! 4. the order is marked executed and the holding/position updated
//!
//! A ledger failure returns the claim so a later tick can retry. If the
//! executed order cannot be written after a few tries, the ledger settlement
//! is reversed and the order returns to the book as pending. When even the
//! reversal fails the entry is pinned as settled so neither later ticks nor
//! the desk touch it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use ledger::{FundsLedger, LedgerAction, UserGuard};
use persistence::{OrderFilter, RecordStore, StoreError};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};
use types::numeric::Price;
use types::order::Order;
use types::tick::Tick;

use crate::book::{Claim, PendingBook};
use crate::events::OrderExecutedEvent;
use crate::matching::{apply_fill, triggers};

/// Matching engine configuration
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Bounded tick queue between the feed and the engine
    pub queue_capacity: usize,
    /// Ticks processed concurrently
    pub max_concurrent_ticks: usize,
    /// Tries for the executed order write before settlement is reversed
    pub write_attempts: u32,
    /// Delay before the second try, doubled after each failure
    pub write_backoff: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            max_concurrent_ticks: 64,
            write_attempts: 3,
            write_backoff: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineStats {
    pub ticks: AtomicU64,
    pub claims: AtomicU64,
    pub executions: AtomicU64,
    pub skipped: AtomicU64,
    pub failures: AtomicU64,
}

/// What happened to the orders one tick claimed
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub executed: Vec<OrderExecutedEvent>,
    /// Terminal, edited out of range, or deleted before settlement
    pub skipped: usize,
    pub failed: usize,
}

enum Settlement {
    Executed(OrderExecutedEvent),
    Skipped,
    Failed,
}

pub struct MatchingEngine {
    store: Arc<dyn RecordStore>,
    ledger: Arc<FundsLedger>,
    book: Arc<PendingBook>,
    config: MatchingConfig,
    stats: EngineStats,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<FundsLedger>,
        book: Arc<PendingBook>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            book,
            config,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn book(&self) -> &Arc<PendingBook> {
        &self.book
    }

    /// Load every pending order from the store into the book.
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        let pending = self.store.find_orders(&OrderFilter::pending()).await?;
        for order in &pending {
            self.book.insert(order);
        }
        info!(orders = pending.len(), symbols = self.book.symbols().len(), "Pending book hydrated");
        Ok(pending.len())
    }

    /// Settle every pending order `tick` triggers.
    pub async fn on_tick(&self, tick: &Tick) -> TickOutcome {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let claims = self.book.claim_triggered(&tick.symbol, tick.price);
        if claims.is_empty() {
            return TickOutcome::default();
        }
        self.stats
            .claims
            .fetch_add(claims.len() as u64, Ordering::Relaxed);

        let results = join_all(claims.into_iter().map(|claim| self.settle(claim, tick.price))).await;

        let mut outcome = TickOutcome::default();
        for result in results {
            match result {
                Settlement::Executed(event) => outcome.executed.push(event),
                Settlement::Skipped => outcome.skipped += 1,
                Settlement::Failed => outcome.failed += 1,
            }
        }
        self.stats
            .executions
            .fetch_add(outcome.executed.len() as u64, Ordering::Relaxed);
        self.stats
            .skipped
            .fetch_add(outcome.skipped as u64, Ordering::Relaxed);
        self.stats
            .failures
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);
        outcome
    }

    async fn settle(&self, claim: Claim, market_price: Price) -> Settlement {
        let guard = self.ledger.lock_user(claim.user_id).await;

        let order = match self.store.load_order(claim.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                self.book.remove(&claim.symbol, claim.order_id);
                return Settlement::Skipped;
            }
            Err(err) => {
                warn!(order_id = %claim.order_id, error = %err, "Failed to load claimed order");
                self.book.release(&claim.symbol, claim.order_id);
                return Settlement::Failed;
            }
        };

        if !order.is_pending() {
            self.book.remove(&claim.symbol, claim.order_id);
            return Settlement::Skipped;
        }
        if !triggers(order.side, order.price, market_price) {
            debug!(order_id = %order.order_id, "Order no longer triggered after edit");
            self.book.release(&claim.symbol, claim.order_id);
            return Settlement::Skipped;
        }

        if let Err(err) = self
            .ledger
            .apply(&guard, LedgerAction::Execute, &order, None)
            .await
        {
            warn!(order_id = %order.order_id, error = %err, "Settlement failed, order stays pending");
            self.book.release(&claim.symbol, claim.order_id);
            return Settlement::Failed;
        }

        let price = order.price;
        let at = Utc::now();
        let mut executed = order.clone();
        executed.mark_executed(price, at);
        if let Err(err) = self.record_executed(&executed).await {
            return self.reverse_settlement(&guard, &claim, &order, err).await;
        }
        self.book.remove(&claim.symbol, claim.order_id);

        if let Err(err) = apply_fill(self.store.as_ref(), &executed, price, at).await {
            error!(
                order_id = %executed.order_id,
                user_id = %executed.user_id,
                error = %err,
                "Failed to update holding after execution"
            );
        }

        info!(
            order_id = %executed.order_id,
            user_id = %executed.user_id,
            symbol = %executed.symbol,
            side = ?executed.side,
            quantity = executed.quantity,
            price = %price,
            trigger_price = %market_price,
            "Order executed"
        );

        Settlement::Executed(OrderExecutedEvent {
            order_id: executed.order_id,
            user_id: executed.user_id,
            symbol: executed.symbol,
            side: executed.side,
            product: executed.product,
            quantity: executed.quantity,
            price,
            trigger_price: market_price,
            executed_at: at,
        })
    }

    /// Write the executed order, retrying with doubling backoff.
    async fn record_executed(&self, executed: &Order) -> Result<(), StoreError> {
        let attempts = self.config.write_attempts.max(1);
        let mut backoff = self.config.write_backoff;
        let mut attempt = 1;
        loop {
            match self.store.update_order(executed).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    warn!(
                        order_id = %executed.order_id,
                        attempt,
                        error = %err,
                        "Executed order write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    /// Undo the ledger settlement of an order whose executed record could
    /// not be written, so it is pending in both the store and the ledger.
    async fn reverse_settlement(
        &self,
        guard: &UserGuard,
        claim: &Claim,
        order: &Order,
        cause: StoreError,
    ) -> Settlement {
        match self
            .ledger
            .apply(guard, LedgerAction::ExecuteRevert, order, None)
            .await
        {
            Ok(_) => {
                warn!(
                    order_id = %order.order_id,
                    error = %cause,
                    "Executed order write failed, settlement reversed"
                );
                self.book.release(&claim.symbol, claim.order_id);
            }
            Err(err) => {
                error!(
                    order_id = %order.order_id,
                    user_id = %order.user_id,
                    error = %cause,
                    revert_error = %err,
                    "Order settled in ledger but not marked executed"
                );
                self.book.mark_settled(&claim.symbol, claim.order_id);
            }
        }
        Settlement::Failed
    }

    /// Drain `ticks` until the sender side closes, running up to
    /// `max_concurrent_ticks` ticks at once.
    pub async fn run(self: Arc<Self>, mut ticks: mpsc::Receiver<Tick>) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_ticks.max(1)));
        info!(max_concurrent_ticks = self.config.max_concurrent_ticks, "Matching engine started");

        while let Some(tick) = ticks.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let engine = self.clone();
            tokio::spawn(async move {
                let outcome = engine.on_tick(&tick).await;
                if outcome.failed > 0 {
                    warn!(symbol = %tick.symbol, failed = outcome.failed, "Tick had settlement failures");
                }
                drop(permit);
            });
        }

        info!("Matching engine stopped");
    }
}

/// Create the bounded tick queue feeding [`MatchingEngine::run`].
pub fn tick_queue(config: &MatchingConfig) -> (mpsc::Sender<Tick>, mpsc::Receiver<Tick>) {
    mpsc::channel(config.queue_capacity.max(1))
}

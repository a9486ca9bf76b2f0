//! Lifecycle jobs
//!
//! Each job sweeps a batch of records. A failure on one record is logged
//! and counted and the sweep moves on; nothing one record does can abort
//! the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger::{FundsLedger, LedgerAction, LedgerError};
use market_data::Broadcaster;
use matching_engine::{DeskError, OrderDesk};
use persistence::{OrderFilter, RecordStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use types::numeric::Price;
use types::order::{Order, Product, Side};
use types::position::Position;
use types::symbol::Symbol;

use crate::quote::QuoteSource;

/// Latest streamed price for a symbol, if any.
pub trait LivePrices: Send + Sync {
    fn live_price(&self, symbol: &Symbol) -> Option<Price>;
}

impl LivePrices for Broadcaster {
    fn live_price(&self, symbol: &Symbol) -> Option<Price> {
        self.last_price(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SquareOff,
    CancelPending,
    Cleanup,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobKind::SquareOff => "square_off",
            JobKind::CancelPending => "cancel_pending",
            JobKind::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Counters for one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub job: JobKind,
    pub examined: usize,
    pub succeeded: usize,
    /// Records that no longer needed the action when reached
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn new(job: JobKind) -> Self {
        Self {
            job,
            examined: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn log(&self) {
        info!(
            job = %self.job,
            examined = self.examined,
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            "Sweep finished"
        );
    }
}

#[derive(Error, Debug)]
enum CloseError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

enum CloseOutcome {
    Closed,
    Gone,
}

pub struct LifecycleJobs {
    store: Arc<dyn RecordStore>,
    ledger: Arc<FundsLedger>,
    desk: Arc<OrderDesk>,
    live: Option<Arc<dyn LivePrices>>,
    quotes: Option<Arc<dyn QuoteSource>>,
}

impl LifecycleJobs {
    pub fn new(store: Arc<dyn RecordStore>, ledger: Arc<FundsLedger>, desk: Arc<OrderDesk>) -> Self {
        Self {
            store,
            ledger,
            desk,
            live: None,
            quotes: None,
        }
    }

    pub fn with_live_prices(mut self, live: Arc<dyn LivePrices>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_quotes(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub async fn run(&self, job: JobKind, now: DateTime<Utc>, retention: chrono::Duration) -> SweepReport {
        match job {
            JobKind::SquareOff => self.square_off().await,
            JobKind::CancelPending => self.cancel_stale_orders(now).await,
            JobKind::Cleanup => self.cleanup_history(now - retention).await,
        }
    }

    /// Close every open intraday position with a synthesized SELL.
    pub async fn square_off(&self) -> SweepReport {
        let mut report = SweepReport::new(JobKind::SquareOff);
        let positions = match self.store.find_positions(Product::Intraday).await {
            Ok(positions) => positions,
            Err(err) => {
                error!(error = %err, "Square-off could not list positions");
                report.failed += 1;
                return report;
            }
        };

        for position in positions {
            report.examined += 1;
            match self.close_position(&position).await {
                Ok(CloseOutcome::Closed) => report.succeeded += 1,
                Ok(CloseOutcome::Gone) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        user_id = %position.user_id,
                        symbol = %position.symbol,
                        error = %err,
                        "Square-off failed for position"
                    );
                }
            }
        }

        report.log();
        report
    }

    /// Live tick, else the quote API, else the position's average cost.
    pub async fn exit_price(&self, symbol: &Symbol, average_price: Price) -> Price {
        if let Some(price) = self.live.as_ref().and_then(|live| live.live_price(symbol)) {
            return price;
        }
        if let Some(quotes) = &self.quotes {
            match quotes.quote(symbol).await {
                Ok(quote) => {
                    if let Some(price) = quote.best() {
                        return price;
                    }
                }
                Err(err) => debug!(symbol = %symbol, error = %err, "Quote lookup failed"),
            }
        }
        average_price
    }

    async fn close_position(&self, snapshot: &Position) -> Result<CloseOutcome, CloseError> {
        let price = self.exit_price(&snapshot.symbol, snapshot.average_price).await;

        let guard = self.ledger.lock_user(snapshot.user_id).await;
        // Re-read under the lock; executions may have moved it since the listing
        let Some(position) = self
            .store
            .load_position(snapshot.user_id, &snapshot.symbol, Product::Intraday)
            .await?
        else {
            return Ok(CloseOutcome::Gone);
        };
        if position.quantity == 0 {
            self.store
                .delete_position(position.user_id, &position.symbol, Product::Intraday)
                .await?;
            return Ok(CloseOutcome::Gone);
        }

        let now = Utc::now();
        let mut exit = Order::new(
            position.user_id,
            position.symbol.clone(),
            Side::SELL,
            Product::Intraday,
            position.quantity,
            price,
            now,
        )
        .with_average_price(position.average_price);

        let entry = self
            .ledger
            .apply(&guard, LedgerAction::Execute, &exit, None)
            .await?;
        self.store
            .delete_position(position.user_id, &position.symbol, Product::Intraday)
            .await?;

        exit.mark_executed(price, now);
        if let Err(err) = self.store.insert_order(&exit).await {
            error!(order_id = %exit.order_id, error = %err, "Failed to record square-off order");
        }

        info!(
            user_id = %position.user_id,
            symbol = %position.symbol,
            quantity = position.quantity,
            price = %price,
            realised_pnl = %entry.record.realised_pnl,
            "Position squared off"
        );
        Ok(CloseOutcome::Closed)
    }

    /// Cancel every order still pending that was placed before `cutoff`.
    pub async fn cancel_stale_orders(&self, cutoff: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(JobKind::CancelPending);
        let orders = match self
            .store
            .find_orders(&OrderFilter::pending().placed_before(cutoff))
            .await
        {
            Ok(orders) => orders,
            Err(err) => {
                error!(error = %err, "Stale-order sweep could not list orders");
                report.failed += 1;
                return report;
            }
        };

        for order in orders {
            report.examined += 1;
            match self.desk.expire(&order).await {
                Ok(_) => report.succeeded += 1,
                Err(DeskError::AlreadyTerminal { .. } | DeskError::OrderNotFound(_)) => {
                    report.skipped += 1
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(order_id = %order.order_id, error = %err, "Failed to cancel stale order");
                }
            }
        }

        report.log();
        report
    }

    /// Delete executed orders older than `cutoff`.
    pub async fn cleanup_history(&self, cutoff: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(JobKind::Cleanup);
        let orders = match self
            .store
            .find_orders(&OrderFilter::executed_before(cutoff))
            .await
        {
            Ok(orders) => orders,
            Err(err) => {
                error!(error = %err, "Cleanup could not list orders");
                report.failed += 1;
                return report;
            }
        };

        for order in orders {
            report.examined += 1;
            match self.store.delete_order(order.order_id).await {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(order_id = %order.order_id, error = %err, "Failed to delete executed order");
                }
            }
        }

        report.log();
        report
    }
}

//! Funds arithmetic
//!
//! Pure, deterministic mutations of a [`FundsRecord`] for each lifecycle
//! action. Callers are responsible for recomputing `available_margin` and
//! persisting; see [`crate::ledger::FundsLedger::apply`].
//!
//! usedMargin and exposure always move together in every function here.

use rust_decimal::Decimal;
use types::funds::FundsRecord;

/// Commit cash to a BUY order (placement or edit-apply).
///
/// `available_cash -= amount; used_margin += amount; exposure += amount`
pub fn reserve(record: &mut FundsRecord, amount: Decimal) {
    record.available_cash -= amount;
    record.used_margin += amount;
    record.exposure += amount;
}

/// Exact inverse of [`reserve`] (cancel or edit-revert).
pub fn release(record: &mut FundsRecord, amount: Decimal) {
    record.available_cash += amount;
    record.used_margin -= amount;
    record.exposure -= amount;
}

/// BUY execution. Cash was already committed at placement, only the margin
/// footprint is released.
pub fn settle_buy(record: &mut FundsRecord, amount: Decimal) {
    record.used_margin -= amount;
    record.exposure -= amount;
}

/// SELL execution.
///
/// `available_cash += proceeds`, the `basis` is released from margin and
/// exposure, and `proceeds - basis` is realised.
pub fn settle_sell(record: &mut FundsRecord, proceeds: Decimal, basis: Decimal) {
    record.available_cash += proceeds;
    record.used_margin -= basis;
    record.exposure -= basis;
    record.realised_pnl += proceeds - basis;
}

/// Exact inverse of [`settle_buy`].
pub fn unsettle_buy(record: &mut FundsRecord, amount: Decimal) {
    record.used_margin += amount;
    record.exposure += amount;
}

/// Exact inverse of [`settle_sell`].
pub fn unsettle_sell(record: &mut FundsRecord, proceeds: Decimal, basis: Decimal) {
    record.available_cash -= proceeds;
    record.used_margin += basis;
    record.exposure += basis;
    record.realised_pnl -= proceeds - basis;
}

// ── Tests ────────────────────────────────────────────────────────────────

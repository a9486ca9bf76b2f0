//! Per-user funds record
//!
//! Invariant: available_margin = available_cash + collateral_liquid + collateral_equity
//!
//! `available_margin` is derived. It is recomputed by [`FundsRecord::recompute`]
//! after every mutation and never set independently.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsRecord {
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub available_cash: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub used_margin: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub exposure: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub collateral_liquid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub collateral_equity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub realised_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub available_margin: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl FundsRecord {
    /// Create a funded record with no collateral and no open margin
    pub fn new(user_id: UserId, available_cash: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self::with_collateral(user_id, available_cash, Decimal::ZERO, Decimal::ZERO, timestamp)
    }

    pub fn with_collateral(
        user_id: UserId,
        available_cash: Decimal,
        collateral_liquid: Decimal,
        collateral_equity: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            user_id,
            available_cash,
            used_margin: Decimal::ZERO,
            exposure: Decimal::ZERO,
            collateral_liquid,
            collateral_equity,
            realised_pnl: Decimal::ZERO,
            available_margin: Decimal::ZERO,
            updated_at: timestamp,
        };
        record.recompute(timestamp);
        record
    }

    /// Re-derive `available_margin` and stamp the record.
    pub fn recompute(&mut self, timestamp: DateTime<Utc>) {
        self.available_margin =
            self.available_cash + self.collateral_liquid + self.collateral_equity;
        self.updated_at = timestamp;
    }

    /// Check margin invariant
    pub fn check_invariant(&self) -> bool {
        self.available_margin
            == self.available_cash + self.collateral_liquid + self.collateral_equity
    }
}

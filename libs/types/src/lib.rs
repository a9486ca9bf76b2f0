//! Types library for the brokerage relay and settlement engine
//!
//! Shared definitions used by the market-data relay, the funds ledger, the
//! matching engine and the scheduled lifecycle jobs.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, UserId, SessionId)
//! - `symbol`: Case-normalized instrument symbols
//! - `numeric`: Price/quantity helpers
//! - `order`: Order lifecycle types
//! - `position`: Holdings (Delivery) and positions (Intraday)
//! - `funds`: Per-user funds ledger record
//! - `tick`: Market price updates
//! - `errors`: Validation error taxonomy

pub mod ids;
pub mod symbol;
pub mod numeric;
pub mod order;
pub mod position;
pub mod funds;
pub mod tick;
pub mod errors;


//! Matching Engine Service
//!
//! Trigger-based settlement of resting limit orders against live ticks,
//! plus the order desk that places, edits and cancels them.
//!
//! **Key Invariants:**
//! - A pending order executes at most once, whatever the tick rate
//! - Settlement is at the order's limit price
//! - Every order, ledger and book transition for a user runs under that
//!   user's lock
//! - The pending book only ever holds orders the store reports pending

pub mod book;
pub mod desk;
pub mod engine;
pub mod events;
pub mod matching;

pub use book::{Claim, ClaimState, PendingBook, PendingEntry};
pub use desk::{DeskError, EditOrder, OrderDesk, PlaceOrder};
pub use engine::{tick_queue, EngineStats, MatchingConfig, MatchingEngine, TickOutcome};
pub use events::{CancelSource, OrderCancelledEvent, OrderExecutedEvent};

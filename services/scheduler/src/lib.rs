//! Scheduled lifecycle jobs
//!
//! End-of-day maintenance run on a wall-clock schedule:
//! 1. Auto square-off of open intraday positions
//! 2. Cancellation of orders still pending after the trading window
//! 3. Deletion of executed orders past the retention period

pub mod jobs;
pub mod quote;
pub mod schedule;

pub use jobs::{JobKind, LifecycleJobs, LivePrices, SweepReport};
pub use quote::{HttpQuoteClient, Quote, QuoteError, QuoteSource};
pub use schedule::{next_run, ScheduleConfig, ScheduleError, Scheduler};

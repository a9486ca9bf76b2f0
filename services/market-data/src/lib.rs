//! Market Data Relay
//!
//! Multiplexes one upstream tick feed to many downstream sessions:
//! - Reference-counted subscriptions: one upstream subscription per symbol
//!   while any session wants it
//! - Per-session fan-out of only the subscribed symbols, with bounded
//!   outboxes
//! - Resilient upstream connection with exponential backoff and
//!   subscription replay
//!
//! # Architecture
//!
//! ```text
//!   Upstream provider
//!        │  ▲
//!   ticks│  │subscribe / unsubscribe
//!    ┌───▼──┴───┐
//!    │TickSource│◄──── UpstreamHandle ◄──┐
//!    └───┬──────┘                        │ 0→1 / 1→0
//!        │                        ┌──────┴──────┐
//!   ┌────┴─────────┐              │  Registry   │
//!   │              │              └──────▲──────┘
//! ┌─▼──────────┐ ┌─▼──────────┐          │ interest
//! │Broadcaster │ │Match queue │   ┌──────┴──────┐
//! └─┬──────────┘ └────────────┘   │  Sessions   │
//!   │ per-session outboxes        └─────────────┘
//!   └──────────────────────────────────►
//! ```

pub mod events;
pub mod fanout;
pub mod feed;
pub mod registry;
pub mod session;

pub use events::{ControlAction, ControlFrame, DownstreamFrame, UpstreamFrame};
pub use fanout::{Broadcaster, DropPolicy, FanoutConfig, FanoutStats, TickSink};
pub use feed::{FeedConfig, FeedError, FeedStatus, TickSource, UpstreamCommand, UpstreamHandle};
pub use registry::{SubscriptionRegistry, UpstreamControl};
pub use session::Session;

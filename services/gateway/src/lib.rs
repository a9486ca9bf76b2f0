//! Gateway
//!
//! HTTP and WebSocket surface over the order desk, the funds ledger and
//! the market data relay, plus the wiring that starts the background
//! tasks.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;

pub use crate::config::{ConfigError, GatewayConfig};
pub use error::AppError;
pub use router::create_router;
pub use state::{AppState, Background};

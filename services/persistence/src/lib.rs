//! Record Store boundary
//!
//! The relay and settlement engine never talk to a database directly. They
//! issue read-one, update-one, delete-one and find-many operations against
//! the [`RecordStore`] trait, which a deployment backs with its document
//! database of choice. Each document is treated as strongly consistent.
//!
//! Collections:
//! - orders, keyed by `OrderId`
//! - funds, one record per `UserId`
//! - holdings (Delivery) and positions (Intraday), keyed by
//!   `(UserId, Symbol)`
//!
//! [`MemoryStore`] is the in-process backend used by the gateway binary and
//! by tests.

pub mod filter;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use types::funds::FundsRecord;
use types::ids::{OrderId, UserId};
use types::order::{Order, Product};
use types::position::Position;
use types::symbol::Symbol;

pub use filter::OrderFilter;
pub use memory::MemoryStore;

/// Store-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    // ── Orders ──

    async fn load_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Fails with `Duplicate` if the id is taken.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Replace an existing order. Fails with `NotFound` if absent.
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete_order(&self, order_id: OrderId) -> Result<bool, StoreError>;

    async fn find_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    // ── Funds ──

    async fn load_funds(&self, user_id: UserId) -> Result<Option<FundsRecord>, StoreError>;

    /// Upsert the user's funds record.
    async fn save_funds(&self, record: &FundsRecord) -> Result<(), StoreError>;

    // ── Holdings / positions ──

    async fn load_position(
        &self,
        user_id: UserId,
        symbol: &Symbol,
        product: Product,
    ) -> Result<Option<Position>, StoreError>;

    /// Upsert; `position.product` selects holdings or positions.
    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;

    async fn delete_position(
        &self,
        user_id: UserId,
        symbol: &Symbol,
        product: Product,
    ) -> Result<bool, StoreError>;

    /// All records of one product across users.
    async fn find_positions(&self, product: Product) -> Result<Vec<Position>, StoreError>;
}

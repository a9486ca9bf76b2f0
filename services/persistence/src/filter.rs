//! Find-many filters for the orders collection

use chrono::{DateTime, Utc};
use types::ids::UserId;
use types::order::{Order, OrderStatus};
use types::symbol::Symbol;

/// Conjunction of optional predicates. An empty filter matches every order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub symbol: Option<Symbol>,
    pub status: Option<OrderStatus>,
    /// Strictly earlier placement
    pub placed_before: Option<DateTime<Utc>>,
    /// Strictly earlier execution; orders without an execution time never match
    pub executed_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Pending orders (not executed, not cancelled)
    pub fn pending() -> Self {
        Self {
            status: Some(OrderStatus::Pending),
            ..Self::default()
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn for_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn placed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.placed_before = Some(cutoff);
        self
    }

    /// Executed orders whose execution time precedes `cutoff`
    pub fn executed_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Executed),
            executed_before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.user_id.is_some_and(|user| user != order.user_id) {
            return false;
        }
        if self.symbol.as_ref().is_some_and(|symbol| *symbol != order.symbol) {
            return false;
        }
        if self.status.is_some_and(|status| status != order.status()) {
            return false;
        }
        if self.placed_before.is_some_and(|cutoff| order.placed_at >= cutoff) {
            return false;
        }
        if let Some(cutoff) = self.executed_before {
            match order.executed_at {
                Some(at) if at < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

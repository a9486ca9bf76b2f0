//! Subscription registry
//!
//! Reference-counted interest per symbol. The upstream feed is subscribed
//! to a symbol exactly while at least one session holds it:
//! - the 0→1 transition sends one upstream subscribe
//! - the 1→0 transition sends one upstream unsubscribe
//!
//! Every mutation for a symbol runs inside that symbol's map entry, so
//! concurrent sessions cannot interleave a transition. The upstream call
//! made while the entry is held is a non-blocking enqueue.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;
use types::ids::SessionId;
use types::symbol::Symbol;

/// Upstream subscription control. Implementations must not block.
pub trait UpstreamControl: Send + Sync {
    fn subscribe(&self, symbol: &Symbol);
    fn unsubscribe(&self, symbol: &Symbol);
}

pub struct SubscriptionRegistry {
    interest: DashMap<Symbol, BTreeSet<SessionId>>,
    upstream: Arc<dyn UpstreamControl>,
}

impl SubscriptionRegistry {
    pub fn new(upstream: Arc<dyn UpstreamControl>) -> Self {
        Self {
            interest: DashMap::new(),
            upstream,
        }
    }

    /// Record `session`'s interest in `symbol`.
    ///
    /// Returns `true` when this was the first interest and the upstream
    /// subscription was issued. Re-adding an existing interest is a no-op.
    pub fn add_interest(&self, session: SessionId, symbol: &Symbol) -> bool {
        match self.interest.entry(symbol.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().insert(session);
                false
            }
            Entry::Vacant(entry) => {
                self.upstream.subscribe(symbol);
                entry.insert(BTreeSet::from([session]));
                info!(symbol = %symbol, session = %session, "Upstream subscribe");
                true
            }
        }
    }

    /// Drop `session`'s interest in `symbol`.
    ///
    /// Returns `true` when the last interest went away and the upstream
    /// subscription was released. Removing an unknown interest is a no-op.
    pub fn remove_interest(&self, session: SessionId, symbol: &Symbol) -> bool {
        let Entry::Occupied(mut entry) = self.interest.entry(symbol.clone()) else {
            return false;
        };
        if !entry.get_mut().remove(&session) || !entry.get().is_empty() {
            return false;
        }
        self.upstream.unsubscribe(symbol);
        entry.remove();
        info!(symbol = %symbol, session = %session, "Upstream unsubscribe");
        true
    }

    /// Remove every interest a terminating session held.
    pub fn release_session<'a>(
        &self,
        session: SessionId,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> usize {
        symbols
            .into_iter()
            .filter(|symbol| self.remove_interest(session, symbol))
            .count()
    }

    /// Sessions currently interested in `symbol`.
    pub fn sessions_for(&self, symbol: &Symbol) -> Vec<SessionId> {
        self.interest
            .get(symbol)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn interest_count(&self, symbol: &Symbol) -> usize {
        self.interest.get(symbol).map_or(0, |sessions| sessions.len())
    }

    /// Every symbol with at least one interested session. Replayed upstream
    /// after a reconnect.
    pub fn active_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .interest
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        symbols.sort();
        symbols
    }
}

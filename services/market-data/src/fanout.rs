//! Fan-out of ticks to downstream sessions
//!
//! Each session owns a bounded outbox. A batch of upstream ticks becomes at
//! most one `trade` frame per session, holding only the symbols that
//! session is subscribed to, in upstream order. A full outbox is handled
//! by the configured [`DropPolicy`]; a slow session never stalls the feed
//! or its peers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use types::ids::SessionId;
use types::numeric::Price;
use types::symbol::Symbol;
use types::tick::Tick;

use crate::events::DownstreamFrame;
use crate::registry::SubscriptionRegistry;

/// What to do when a session's outbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Drop the frame that did not fit, keep the session.
    DropNewest,
    /// Close the lagging session.
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Frames buffered per session
    pub outbox_capacity: usize,
    pub drop_policy: DropPolicy,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            drop_policy: DropPolicy::DropNewest,
        }
    }
}

#[derive(Debug, Default)]
pub struct FanoutStats {
    pub ticks_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub sessions_disconnected: AtomicU64,
}

/// Consumer of decoded upstream ticks.
pub trait TickSink: Send + Sync {
    fn deliver(&self, ticks: &[Tick]);
}

/// The matching engine's bounded tick queue. A full queue drops the tick;
/// the next tick for the symbol re-evaluates the same orders.
impl TickSink for mpsc::Sender<Tick> {
    fn deliver(&self, ticks: &[Tick]) {
        for tick in ticks {
            match self.try_send(tick.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(tick)) => {
                    warn!(symbol = %tick.symbol, "Matching queue full, tick dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Matching queue closed");
                    return;
                }
            }
        }
    }
}

pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    outboxes: DashMap<SessionId, mpsc::Sender<String>>,
    last_prices: DashMap<Symbol, Price>,
    next_session: AtomicU64,
    config: FanoutConfig,
    stats: FanoutStats,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>, config: FanoutConfig) -> Self {
        Self {
            registry,
            outboxes: DashMap::new(),
            last_prices: DashMap::new(),
            next_session: AtomicU64::new(1),
            config,
            stats: FanoutStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &FanoutStats {
        &self.stats
    }

    /// Allocate a session id and its outbox. The receiver yields serialized
    /// frames; it closes when the session is detached or disconnected.
    pub fn attach(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.outbox_capacity.max(1));
        self.outboxes.insert(id, tx);
        debug!(session = %id, "Session attached");
        (id, rx)
    }

    pub fn detach(&self, session: SessionId) {
        if self.outboxes.remove(&session).is_some() {
            debug!(session = %session, "Session detached");
        }
    }

    pub fn session_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Most recent upstream price for `symbol`.
    pub fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.last_prices.get(symbol).map(|price| *price)
    }

    fn push(&self, session: SessionId, frame: String) {
        let Some(outbox) = self.outboxes.get(&session).map(|tx| tx.clone()) else {
            return;
        };
        match outbox.try_send(frame) {
            Ok(()) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => match self.config.drop_policy {
                DropPolicy::DropNewest => {
                    self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(session = %session, "Outbox full, frame dropped");
                }
                DropPolicy::Disconnect => {
                    self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .sessions_disconnected
                        .fetch_add(1, Ordering::Relaxed);
                    self.outboxes.remove(&session);
                    warn!(session = %session, "Outbox full, disconnecting lagging session");
                }
            },
            Err(TrySendError::Closed(_)) => {
                self.outboxes.remove(&session);
            }
        }
    }
}

impl TickSink for Broadcaster {
    fn deliver(&self, ticks: &[Tick]) {
        let mut per_session: BTreeMap<SessionId, Vec<Tick>> = BTreeMap::new();
        for tick in ticks {
            self.stats.ticks_received.fetch_add(1, Ordering::Relaxed);
            self.last_prices.insert(tick.symbol.clone(), tick.price);
            for session in self.registry.sessions_for(&tick.symbol) {
                per_session.entry(session).or_default().push(tick.clone());
            }
        }

        for (session, data) in per_session {
            self.push(session, DownstreamFrame::Trade { data }.to_json());
        }
    }
}

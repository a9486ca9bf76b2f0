//! Downstream session state
//!
//! Tracks the symbols one client holds. Dropping the session, for any
//! reason, releases all of its interest and detaches its outbox.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use types::ids::SessionId;
use types::symbol::Symbol;

use crate::events::{ControlAction, ControlFrame};
use crate::fanout::Broadcaster;

pub struct Session {
    id: SessionId,
    symbols: BTreeSet<Symbol>,
    broadcaster: Arc<Broadcaster>,
}

impl Session {
    /// Attach a new session. Frames for the client arrive on the receiver.
    pub fn open(broadcaster: Arc<Broadcaster>) -> (Self, mpsc::Receiver<String>) {
        let (id, outbox) = broadcaster.attach();
        info!(session = %id, "Session opened");
        let session = Self {
            id,
            symbols: BTreeSet::new(),
            broadcaster,
        };
        (session, outbox)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Apply one client text message. Malformed input is ignored and
    /// `None` returned; the session carries on.
    pub fn handle_text(&mut self, text: &str) -> Option<ControlFrame> {
        let Some(frame) = ControlFrame::parse(text) else {
            debug!(session = %self.id, "Ignoring malformed control message");
            return None;
        };

        let registry = self.broadcaster.registry();
        match frame.action {
            ControlAction::Subscribe => {
                if self.symbols.insert(frame.symbol.clone()) {
                    registry.add_interest(self.id, &frame.symbol);
                }
            }
            ControlAction::Unsubscribe => {
                if self.symbols.remove(&frame.symbol) {
                    registry.remove_interest(self.id, &frame.symbol);
                }
            }
        }
        Some(frame)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let released = self
            .broadcaster
            .registry()
            .release_session(self.id, &self.symbols);
        self.broadcaster.detach(self.id);
        info!(
            session = %self.id,
            symbols = self.symbols.len(),
            upstream_released = released,
            "Session closed"
        );
    }
}

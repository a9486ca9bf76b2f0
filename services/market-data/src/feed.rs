//! Upstream tick source
//!
//! One long-lived WebSocket connection to the market data provider.
//! Subscription changes from the registry are queued on an unbounded
//! channel and written by the connection task. After every (re)connect the
//! registry's active symbols are replayed so upstream state matches
//! downstream interest.
//!
//! Connection failures back off exponentially from `reconnect_base` up to
//! `reconnect_max`. After `max_attempts` consecutive failures the feed
//! gives up and reports [`FeedStatus::Degraded`]; sessions stay connected
//! but no new ticks arrive.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use types::symbol::Symbol;

use crate::events::{ControlFrame, UpstreamFrame};
use crate::fanout::TickSink;
use crate::registry::{SubscriptionRegistry, UpstreamControl};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Upstream closed the connection")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Degraded,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Appended as `?token=` when non-empty
    pub token: String,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub max_attempts: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.finnhub.io".to_string(),
            token: String::new(),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl FeedConfig {
    pub fn endpoint(&self) -> String {
        if self.token.is_empty() {
            self.url.clone()
        } else {
            format!("{}?token={}", self.url, self.token)
        }
    }
}

/// Subscription command queued for the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

impl UpstreamCommand {
    fn to_frame(&self) -> ControlFrame {
        match self {
            UpstreamCommand::Subscribe(symbol) => ControlFrame::subscribe(symbol.clone()),
            UpstreamCommand::Unsubscribe(symbol) => ControlFrame::unsubscribe(symbol.clone()),
        }
    }
}

/// Registry-facing side of the feed. Never blocks.
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    commands: mpsc::UnboundedSender<UpstreamCommand>,
}

impl UpstreamHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UpstreamCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    fn send(&self, command: UpstreamCommand) {
        if self.commands.send(command).is_err() {
            debug!("Upstream feed stopped, command discarded");
        }
    }
}

impl UpstreamControl for UpstreamHandle {
    fn subscribe(&self, symbol: &Symbol) {
        self.send(UpstreamCommand::Subscribe(symbol.clone()));
    }

    fn unsubscribe(&self, symbol: &Symbol) {
        self.send(UpstreamCommand::Unsubscribe(symbol.clone()));
    }
}

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionEnd {
    /// Connection dropped; reconnect
    Lost(FeedError),
    /// Command channel closed; stop
    Shutdown,
}

pub struct TickSource {
    config: FeedConfig,
    registry: Arc<SubscriptionRegistry>,
    sinks: Vec<Arc<dyn TickSink>>,
    status: watch::Sender<FeedStatus>,
}

impl TickSource {
    pub fn new(
        config: FeedConfig,
        registry: Arc<SubscriptionRegistry>,
        sinks: Vec<Arc<dyn TickSink>>,
    ) -> Self {
        let (status, _) = watch::channel(FeedStatus::Connecting);
        Self {
            config,
            registry,
            sinks,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    /// Hand decoded ticks to every sink. Unparseable frames are dropped.
    pub fn on_text(&self, text: &str) {
        match UpstreamFrame::decode(text) {
            Ok(UpstreamFrame::Trade { data }) if !data.is_empty() => {
                for sink in &self.sinks {
                    sink.deliver(&data);
                }
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "Dropping undecodable upstream frame"),
        }
    }

    /// Connect, stream, reconnect. Returns when the command channel closes
    /// or the attempt budget is spent.
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<UpstreamCommand>) {
        let endpoint = self.config.endpoint();
        let mut delay = self.config.reconnect_base;
        let mut failures: u32 = 0;

        loop {
            match connect_async(endpoint.as_str()).await {
                Ok((ws, _response)) => {
                    info!(url = %self.config.url, "Upstream connected");
                    failures = 0;
                    delay = self.config.reconnect_base;
                    self.status.send_replace(FeedStatus::Connected);

                    match self.stream(ws, &mut commands).await {
                        SessionEnd::Shutdown => {
                            info!("Upstream feed shutting down");
                            return;
                        }
                        SessionEnd::Lost(err) => {
                            warn!(error = %err, "Upstream connection lost");
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, attempt = failures + 1, "Upstream connect failed");
                }
            }

            failures += 1;
            if failures > self.config.max_attempts {
                error!(
                    attempts = failures - 1,
                    "Upstream reconnect budget exhausted, relay degraded"
                );
                self.status.send_replace(FeedStatus::Degraded);
                return;
            }

            self.status
                .send_replace(FeedStatus::Reconnecting { attempt: failures });
            info!(delay_ms = delay.as_millis() as u64, attempt = failures, "Reconnecting upstream");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.config.reconnect_max);
        }
    }

    async fn stream(
        &self,
        ws: Upstream,
        commands: &mut mpsc::UnboundedReceiver<UpstreamCommand>,
    ) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        // Queued commands are already reflected in the registry
        while commands.try_recv().is_ok() {}
        for symbol in self.registry.active_symbols() {
            let frame = ControlFrame::subscribe(symbol).to_json();
            if let Err(err) = write.send(Message::Text(frame.into())).await {
                return SessionEnd::Lost(err.into());
            }
        }

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.on_text(text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(err) = write.send(Message::Pong(data)).await {
                            return SessionEnd::Lost(err.into());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost(FeedError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return SessionEnd::Lost(err.into()),
                },
                command = commands.recv() => match command {
                    Some(command) => {
                        let frame = command.to_frame().to_json();
                        if let Err(err) = write.send(Message::Text(frame.into())).await {
                            return SessionEnd::Lost(err.into());
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                },
            }
        }
    }
}

//! Wire frames for the upstream feed and downstream sessions
//!
//! Control frames have the same shape in both directions:
//! `{"type": "subscribe" | "unsubscribe", "symbol": "AAPL"}`.
//! Tick frames carry a batch: `{"type": "trade", "data": [{"s": .., "p": ..}]}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use types::symbol::Symbol;
use types::tick::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlFrame {
    #[serde(rename = "type")]
    pub action: ControlAction,
    pub symbol: Symbol,
}

impl ControlFrame {
    pub fn subscribe(symbol: Symbol) -> Self {
        Self {
            action: ControlAction::Subscribe,
            symbol,
        }
    }

    pub fn unsubscribe(symbol: Symbol) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            symbol,
        }
    }

    /// Lenient parse of a client control message.
    ///
    /// Returns `None` for anything that is not a JSON object with a known
    /// string `type` and a valid string `symbol`. Callers drop such input.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let action = match value.get("type")?.as_str()? {
            "subscribe" => ControlAction::Subscribe,
            "unsubscribe" => ControlAction::Unsubscribe,
            _ => return None,
        };
        let symbol = Symbol::parse(value.get("symbol")?.as_str()?).ok()?;
        Some(Self { action, symbol })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames received from the upstream provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpstreamFrame {
    Trade {
        #[serde(default, deserialize_with = "usable_ticks")]
        data: Vec<Tick>,
    },
    Ping,
    /// Any other discriminator (errors, news, ...) is ignored
    #[serde(other)]
    Other,
}

impl UpstreamFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Decode batch entries one by one, keeping only valid ticks with a
/// positive price. A bad entry never costs the rest of the batch.
fn usable_ticks<'de, D>(deserializer: D) -> Result<Vec<Tick>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<Value>::deserialize(deserializer)?;
    let total = entries.len();
    let ticks: Vec<Tick> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<Tick>(entry).ok())
        .filter(|tick| tick.price > Decimal::ZERO)
        .collect();
    if ticks.len() < total {
        debug!(dropped = total - ticks.len(), "Dropping unusable upstream ticks");
    }
    Ok(ticks)
}

/// Frames sent to downstream sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownstreamFrame {
    Trade { data: Vec<Tick> },
}

impl DownstreamFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

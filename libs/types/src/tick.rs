//! Market price updates

use serde::{Deserialize, Serialize};

use crate::numeric::Price;
use crate::symbol::Symbol;

/// A single (symbol, price) market update.
///
/// Wire shape is `{"s": "AAPL", "p": 189.5}` on both the upstream and the
/// downstream protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tick {
    #[serde(rename = "s")]
    pub symbol: Symbol,
    #[serde(rename = "p", with = "rust_decimal::serde::float")]
    pub price: Price,
}

impl Tick {
    pub fn new(symbol: Symbol, price: Price) -> Self {
        Self { symbol, price }
    }
}

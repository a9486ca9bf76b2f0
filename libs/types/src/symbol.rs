//! Instrument symbols
//!
//! Symbols are matched case-insensitively everywhere in the system. The
//! canonical form is trimmed and uppercased at construction, so two
//! `Symbol`s compare equal iff they name the same instrument.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// Upper bound on symbol length accepted from clients.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Canonical (uppercase) instrument symbol, e.g. `RELIANCE` or `AAPL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate a raw symbol.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if trimmed.len() > MAX_SYMBOL_LEN || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidSymbol(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Get the canonical symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

//! Error types shared across services
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Input validation errors raised while building domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidSymbol("A B".to_string());
        assert_eq!(err.to_string(), "Invalid symbol: A B");
        assert_eq!(ValidationError::EmptySymbol.to_string(), "Symbol must not be empty");
    }
}

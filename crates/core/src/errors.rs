//! Core error types.
//!
//! Resolution itself never fails: unusable input, provider outages and
//! unresolvable positions all end up as counts and drop reasons. What is
//! left here are configuration problems found at startup and failures of
//! the holdings store the caller plugs in.

use radar_market_data::ConfigError;
use thiserror::Error;

/// Type alias for Result using the core error type.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Failed to load reference catalog from {path}: {message}")]
    Catalog { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Holdings store operation failed: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: CoreError = ConfigError::Missing("TIN_TOKEN".to_string()).into();
        assert!(matches!(err, CoreError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Missing required setting: TIN_TOKEN"
        );
    }
}

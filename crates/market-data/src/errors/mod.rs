//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for provider and aggregation operations
//! - [`RetryClass`]: Classification for circuit breaker bookkeeping

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur while talking to a market data provider.
///
/// None of these escape the aggregator: every provider failure is reduced to
/// "no data from that provider". The [`retry_class`](Self::retry_class) only
/// decides whether the failure counts against the provider's circuit.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider does not know the requested security.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider does not implement the requested operation.
    #[error("Operation not supported by {provider}: {operation}")]
    NotSupported {
        provider: String,
        operation: String,
    },

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred (non-2xx, unparseable body).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The circuit breaker is open for this provider.
    #[error("Circuit open: {provider}")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
    },

    /// The provider is disabled or misconfigured (e.g. missing token).
    #[error("Provider unavailable: {provider} - {message}")]
    Unavailable { provider: String, message: String },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use radar_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "TBANK".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = MarketDataError::SymbolNotFound("XXXX".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // The security is simply not there
            Self::SymbolNotFound(_) | Self::NotSupported { .. } => RetryClass::Never,

            // Transient upstream trouble - penalize the provider
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network(_) => {
                RetryClass::FailoverWithPenalty
            }

            Self::ProviderError { .. } | Self::Unavailable { .. } => RetryClass::NextProvider,

            Self::CircuitOpen { .. } => RetryClass::CircuitOpen,
        }
    }

    /// Builds a [`MarketDataError::ProviderError`] for `provider`.
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

//! HTTP and JSON plumbing shared by the provider adapters.

use std::str::FromStr;

use chrono::NaiveDate;
use num_traits::FromPrimitive;
use reqwest::{Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::MarketDataError;

/// Maps a transport failure, keeping timeouts distinguishable.
pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        MarketDataError::provider(provider, error.to_string())
    }
}

/// Checks the status line and returns the body text.
pub(crate) async fn read_body(provider: &str, response: Response) -> Result<String, MarketDataError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MarketDataError::RateLimited {
            provider: provider.to_string(),
        });
    }

    if !status.is_success() {
        return Err(MarketDataError::provider(
            provider,
            format!("HTTP error: {}", status),
        ));
    }

    response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))
}

pub(crate) fn parse<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| {
        MarketDataError::provider(provider, format!("Failed to parse response: {}", e))
    })
}

/// Reads a number that may arrive as a JSON number or a numeric string.
pub(crate) fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Decimal::from_str(s).ok()
            }
        }
        _ => None,
    }
}

pub(crate) fn string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads `YYYY-MM-DD` or an RFC 3339 timestamp. `0000-00-00` is treated as absent.
pub(crate) fn date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    let day = text.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

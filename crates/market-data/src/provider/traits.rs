//! Market data provider trait definitions.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{BondCalendar, MarketSnapshot, ResolvedSecurity};

/// Trait for upstream market data sources.
///
/// Each implementation normalizes its native responses into
/// [`MarketSnapshot`]. `Ok(None)` means the provider answered but does not
/// know the security; `Err` means the provider could not answer at all.
/// The aggregator treats both as "no data".
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use radar_market_data::provider::MarketDataProvider;
///
/// struct StaticProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for StaticProvider {
///     fn id(&self) -> &'static str {
///         "STATIC"
///     }
///
///     fn priority(&self) -> u8 {
///         9
///     }
///
///     // ... implement resolve and snapshot
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier, used as the snapshot provider tag, for logging
    /// and for circuit breaker tracking.
    fn id(&self) -> &'static str;

    /// Fixed priority used as the last tie-break between providers.
    ///
    /// Lower values win.
    fn priority(&self) -> u8;

    /// Maps a free-text query (name, ticker, ISIN) to the provider's own id.
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedSecurity>, MarketDataError>;

    /// Fetches current market data for a previously resolved security.
    async fn snapshot(
        &self,
        security: &ResolvedSecurity,
    ) -> Result<Option<MarketSnapshot>, MarketDataError>;

    /// Coupon and amortization schedule for a bond.
    ///
    /// Default implementation returns `NotSupported`.
    async fn bond_calendar(&self, _secid: &str) -> Result<BondCalendar, MarketDataError> {
        Err(MarketDataError::NotSupported {
            provider: self.id().to_string(),
            operation: "bond_calendar".to_string(),
        })
    }
}

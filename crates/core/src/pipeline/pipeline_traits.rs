use async_trait::async_trait;
use radar_market_data::SecurityType;

use crate::errors::Result;
use crate::positions::{AccountPositions, BatchResolution, ResolvedPosition};

/// Trait for position resolution operations
#[async_trait]
pub trait ResolutionServiceTrait: Send + Sync {
    /// Normalizes, de-duplicates and resolves every account. Never fails:
    /// problems end up in counts and drop reasons.
    async fn resolve_batch(&self, accounts: Vec<AccountPositions>) -> BatchResolution;

    /// Resolves a single ticker typed in by the user. `security_type`
    /// defaults to share. Blank or non-alphanumeric tickers are
    /// `MalformedInput`; an unknown ticker is `Ok(None)`.
    async fn resolve_manual_ticker(
        &self,
        ticker: &str,
        security_type: Option<SecurityType>,
    ) -> Result<Option<ResolvedPosition>>;
}

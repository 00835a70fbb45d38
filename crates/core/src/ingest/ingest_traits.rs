use async_trait::async_trait;

use super::ingest_model::{IngestReport, UpsertOutcome};
use crate::errors::Result;
use crate::positions::{AccountPositions, CashLine, ResolvedPosition};

/// Persistence for a user's holdings, supplied by the host application.
///
/// Holdings are keyed by `ResolvedPosition::normalized_key` within an
/// account. Implementations report failures as `CoreError::Storage`.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn upsert_holding(
        &self,
        user_id: &str,
        account_id: &str,
        position: &ResolvedPosition,
    ) -> Result<UpsertOutcome>;

    /// Marks every holding of the account whose key is not in `keep_keys`
    /// inactive. Returns how many were deactivated.
    async fn deactivate_missing(
        &self,
        user_id: &str,
        account_id: &str,
        keep_keys: &[String],
    ) -> Result<usize>;

    async fn replace_cash(&self, user_id: &str, account_id: &str, cash: &[CashLine]) -> Result<()>;
}

/// Trait for ingestion operations
#[async_trait]
pub trait IngestServiceTrait: Send + Sync {
    /// Resolves a statement upload and replaces the stored holdings of
    /// every account it mentions.
    async fn ingest(&self, user_id: &str, accounts: Vec<AccountPositions>) -> Result<IngestReport>;

    /// Adds one manually typed ticker to an account. Other holdings are
    /// left alone. `Ok(None)` when the ticker cannot be resolved.
    async fn add_manual_ticker(
        &self,
        user_id: &str,
        account_id: &str,
        ticker: &str,
    ) -> Result<Option<ResolvedPosition>>;
}

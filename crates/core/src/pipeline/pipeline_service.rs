use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use radar_market_data::{MarketSnapshot, SecurityType, SnapshotSource};

use super::pipeline_overrides::reconcile_type;
use super::pipeline_traits::ResolutionServiceTrait;
use crate::config::{RadarConfig, DEFAULT_FALLBACK_FUZZY_THRESHOLD};
use crate::errors::{CoreError, Result};
use crate::normalize::{is_security_name, normalized_key, partition_duplicates};
use crate::positions::{
    AccountPositions, BatchResolution, DropReason, DroppedPosition, ExtractedPosition, MatchKind,
    NormalizedPosition, ResolutionCounts, ResolvedAccount, ResolvedPosition,
};
use crate::reference::ReferenceCatalog;

/// Provider id reported for positions identified by the catalog alone.
pub const REFERENCE_PROVIDER: &str = "reference";

#[derive(Clone, Debug)]
pub struct ResolutionOptions {
    /// Positions of one account resolved at once.
    pub concurrency: usize,
    /// Similarity required for the catalog fallback.
    pub fallback_fuzzy_threshold: f64,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            fallback_fuzzy_threshold: DEFAULT_FALLBACK_FUZZY_THRESHOLD,
        }
    }
}

impl From<&RadarConfig> for ResolutionOptions {
    fn from(config: &RadarConfig) -> Self {
        Self {
            concurrency: config.market_data.snapshot_concurrency.max(1),
            fallback_fuzzy_threshold: config.fallback_fuzzy_threshold,
        }
    }
}

/// Turns extracted statement positions into identified securities.
///
/// Per account: drop lines that are not securities, normalize and enrich
/// from the reference catalog, de-duplicate by key, then resolve each
/// survivor against the live providers with the catalog as fallback.
pub struct ResolutionPipeline {
    source: Arc<dyn SnapshotSource>,
    catalog: Arc<ReferenceCatalog>,
    options: ResolutionOptions,
}

fn dropped(raw_name: &str, key: &str, reason: DropReason) -> DroppedPosition {
    DroppedPosition {
        raw_name: raw_name.to_string(),
        normalized_key: key.to_string(),
        reason,
    }
}

/// What the security filter looks at: the name, or a declared identifier
/// when the name is blank.
fn filter_subject(raw: &ExtractedPosition) -> Option<&str> {
    [
        Some(raw.raw_name.as_str()),
        raw.raw_ticker.as_deref(),
        raw.raw_isin.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|value| !value.is_empty())
}

impl ResolutionPipeline {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        catalog: Arc<ReferenceCatalog>,
        options: ResolutionOptions,
    ) -> Self {
        Self {
            source,
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    /// Filters, normalizes and enriches an account's positions. Returns the
    /// de-duplicated survivors and everything dropped along the way.
    pub fn normalize_account(
        &self,
        positions: Vec<ExtractedPosition>,
    ) -> (Vec<NormalizedPosition>, Vec<DroppedPosition>) {
        let mut dropped_positions = Vec::new();
        let mut candidates = Vec::with_capacity(positions.len());

        for raw in positions {
            if !filter_subject(&raw).is_some_and(is_security_name) {
                debug!("Skipping non-security line {:?}", raw.raw_name);
                dropped_positions.push(dropped(&raw.raw_name, "", DropReason::NotASecurity));
                continue;
            }
            let mut position = NormalizedPosition::from_extracted(raw);
            self.catalog.enrich(&mut position);
            if position.normalized_key.is_empty() {
                dropped_positions.push(dropped(&position.raw.raw_name, "", DropReason::EmptyKey));
                continue;
            }
            candidates.push(position);
        }

        let (kept, duplicates) =
            partition_duplicates(candidates, |p: &NormalizedPosition| p.normalized_key.as_str());
        dropped_positions.extend(duplicates.iter().map(|p| {
            dropped(&p.raw.raw_name, &p.normalized_key, DropReason::Duplicate)
        }));
        (kept, dropped_positions)
    }

    async fn first_snapshot(&self, position: &NormalizedPosition) -> Option<(String, MarketSnapshot)> {
        for query in position.candidate_queries() {
            if let Some(snapshot) = self.source.get_snapshot_for(&query).await {
                return Some((query, snapshot));
            }
        }
        None
    }

    /// Resolves one normalized position, live providers first.
    pub async fn resolve_position(&self, position: &NormalizedPosition) -> Option<ResolvedPosition> {
        match self.first_snapshot(position).await {
            Some((query, snapshot)) => Some(self.resolved_from_snapshot(position, query, snapshot)),
            None => self.resolved_from_catalog(position),
        }
    }

    fn resolved_from_snapshot(
        &self,
        position: &NormalizedPosition,
        query: String,
        mut snapshot: MarketSnapshot,
    ) -> ResolvedPosition {
        let ticker = snapshot.ticker.clone().or_else(|| position.ticker.clone());
        let isin = snapshot.isin.clone().or_else(|| position.isin.clone());
        let security_type = reconcile_type(
            snapshot.security_type,
            ticker.as_deref(),
            position.security_type,
        );
        snapshot.security_type = security_type;
        let name = snapshot
            .name
            .clone()
            .unwrap_or_else(|| position.display_name().to_string());
        debug!(
            "Resolved {:?} via {} as {} ({:?})",
            position.raw.raw_name, snapshot.provider, snapshot.secid, security_type
        );

        ResolvedPosition {
            raw_name: position.raw.raw_name.clone(),
            normalized_key: normalized_key(&position.name, ticker.as_deref(), isin.as_deref()),
            name,
            secid: Some(snapshot.secid.clone()),
            ticker,
            isin,
            security_type: Some(security_type),
            quantity: position.raw.quantity,
            provider: snapshot.provider.to_string(),
            fallback: false,
            resolved_query: Some(query),
            reference: position.reference.clone(),
            snapshot: Some(snapshot),
        }
    }

    fn resolved_from_catalog(&self, position: &NormalizedPosition) -> Option<ResolvedPosition> {
        let name_query = if position.raw.raw_name.trim().is_empty() {
            position.normalized_name.as_str()
        } else {
            position.raw.raw_name.as_str()
        };
        let found = self
            .catalog
            .match_exact(
                position.isin.as_deref(),
                position.ticker.as_deref(),
                Some(&position.name),
            )
            .or_else(|| {
                self.catalog
                    .match_fuzzy(name_query, self.options.fallback_fuzzy_threshold)
            })?;

        let entry = found.entry;
        let ticker = position.ticker.clone().or_else(|| entry.ticker.clone());
        let isin = position.isin.clone().or_else(|| Some(entry.isin.clone()));
        let name = position
            .canonical_name
            .clone()
            .or_else(|| entry.name.clone())
            .or_else(|| entry.full_name.clone())
            .unwrap_or_else(|| position.name.clone());
        // A fuzzy hit names the closest entry, not necessarily this security.
        let key = if found.matched_by == MatchKind::Fuzzy {
            position.normalized_key.clone()
        } else {
            normalized_key(&position.name, ticker.as_deref(), isin.as_deref())
        };
        info!(
            "No provider data for {:?}, using reference entry {}",
            position.raw.raw_name, entry.isin
        );

        Some(ResolvedPosition {
            raw_name: position.raw.raw_name.clone(),
            normalized_key: key,
            name,
            secid: ticker.clone().or_else(|| isin.clone()),
            ticker,
            isin,
            security_type: Some(position.security_type.unwrap_or(entry.security_type)),
            quantity: position.raw.quantity,
            provider: REFERENCE_PROVIDER.to_string(),
            fallback: true,
            resolved_query: None,
            reference: Some(found.provenance()),
            snapshot: None,
        })
    }

    async fn resolve_account(&self, account: AccountPositions) -> (ResolvedAccount, ResolutionCounts) {
        let mut counts = ResolutionCounts {
            raw_detected: account.positions.len(),
            ..ResolutionCounts::default()
        };
        let (kept, mut dropped_positions) = self.normalize_account(account.positions);
        counts.normalized = kept.len();

        let outcomes: Vec<Option<ResolvedPosition>> = stream::iter(kept.clone())
            .map(|position| async move { self.resolve_position(&position).await })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut resolved = Vec::with_capacity(outcomes.len());
        for (position, outcome) in kept.iter().zip(outcomes) {
            match outcome {
                Some(found) => resolved.push(found),
                None => {
                    warn!("Could not resolve {:?}", position.raw.raw_name);
                    dropped_positions.push(dropped(
                        &position.raw.raw_name,
                        &position.normalized_key,
                        DropReason::Unresolved,
                    ));
                }
            }
        }

        // Different spellings can resolve to the same security.
        let (positions, late_duplicates) =
            partition_duplicates(resolved, |p: &ResolvedPosition| p.normalized_key.as_str());
        dropped_positions.extend(late_duplicates.iter().map(|p| {
            dropped(&p.raw_name, &p.normalized_key, DropReason::Duplicate)
        }));

        let result = ResolvedAccount {
            account_id: account.account_id,
            account_name: account.account_name,
            positions,
            cash: account.cash,
            dropped: dropped_positions,
        };
        counts.resolved = result.positions.len();
        counts.filtered = result.count(DropReason::NotASecurity) + result.count(DropReason::EmptyKey);
        counts.duplicates = result.count(DropReason::Duplicate);
        counts.skipped = result.count(DropReason::Unresolved);
        (result, counts)
    }

    fn manual_position(ticker: &str, security_type: Option<SecurityType>) -> Result<NormalizedPosition> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(CoreError::MalformedInput("ticker is empty".to_string()));
        }
        if !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::MalformedInput(format!("invalid ticker {:?}", ticker)));
        }
        let security_type = security_type.unwrap_or(SecurityType::Share);
        let mut raw = ExtractedPosition::new(ticker.as_str())
            .with_ticker(ticker.as_str())
            .with_type(security_type.to_string());
        raw.hints.manual = true;
        let mut position = NormalizedPosition::from_extracted(raw);
        position.security_type = Some(security_type);
        Ok(position)
    }
}

#[async_trait]
impl ResolutionServiceTrait for ResolutionPipeline {
    async fn resolve_batch(&self, accounts: Vec<AccountPositions>) -> BatchResolution {
        let accounts: Vec<AccountPositions> = accounts
            .into_iter()
            .filter(|account| {
                if account.is_empty() {
                    debug!("Skipping empty account {}", account.account_id);
                }
                !account.is_empty()
            })
            .collect();

        let results = join_all(accounts.into_iter().map(|a| self.resolve_account(a))).await;

        let mut counts = ResolutionCounts::default();
        let mut resolved_accounts = Vec::with_capacity(results.len());
        for (account, account_counts) in results {
            counts.add(&account_counts);
            resolved_accounts.push(account);
        }
        info!(
            "Resolved {} of {} detected positions ({} filtered, {} duplicates, {} skipped)",
            counts.resolved, counts.raw_detected, counts.filtered, counts.duplicates, counts.skipped
        );
        BatchResolution {
            accounts: resolved_accounts,
            counts,
        }
    }

    async fn resolve_manual_ticker(
        &self,
        ticker: &str,
        security_type: Option<SecurityType>,
    ) -> Result<Option<ResolvedPosition>> {
        let position = Self::manual_position(ticker, security_type)?;
        Ok(self.resolve_position(&position).await)
    }
}

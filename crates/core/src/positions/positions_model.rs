//! Positions domain models.
//!
//! A position travels through three shapes: [`ExtractedPosition`] as the
//! extractor produced it, [`NormalizedPosition`] once its identifiers are
//! cleaned up and keyed, and [`ResolvedPosition`] after a provider or the
//! reference catalog has identified it.

use radar_market_data::{MarketSnapshot, SecurityType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::normalize::{
    extract_isin, extract_ticker, normalize, normalize_security_type, normalize_series,
    normalized_key,
};

/// Optional facts an extractor or a manual entry attaches to a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionHints {
    /// Issuer as printed on the statement, e.g. "ПАО Газпром".
    pub issuer: Option<String>,
    /// Long form of the name when the statement shows one.
    pub full_name: Option<String>,
    /// Entered by the user rather than read off a statement.
    #[serde(default)]
    pub manual: bool,
}

/// A holding as read from a brokerage statement. Any field may be missing
/// or corrupted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPosition {
    pub raw_name: String,
    pub raw_ticker: Option<String>,
    pub raw_isin: Option<String>,
    pub raw_type: Option<String>,
    pub quantity: Option<Decimal>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub hints: PositionHints,
}

impl ExtractedPosition {
    pub fn new(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            raw_ticker: None,
            raw_isin: None,
            raw_type: None,
            quantity: None,
            confidence: None,
            hints: PositionHints::default(),
        }
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.raw_ticker = Some(ticker.into());
        self
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.raw_isin = Some(isin.into());
        self
    }

    pub fn with_type(mut self, raw_type: impl Into<String>) -> Self {
        self.raw_type = Some(raw_type.into());
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// A cash balance line. Passed through resolution untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashLine {
    pub raw_name: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Everything extracted for one brokerage account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPositions {
    pub account_id: String,
    pub account_name: Option<String>,
    #[serde(default)]
    pub positions: Vec<ExtractedPosition>,
    #[serde(default)]
    pub cash: Vec<CashLine>,
}

impl AccountPositions {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            account_name: None,
            positions: Vec::new(),
            cash: Vec::new(),
        }
    }

    /// No positions and no cash: nothing to resolve or store.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.cash.is_empty()
    }
}

/// How a reference catalog entry was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Isin,
    Ticker,
    Name,
    Alias,
    Fuzzy,
}

/// Where catalog-supplied identifiers came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceProvenance {
    pub isin: String,
    pub matched_by: MatchKind,
    pub matched_alias: Option<String>,
    pub score: Option<f64>,
    /// Dataset dumps that described the entry.
    pub sources: Vec<String>,
}

/// A position with cleaned identifiers and its de-duplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPosition {
    pub raw: ExtractedPosition,
    /// Raw name with bond series codes repaired.
    pub name: String,
    pub normalized_name: String,
    /// Name confirmed by a provider or the catalog.
    pub canonical_name: Option<String>,
    pub ticker: Option<String>,
    pub isin: Option<String>,
    pub security_type: Option<SecurityType>,
    pub normalized_key: String,
    pub reference: Option<ReferenceProvenance>,
}

fn declared(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
}

impl NormalizedPosition {
    /// Cleans up an extracted position. Declared ticker and ISIN win over
    /// ones found in the name.
    pub fn from_extracted(raw: ExtractedPosition) -> Self {
        let name = normalize_series(raw.raw_name.trim());
        let ticker = declared(raw.raw_ticker.as_deref()).or_else(|| extract_ticker(&name));
        let isin = declared(raw.raw_isin.as_deref()).or_else(|| extract_isin(&name));
        let security_type = raw.raw_type.as_deref().and_then(normalize_security_type);
        let mut position = Self {
            normalized_name: normalize(&name),
            name,
            canonical_name: None,
            ticker,
            isin,
            security_type,
            normalized_key: String::new(),
            reference: None,
            raw,
        };
        position.refresh_key();
        position
    }

    /// Recomputes the key after identifiers changed.
    pub fn refresh_key(&mut self) {
        self.normalized_key =
            normalized_key(&self.name, self.ticker.as_deref(), self.isin.as_deref());
    }

    pub fn display_name(&self) -> &str {
        self.canonical_name.as_deref().unwrap_or(&self.name)
    }

    /// Strings worth asking providers about, in order: raw name, ticker,
    /// ISIN, normalized name. Empty and repeated queries are skipped.
    pub fn candidate_queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = Vec::new();
        for candidate in [
            Some(self.raw.raw_name.trim()),
            self.ticker.as_deref(),
            self.isin.as_deref(),
            Some(self.normalized_name.as_str()),
        ]
        .into_iter()
        .flatten()
        {
            let candidate = candidate.trim();
            if candidate.is_empty()
                || queries.iter().any(|q| q.eq_ignore_ascii_case(candidate))
            {
                continue;
            }
            queries.push(candidate.to_string());
        }
        queries
    }
}

/// A position identified by a live provider or, failing that, the
/// reference catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPosition {
    pub raw_name: String,
    pub name: String,
    pub secid: Option<String>,
    pub ticker: Option<String>,
    pub isin: Option<String>,
    pub security_type: Option<SecurityType>,
    pub quantity: Option<Decimal>,
    pub normalized_key: String,
    /// Provider id, or `reference` for catalog matches.
    pub provider: String,
    /// True when identifiers come from the catalog rather than a provider.
    pub fallback: bool,
    /// Query that produced the provider hit.
    pub resolved_query: Option<String>,
    pub reference: Option<ReferenceProvenance>,
    pub snapshot: Option<MarketSnapshot>,
}

/// Why a position did not make it into the resolved list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NotASecurity,
    EmptyKey,
    Duplicate,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedPosition {
    pub raw_name: String,
    pub normalized_key: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAccount {
    pub account_id: String,
    pub account_name: Option<String>,
    pub positions: Vec<ResolvedPosition>,
    pub cash: Vec<CashLine>,
    pub dropped: Vec<DroppedPosition>,
}

impl ResolvedAccount {
    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }
}

/// Batch totals.
///
/// `raw_detected` counts every extracted position, `normalized` those left
/// after filtering and de-duplication, `resolved` those identified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCounts {
    pub raw_detected: usize,
    pub normalized: usize,
    pub resolved: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl ResolutionCounts {
    pub fn add(&mut self, other: &ResolutionCounts) {
        self.raw_detected += other.raw_detected;
        self.normalized += other.normalized;
        self.resolved += other.resolved;
        self.filtered += other.filtered;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResolution {
    pub accounts: Vec<ResolvedAccount>,
    pub counts: ResolutionCounts,
}

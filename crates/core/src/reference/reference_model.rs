//! Reference catalog records and entries.

use std::collections::HashMap;

use radar_market_data::SecurityType;
use serde::{Deserialize, Serialize};

use crate::normalize::{normalize, normalize_security_type};

/// One security as described by a single source dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub isin: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub issuer_name: Option<String>,
    pub ticker: Option<String>,
    pub board: Option<String>,
    #[serde(default, alias = "type")]
    pub security_type: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A known security, read-only once the catalog is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceEntry {
    pub isin: String,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub issuer: Option<String>,
    pub ticker: Option<String>,
    pub board: Option<String>,
    pub security_type: SecurityType,
    pub sources: Vec<String>,
    pub normalized_name: Option<String>,
    pub normalized_full_name: Option<String>,
    /// Every lookup form generated from name, full name and ticker.
    pub aliases: Vec<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ReferenceEntry {
    /// Builds an entry from a merged record. Records without an ISIN are
    /// not entries.
    pub fn from_record(record: &ReferenceRecord) -> Option<Self> {
        let isin = non_empty(&record.isin)?.to_uppercase();
        let name = non_empty(&record.name);
        let full_name = non_empty(&record.full_name);
        let ticker = non_empty(&record.ticker);
        let aliases = super::reference_aliases::entry_aliases(
            [name.as_deref(), full_name.as_deref(), ticker.as_deref()]
                .into_iter()
                .flatten(),
        );
        Some(Self {
            normalized_name: name.as_deref().map(normalize).filter(|n| !n.is_empty()),
            normalized_full_name: full_name.as_deref().map(normalize).filter(|n| !n.is_empty()),
            security_type: record
                .security_type
                .as_deref()
                .and_then(normalize_security_type)
                .unwrap_or(SecurityType::Bond),
            isin,
            name,
            full_name,
            issuer: non_empty(&record.issuer_name),
            ticker,
            board: non_empty(&record.board),
            sources: record.sources.clone(),
            aliases,
        })
    }
}

fn fill(target: &mut Option<String>, candidate: &Option<String>) {
    if non_empty(target).is_none() {
        if let Some(value) = non_empty(candidate) {
            *target = Some(value);
        }
    }
}

fn add_source(sources: &mut Vec<String>, source: String) {
    if !sources.contains(&source) {
        sources.push(source);
    }
}

/// Merges records from several dumps by ISIN.
///
/// Output follows first-seen ISIN order. For every field the first
/// non-empty value wins; `sources` accumulate without repeats. Records
/// without an ISIN are dropped.
pub fn merge_records<I>(records: I) -> Vec<ReferenceRecord>
where
    I: IntoIterator<Item = ReferenceRecord>,
{
    let mut merged: Vec<ReferenceRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let Some(isin) = non_empty(&record.isin).map(|i| i.to_uppercase()) else {
            continue;
        };
        let Some(slot) = index.get(&isin).copied() else {
            index.insert(isin.clone(), merged.len());
            let mut first = record;
            first.isin = Some(isin);
            for source in std::mem::take(&mut first.sources) {
                add_source(&mut first.sources, source);
            }
            merged.push(first);
            continue;
        };
        let target = &mut merged[slot];
        fill(&mut target.name, &record.name);
        fill(&mut target.full_name, &record.full_name);
        fill(&mut target.issuer_name, &record.issuer_name);
        fill(&mut target.ticker, &record.ticker);
        fill(&mut target.board, &record.board);
        fill(&mut target.security_type, &record.security_type);
        for source in record.sources {
            add_source(&mut target.sources, source);
        }
    }
    merged
}

/// Entries that exist even without a dataset on disk.
pub fn builtin_records() -> Vec<ReferenceRecord> {
    vec![ReferenceRecord {
        isin: Some("BYM000002154".to_string()),
        name: Some("РесБел 340".to_string()),
        full_name: Some("РесБел 340 29.06.2027".to_string()),
        issuer_name: Some("РесБел".to_string()),
        ticker: Some("BYM000002154".to_string()),
        board: None,
        security_type: Some("bond".to_string()),
        sources: vec!["builtin".to_string()],
    }]
}

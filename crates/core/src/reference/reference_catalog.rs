//! Exact and fuzzy lookup over the merged reference dataset.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use radar_market_data::SimilarityStrategy;

use super::reference_aliases::{name_forms, query_variants};
use super::reference_model::{builtin_records, merge_records, ReferenceEntry, ReferenceRecord};
use crate::errors::{CoreError, Result};
use crate::normalize::normalize;
use crate::positions::{MatchKind, NormalizedPosition, ReferenceProvenance};

/// Catalog lookups below this similarity are not trusted for enrichment.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.82;

/// A catalog hit and how it was found.
#[derive(Debug, Clone)]
pub struct CatalogMatch<'a> {
    pub entry: &'a ReferenceEntry,
    pub matched_by: MatchKind,
    pub matched_alias: Option<String>,
    pub score: Option<f64>,
}

impl CatalogMatch<'_> {
    pub fn provenance(&self) -> ReferenceProvenance {
        ReferenceProvenance {
            isin: self.entry.isin.clone(),
            matched_by: self.matched_by,
            matched_alias: self.matched_alias.clone(),
            score: self.score,
            sources: self.entry.sources.clone(),
        }
    }
}

/// Static dataset of known securities with exact and fuzzy indexes.
///
/// Built once at startup and never mutated, so it is shared without locks.
pub struct ReferenceCatalog {
    entries: Vec<ReferenceEntry>,
    by_isin: HashMap<String, usize>,
    by_ticker: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_alias: BTreeMap<String, usize>,
    similarity: Arc<dyn SimilarityStrategy>,
    fuzzy_threshold: f64,
}

fn clean_code(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
}

fn catalog_error(path: &Path, message: impl ToString) -> CoreError {
    CoreError::Catalog {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Reads one JSON dump (an array of records). Items that are not records
/// are skipped.
pub fn read_dump(path: &Path) -> Result<Vec<ReferenceRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| catalog_error(path, e))?;
    let items: Vec<serde_json::Value> =
        serde_json::from_str(&text).map_err(|e| catalog_error(path, e))?;
    let total = items.len();
    let records: Vec<ReferenceRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if records.len() < total {
        warn!(
            "Skipped {} malformed records in {}",
            total - records.len(),
            path.display()
        );
    }
    Ok(records)
}

/// Dump files to merge: the file itself, or every `.json` file of a
/// directory in name order.
fn dump_paths(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|e| catalog_error(path, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

impl ReferenceCatalog {
    /// Builds the catalog from records of any number of dumps. Builtin
    /// entries are always appended.
    pub fn new(
        records: Vec<ReferenceRecord>,
        similarity: Arc<dyn SimilarityStrategy>,
        fuzzy_threshold: f64,
    ) -> Self {
        let entries: Vec<ReferenceEntry> = merge_records(records.into_iter().chain(builtin_records()))
            .iter()
            .filter_map(ReferenceEntry::from_record)
            .collect();

        let mut by_isin = HashMap::new();
        let mut by_ticker = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_alias = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_isin.entry(entry.isin.clone()).or_insert(i);
            if let Some(ticker) = clean_code(entry.ticker.as_deref()) {
                by_ticker.entry(ticker).or_insert(i);
            }
            for name in [&entry.normalized_name, &entry.normalized_full_name]
                .into_iter()
                .flatten()
            {
                by_name.entry(name.clone()).or_insert(i);
            }
            for alias in &entry.aliases {
                by_alias.entry(alias.clone()).or_insert(i);
            }
        }

        Self {
            entries,
            by_isin,
            by_ticker,
            by_name,
            by_alias,
            similarity,
            fuzzy_threshold,
        }
    }

    /// Catalog holding only the builtin entries.
    pub fn builtin(similarity: Arc<dyn SimilarityStrategy>, fuzzy_threshold: f64) -> Self {
        Self::new(Vec::new(), similarity, fuzzy_threshold)
    }

    /// Loads the dump (or directory of dumps) at `path`.
    ///
    /// No path or a missing path falls back to the builtin entries. A dump
    /// that exists but cannot be read is an error.
    pub fn load(
        path: Option<&Path>,
        similarity: Arc<dyn SimilarityStrategy>,
        fuzzy_threshold: f64,
    ) -> Result<Self> {
        let Some(path) = path else {
            info!("No reference catalog configured, using builtin entries");
            return Ok(Self::builtin(similarity, fuzzy_threshold));
        };
        if !path.exists() {
            warn!("Reference catalog not found at {}, using builtin entries", path.display());
            return Ok(Self::builtin(similarity, fuzzy_threshold));
        }
        let mut records = Vec::new();
        for dump in dump_paths(path)? {
            records.extend(read_dump(&dump)?);
        }
        let catalog = Self::new(records, similarity, fuzzy_threshold);
        info!(
            "Loaded {} reference entries ({} aliases) from {}",
            catalog.len(),
            catalog.by_alias.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    fn hit(&self, index: usize, matched_by: MatchKind, alias: Option<String>) -> CatalogMatch<'_> {
        CatalogMatch {
            entry: &self.entries[index],
            matched_by,
            matched_alias: alias,
            score: None,
        }
    }

    /// Exact lookup: ISIN, then ticker, then any generated form of the name.
    pub fn match_exact(
        &self,
        isin: Option<&str>,
        ticker: Option<&str>,
        name: Option<&str>,
    ) -> Option<CatalogMatch<'_>> {
        if let Some(isin) = clean_code(isin) {
            if let Some(&i) = self.by_isin.get(&isin) {
                return Some(self.hit(i, MatchKind::Isin, None));
            }
        }
        if let Some(ticker) = clean_code(ticker) {
            if let Some(&i) = self.by_ticker.get(&ticker) {
                return Some(self.hit(i, MatchKind::Ticker, None));
            }
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty())?;
        for form in name_forms(name) {
            if let Some(&i) = self.by_name.get(&form) {
                return Some(self.hit(i, MatchKind::Name, Some(form)));
            }
        }
        query_variants(name).into_iter().find_map(|variant| {
            self.by_alias
                .get(&variant)
                .map(|&i| self.hit(i, MatchKind::Alias, Some(variant.clone())))
        })
    }

    /// Best alias by similarity over the full and the space-less normalized
    /// name. Only scores at or above `threshold` count; ties keep the first
    /// alias in sorted order.
    pub fn match_fuzzy(&self, name: &str, threshold: f64) -> Option<CatalogMatch<'_>> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return None;
        }
        let compact = normalized.replace(' ', "");
        let mut best: Option<(usize, &str, f64)> = None;
        for (alias, &i) in &self.by_alias {
            let mut score = self.similarity.similarity(&normalized, alias);
            if compact != normalized {
                score = score.max(self.similarity.similarity(&compact, alias));
            }
            if score >= threshold && best.map_or(true, |(_, _, top)| score > top) {
                best = Some((i, alias, score));
            }
        }
        best.map(|(i, alias, score)| {
            debug!("Fuzzy catalog match {:?} -> {} ({:.3})", name, alias, score);
            CatalogMatch {
                entry: &self.entries[i],
                matched_by: MatchKind::Fuzzy,
                matched_alias: Some(alias.to_string()),
                score: Some(score),
            }
        })
    }

    /// Exact match on the position's identifiers and hints, then a fuzzy
    /// match on its raw name at the catalog threshold.
    pub fn lookup(&self, position: &NormalizedPosition) -> Option<CatalogMatch<'_>> {
        let hints = &position.raw.hints;
        let issuer_name = hints
            .issuer
            .as_deref()
            .map(|issuer| format!("{} {}", issuer.trim(), position.name));
        self.match_exact(
            position.isin.as_deref(),
            position.ticker.as_deref(),
            Some(&position.name),
        )
        .or_else(|| {
            [hints.full_name.as_deref(), issuer_name.as_deref()]
                .into_iter()
                .flatten()
                .find_map(|hint| self.match_exact(None, None, Some(hint)))
        })
        .or_else(|| self.match_fuzzy(&position.raw.raw_name, self.fuzzy_threshold))
    }

    /// Fills missing ISIN, ticker, canonical name and type from an exact
    /// catalog match and records where they came from. Fields that already
    /// hold a value are never touched. A fuzzy match only records its
    /// provenance: a near-miss name is often a different issue of the same
    /// borrower. Returns whether anything was filled.
    pub fn enrich(&self, position: &mut NormalizedPosition) -> bool {
        let Some(found) = self.lookup(position) else {
            return false;
        };
        if found.matched_by == MatchKind::Fuzzy {
            if position.reference.is_none() {
                position.reference = Some(found.provenance());
            }
            return false;
        }
        let entry = found.entry;
        let mut changed = false;
        if position.isin.is_none() {
            position.isin = Some(entry.isin.clone());
            changed = true;
        }
        if position.ticker.is_none() && entry.ticker.is_some() {
            position.ticker = entry.ticker.clone();
            changed = true;
        }
        if position.canonical_name.is_none() {
            if let Some(name) = entry.name.as_ref().or(entry.full_name.as_ref()) {
                position.canonical_name = Some(name.clone());
                changed = true;
            }
        }
        if position.security_type.is_none() {
            position.security_type = Some(entry.security_type);
            changed = true;
        }
        if position.reference.is_none() {
            position.reference = Some(found.provenance());
        }
        if changed {
            position.refresh_key();
        }
        changed
    }
}

//! Lookup forms generated from security names.
//!
//! The same generator runs over catalog names when the catalog is built and
//! over the query at lookup time, so both sides land on identical strings.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::normalize::{normalize, normalize_series};

/// Filler words that statements add or drop at will.
const FILLER_WORDS: &[&str] = &[
    "компания",
    "компани",
    "комп",
    "транспортная",
    "транспортн",
    "транспорт",
    "транс",
    "торговый дом",
    "торговыйдом",
    "торговый",
    "тд",
    "государственная",
    "гос",
];

lazy_static! {
    /// Exchange series marker "BO"/"БО" as a standalone token.
    static ref SERIES_TOKEN: Regex =
        Regex::new(r"\b[БB][ОO]\b-?").expect("Invalid regex pattern");

    static ref FILLER: Regex = {
        let mut words: Vec<String> = FILLER_WORDS.iter().map(|w| normalize(w)).collect();
        words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{alternation})\b")).expect("Invalid regex pattern")
    };
}

fn strip_noise(normalized: &str) -> String {
    let without_series = SERIES_TOKEN.replace_all(normalized, " ");
    let without_filler = FILLER.replace_all(&without_series, " ");
    without_filler
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c| c == '-' || c == '.')
        .trim()
        .to_string()
}

/// A normalized name, its noise-stripped form, and the space-less and
/// dash-less versions of both.
pub(crate) fn variants(normalized: &str) -> BTreeSet<String> {
    let mut base = vec![normalized.to_string()];
    let stripped = strip_noise(normalized);
    if stripped != normalized {
        base.push(stripped);
    }
    let mut out = BTreeSet::new();
    for form in base {
        out.insert(form.replace(' ', ""));
        out.insert(form.replace('-', ""));
        out.insert(form.replace([' ', '-'], ""));
        out.insert(form);
    }
    out.retain(|v| !v.is_empty());
    out
}

/// Normalized forms of a raw name, with and without series-code repair.
pub(crate) fn name_forms(raw: &str) -> Vec<String> {
    let plain = normalize(raw);
    let repaired = normalize(&normalize_series(raw));
    let mut forms = Vec::with_capacity(2);
    if !plain.is_empty() {
        forms.push(plain);
    }
    if !repaired.is_empty() && !forms.contains(&repaired) {
        forms.push(repaired);
    }
    forms
}

/// Every variant of every normalized form of `raw`.
pub(crate) fn query_variants(raw: &str) -> BTreeSet<String> {
    name_forms(raw).iter().flat_map(|f| variants(f)).collect()
}

/// Sorted alias set for an entry's name, full name and ticker.
pub(crate) fn entry_aliases<'a, I>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut aliases = BTreeSet::new();
    for candidate in candidates {
        aliases.extend(query_variants(candidate));
    }
    aliases.into_iter().collect()
}

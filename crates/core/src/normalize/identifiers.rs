//! Ticker/ISIN extraction and the de-duplication key.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::security_name::normalize;
use crate::positions::NormalizedPosition;

lazy_static! {
    /// Two country letters, nine alphanumerics, one check digit.
    static ref ISIN: Regex =
        Regex::new(r"\b([A-Z]{2}[A-Z0-9]{9}[0-9])\b").expect("Invalid regex pattern");

    /// Ticker shapes, tried in order: "SBER", "SU26", "001P".
    static ref TICKER_PATTERNS: Vec<Regex> = [
        r"\b([A-Z]{3,6})\b",
        r"\b([A-Z]{2,4}\d{1,2})\b",
        r"\b(\d{3,6}[A-Z]{1,3})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid regex pattern"))
    .collect();
}

/// Company legal forms that look like tickers but never are.
const LEGAL_FORMS: &[&str] = &["PAO", "OAO", "ZAO", "OOO", "PJSC", "LLC", "INC", "LTD"];

fn first_isin(text: &str) -> Option<String> {
    ISIN.captures(text).map(|c| c[1].to_string())
}

/// First ISIN-shaped token, looked up in the normalized text (which repairs
/// O/0 and I/1 confusion) and then in the plain uppercased text.
pub fn extract_isin(text: &str) -> Option<String> {
    first_isin(&normalize(text)).or_else(|| first_isin(&text.to_uppercase()))
}

/// Whether the match is glued to a neighbouring `-` or `.`, as series
/// fragments like "001P" in "BO-001P-02" are.
fn is_fragment(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    [before, after]
        .into_iter()
        .flatten()
        .any(|c| c == '-' || c == '.')
}

/// First ticker-shaped token (3 to 8 Latin letters/digits).
///
/// Works on the uppercased raw text: folding Cyrillic look-alikes would
/// turn "МТС" into a fake Latin ticker.
pub fn extract_ticker(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    if upper.trim().is_empty() {
        return None;
    }
    let isin = first_isin(&upper);
    for pattern in TICKER_PATTERNS.iter() {
        for found in pattern.find_iter(&upper) {
            let token = found.as_str();
            if !(3..=8).contains(&token.len())
                || LEGAL_FORMS.contains(&token)
                || isin.as_deref() == Some(token)
                || is_fragment(&upper, found.start(), found.end())
            {
                continue;
            }
            return Some(token.to_string());
        }
    }
    None
}

/// De-duplication identity of a position.
///
/// An ISIN identifies a security on its own, so when one is present the key
/// is `ISIN:<isin>` and names cannot split it. Otherwise the key is
/// `TICKER:<ticker>|NAME:<normalized name>` with empty parts omitted. All
/// parts empty yields an empty key.
pub fn normalized_key(name: &str, ticker: Option<&str>, isin: Option<&str>) -> String {
    let clean = |v: Option<&str>| {
        v.map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
    };
    if let Some(isin) = clean(isin) {
        return format!("ISIN:{isin}");
    }
    let mut parts = Vec::new();
    if let Some(ticker) = clean(ticker) {
        parts.push(format!("TICKER:{ticker}"));
    }
    let name = normalize(name);
    if !name.is_empty() {
        parts.push(format!("NAME:{name}"));
    }
    parts.join("|")
}

/// Splits `items` into first occurrences per key and everything else.
///
/// Order is preserved in both halves. Items with an empty key have no
/// identity and go to the second half.
pub fn partition_duplicates<T, F>(items: Vec<T>, key: F) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = Vec::new();
    for item in items {
        let k = key(&item);
        if !k.is_empty() && seen.insert(k.to_string()) {
            kept.push(item);
        } else {
            dropped.push(item);
        }
    }
    (kept, dropped)
}

/// Keeps the first position for every normalized key, in input order.
pub fn dedupe(positions: Vec<NormalizedPosition>) -> Vec<NormalizedPosition> {
    partition_duplicates(positions, |p| p.normalized_key.as_str()).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_isin() {
        assert_eq!(
            extract_isin("Газпром капитал RU000A100001 БО-001Р-02"),
            Some("RU000A100001".to_string())
        );
        assert_eq!(extract_isin("ru000a100001"), Some("RU000A100001".to_string()));
        assert_eq!(extract_isin("RU000A1OO001"), Some("RU000A100001".to_string()));
        assert_eq!(extract_isin("Сбербанк ПАО"), None);
        assert_eq!(extract_isin(""), None);
    }

    #[test]
    fn test_extract_ticker_patterns_in_order() {
        assert_eq!(extract_ticker("SBER ао"), Some("SBER".to_string()));
        assert_eq!(extract_ticker("ОФЗ SU26 выпуск"), Some("SU26".to_string()));
        assert_eq!(extract_ticker("Бумага 2600X"), Some("2600X".to_string()));
    }

    #[test]
    fn test_extract_ticker_skips_noise() {
        assert_eq!(extract_ticker("СБЕРБАНК ПАО"), None);
        assert_eq!(extract_ticker("Sberbank PAO"), None);
        assert_eq!(extract_ticker("Gazprom PJSC GAZP"), Some("GAZP".to_string()));
        assert_eq!(extract_ticker("RU000A100001"), None);
        assert_eq!(extract_ticker("Газпром БО-001Р-02"), None);
        assert_eq!(extract_ticker("Gazprom BO-001P-02"), None);
        assert_eq!(extract_ticker("   "), None);
    }

    #[test]
    fn test_normalized_key_prefers_isin() {
        assert_eq!(
            normalized_key("Газпром", Some("GAZP"), Some("ru000a100001")),
            "ISIN:RU000A100001"
        );
        assert_eq!(
            normalized_key("Газпром БО-001Р-02", None, Some("RU000A100001")),
            normalized_key("ГАЗПРОМ  Б0-001P-02", Some("X"), Some("RU000A100001"))
        );
    }

    #[test]
    fn test_normalized_key_composite_without_isin() {
        assert_eq!(normalized_key("Сбербанк", Some("sber"), None), "TICKER:SBER|NAME:CБEPБAHK");
        assert_eq!(normalized_key("Сбербанк", None, Some("  ")), "NAME:CБEPБAHK");
        assert_eq!(normalized_key("", Some("SBER"), None), "TICKER:SBER");
        assert_eq!(normalized_key("!!", None, None), "");
    }

    #[test]
    fn test_partition_duplicates_keeps_first() {
        let items = vec![("a", 1), ("b", 2), ("a", 3), ("", 4), ("b", 5), ("c", 6)];
        let (kept, dropped) = partition_duplicates(items, |(k, _)| *k);
        assert_eq!(kept, vec![("a", 1), ("b", 2), ("c", 6)]);
        assert_eq!(dropped, vec![("a", 3), ("", 4), ("b", 5)]);
    }
}

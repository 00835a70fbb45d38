//! Canonical forms for free-text security names.
//!
//! Names arrive from OCR and manual entry with mixed Cyrillic/Latin
//! look-alikes, stray punctuation and mangled bond series codes. Everything
//! here is a total function: bad input produces an empty string or `false`,
//! never an error.

use lazy_static::lazy_static;
use radar_market_data::SecurityType;
use regex::Regex;

lazy_static! {
    /// Anything that is not a word character, whitespace, dash or dot.
    static ref DISALLOWED: Regex =
        Regex::new(r"[^\w\s\-.]").expect("Invalid regex pattern");

    static ref DOT_RUN: Regex = Regex::new(r"\.{2,}").expect("Invalid regex pattern");

    static ref DASH_RUN: Regex = Regex::new(r"-{2,}").expect("Invalid regex pattern");

    /// Exchange bond series prefix "БО" (or OCR "Б0") directly before a number.
    static ref SERIES_PREFIX: Regex =
        Regex::new(r"Б[O0](-?\d)").expect("Invalid regex pattern");

    /// "БО - 07", "БО07", "B0 07" before normalization.
    static ref SERIES_HEAD: Regex =
        Regex::new(r"(?i)\b([БB][ОO0])\s*-?\s*(\d)").expect("Invalid regex pattern");

    /// "001Р - 02" and "001 - 02" inside a series code.
    static ref SERIES_JOIN: Regex =
        Regex::new(r"(?i)(\d[РP]?)\s*-\s*(\d)").expect("Invalid regex pattern");

    /// Deny-list terms in folded form, so mixed-script input matches too.
    static ref DENY_TERMS: Vec<String> = NON_SECURITY_TERMS.iter().copied().map(fold).collect();
}

/// Substrings marking a line as cash, deposits, metals, crypto, property,
/// insurance or a report total rather than a tradable security.
const NON_SECURITY_TERMS: &[&str] = &[
    "депозит",
    "вклад",
    "наличн",
    "кэш",
    "cash",
    "деньги",
    "денежн",
    "свободные средства",
    "остаток",
    "рубл",
    "доллар",
    "валют",
    "золот",
    "серебр",
    "платин",
    "паллади",
    "металл",
    "gold",
    "silver",
    "крипто",
    "crypto",
    "bitcoin",
    "биткоин",
    "ethereum",
    "эфириум",
    "недвижим",
    "квартир",
    "real estate",
    "property",
    "страхов",
    "полис",
    "insurance",
    "итого",
    "total",
    "баланс",
    "портфел",
    "portfolio",
    "счет",
    "счёт",
];

/// Cyrillic capitals that OCR and keyboards confuse with Latin ones.
fn latin_lookalike(c: char) -> char {
    match c {
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'У' => 'Y',
        'Х' => 'X',
        other => other,
    }
}

/// Uppercase and replace Cyrillic look-alikes with their Latin twins.
pub(crate) fn fold(text: &str) -> String {
    text.to_uppercase().chars().map(latin_lookalike).collect()
}

fn is_digit_run_char(c: char) -> bool {
    c == 'O' || c == 'I' || c.is_ascii_digit()
}

/// Turns letters O and I into 0 and 1 where they sit inside a number.
///
/// Works on maximal runs of `O`, `I` and ASCII digits. A letter is replaced
/// when a digit follows it in the run and either a digit precedes it in the
/// run or the run starts a word. "RU000A1OO001" becomes "RU000A100001",
/// "BIO1" is left alone.
fn fix_digit_letters(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = chars.clone();
    let mut i = 0;
    while i < chars.len() {
        if !is_digit_run_char(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && is_digit_run_char(chars[i]) {
            i += 1;
        }
        let run = &chars[start..i];
        let Some(last_digit) = run.iter().rposition(|c| c.is_ascii_digit()) else {
            continue;
        };
        let word_start = start == 0 || !chars[start - 1].is_alphanumeric();
        let mut seen_digit = false;
        for (offset, &c) in run.iter().enumerate().take(last_digit) {
            if c.is_ascii_digit() {
                seen_digit = true;
            } else if seen_digit || word_start {
                out[start + offset] = if c == 'O' { '0' } else { '1' };
            }
        }
    }
    out.into_iter().collect()
}

/// Canonical uppercase form of a security name.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let folded = fold(raw);
    let cleaned = DISALLOWED.replace_all(&folded, "");
    let spaced = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let dotted = DOT_RUN.replace_all(&spaced, ".");
    let dashed = DASH_RUN.replace_all(&dotted, "-");
    let digits = fix_digit_letters(&dashed);
    let series = SERIES_PREFIX.replace_all(&digits, "BO$1");
    series
        .trim_matches(|c| c == ' ' || c == '.' || c == '-')
        .to_string()
}

/// Repairs spaced-out bond series codes in raw text.
///
/// "БО - 001Р - 02" becomes "БО-001Р-02" and "БО 07" becomes "БО-07".
/// Runs on raw input, before [`normalize`].
pub fn normalize_series(text: &str) -> String {
    let head = SERIES_HEAD.replace_all(text, "$1-$2");
    SERIES_JOIN.replace_all(&head, "$1-$2").into_owned()
}

/// Whether a line looks like a tradable security rather than cash, a
/// deposit, a metal account or a report total.
pub fn is_security_name(name: &str) -> bool {
    if name.chars().filter(|c| c.is_alphanumeric()).count() < 2 {
        return false;
    }
    let folded = fold(name);
    !DENY_TERMS.iter().any(|term| folded.contains(term.as_str()))
}

/// Maps a free-text type label to a [`SecurityType`].
pub fn normalize_security_type(raw: &str) -> Option<SecurityType> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["акци", "share", "stock", "equity"]) {
        Some(SecurityType::Share)
    } else if has(&["облига", "bond", "офз", "ofz"]) {
        Some(SecurityType::Bond)
    } else if has(&["etf", "пиф", "фонд", "fund"]) {
        Some(SecurityType::Fund)
    } else {
        None
    }
}

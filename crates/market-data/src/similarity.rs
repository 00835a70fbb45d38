//! String similarity used for fuzzy name matching.
//!
//! Matching code depends on [`SimilarityStrategy`] only, so the scoring
//! algorithm can be swapped without touching any index.

/// Scores how alike two strings are, from 0.0 (nothing shared) to 1.0 (equal).
pub trait SimilarityStrategy: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Ratcliff/Obershelp "gestalt" ratio: `2 * M / (len(a) + len(b))` where `M`
/// is the number of characters in recursively found longest common blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceRatio;

impl SimilarityStrategy for SequenceRatio {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * matched_chars(&a, &b) as f64 / total as f64
    }
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`; earliest wins ties.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let width = bhi - blo + 1;
    let mut prev = vec![0usize; width];
    let mut cur = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let idx = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[idx - 1] + 1;
                cur[idx] = k;
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            } else {
                cur[idx] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    (best_i, best_j, best_size)
}

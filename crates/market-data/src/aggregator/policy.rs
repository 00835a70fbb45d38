//! Provider-choice and merge rules.
//!
//! Candidates are ordered by provider priority before any rule runs, so the
//! outcome does not depend on the order in which answers arrived. Rule order
//! matters and is fixed:
//!
//! 1. a single candidate wins outright;
//! 2. when providers disagree on the security type and exactly one says
//!    "share", that one wins;
//! 3. when only some candidates carry a daily change percentage, the
//!    highest-priority one among them wins;
//! 4. otherwise the highest-priority candidate wins.

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;

use crate::models::{MarketSnapshot, SecurityType};

/// One provider's answer for a query.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub priority: u8,
    pub snapshot: MarketSnapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceReason {
    Single,
    ShareClassification,
    HasDailyChange,
    Priority,
}

/// The chosen snapshot plus the rest, in priority order.
#[derive(Clone, Debug)]
pub struct Choice {
    pub chosen: MarketSnapshot,
    pub others: Vec<MarketSnapshot>,
    pub reason: ChoiceReason,
}

pub fn choose(mut candidates: Vec<Candidate>) -> Option<Choice> {
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.snapshot.provider.cmp(&b.snapshot.provider))
    });

    let (index, reason) = match candidates.len() {
        0 => return None,
        1 => (0, ChoiceReason::Single),
        _ => pick(&candidates),
    };

    let chosen = candidates.remove(index).snapshot;
    debug!(
        "Chose {} for '{}' ({:?})",
        chosen.provider, chosen.secid, reason
    );
    Some(Choice {
        chosen,
        others: candidates.into_iter().map(|c| c.snapshot).collect(),
        reason,
    })
}

fn pick(candidates: &[Candidate]) -> (usize, ChoiceReason) {
    let first_type = candidates[0].snapshot.security_type;
    let types_disagree = candidates
        .iter()
        .any(|c| c.snapshot.security_type != first_type);

    if types_disagree {
        let shares: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.snapshot.security_type == SecurityType::Share)
            .map(|(i, _)| i)
            .collect();
        if let [only] = shares.as_slice() {
            return (*only, ChoiceReason::ShareClassification);
        }
    }

    let with_change = candidates
        .iter()
        .filter(|c| c.snapshot.change_day_pct.is_some())
        .count();
    if with_change > 0 && with_change < candidates.len() {
        if let Some(i) = candidates
            .iter()
            .position(|c| c.snapshot.change_day_pct.is_some())
        {
            return (i, ChoiceReason::HasDailyChange);
        }
    }

    (0, ChoiceReason::Priority)
}

/// Values that count as "missing" for backfill purposes.
trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        let t = self.trim();
        t.is_empty() || t.eq_ignore_ascii_case("none")
    }
}

impl Blank for Decimal {
    fn is_blank(&self) -> bool {
        self.is_zero()
    }
}

impl Blank for u32 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for NaiveDate {
    fn is_blank(&self) -> bool {
        false
    }
}

fn is_blank<T: Blank>(value: &Option<T>) -> bool {
    value.as_ref().map_or(true, Blank::is_blank)
}

fn backfill<T: Blank + Clone>(target: &mut Option<T>, source: &Option<T>) {
    if is_blank(target) && !is_blank(source) {
        *target = source.clone();
    }
}

/// Fills blank soft fields of `chosen` from `others`, first non-blank wins.
///
/// A populated field of `chosen` is never touched. For bonds, price and
/// volume are only taken from another provider when the chosen price is
/// itself missing or zero.
pub fn merge(mut chosen: MarketSnapshot, others: &[MarketSnapshot]) -> MarketSnapshot {
    let price_missing = is_blank(&chosen.last_price);

    for other in others {
        backfill(&mut chosen.ticker, &other.ticker);
        backfill(&mut chosen.isin, &other.isin);
        backfill(&mut chosen.name, &other.name);

        backfill(&mut chosen.currency, &other.currency);
        backfill(&mut chosen.face_value, &other.face_value);
        backfill(&mut chosen.ytm, &other.ytm);
        backfill(&mut chosen.duration, &other.duration);
        backfill(&mut chosen.aci, &other.aci);
        backfill(&mut chosen.next_coupon_date, &other.next_coupon_date);
        backfill(&mut chosen.maturity_date, &other.maturity_date);
        backfill(&mut chosen.coupon_value, &other.coupon_value);
        backfill(&mut chosen.coupon_rate, &other.coupon_rate);
        backfill(&mut chosen.coupon_frequency, &other.coupon_frequency);
        backfill(&mut chosen.rating, &other.rating);
        backfill(&mut chosen.rating_agency, &other.rating_agency);
        backfill(&mut chosen.sector, &other.sector);
        backfill(&mut chosen.next_dividend_date, &other.next_dividend_date);
        backfill(&mut chosen.dividend_value, &other.dividend_value);

        if chosen.is_bond() && price_missing {
            backfill(&mut chosen.last_price, &other.last_price);
            backfill(&mut chosen.volume, &other.volume);
        }
    }

    chosen
}

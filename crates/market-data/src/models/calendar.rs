use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A scheduled coupon payment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponEvent {
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

/// A scheduled principal repayment. The last one is the maturity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationEvent {
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

/// Upcoming cash-flow events of a bond.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondCalendar {
    pub secid: String,
    pub coupons: Vec<CouponEvent>,
    pub amortizations: Vec<AmortizationEvent>,
}

impl BondCalendar {
    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty() && self.amortizations.is_empty()
    }

    /// Drops events outside `[from, to]` and sorts the rest by date.
    pub fn within(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.coupons.retain(|c| c.date >= from && c.date <= to);
        self.amortizations.retain(|a| a.date >= from && a.date <= to);
        self.coupons.sort_by_key(|c| c.date);
        self.amortizations.sort_by_key(|a| a.date);
        self
    }

    pub fn next_coupon(&self, today: NaiveDate) -> Option<&CouponEvent> {
        self.coupons
            .iter()
            .filter(|c| c.date >= today)
            .min_by_key(|c| c.date)
    }

    pub fn maturity(&self) -> Option<NaiveDate> {
        self.amortizations.iter().map(|a| a.date).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_within_filters_and_sorts() {
        let calendar = BondCalendar {
            secid: "RU000A100001".to_string(),
            coupons: vec![
                CouponEvent { date: date(2026, 12, 1), value: Some(dec!(40.5)) },
                CouponEvent { date: date(2026, 1, 1), value: Some(dec!(40.5)) },
                CouponEvent { date: date(2026, 11, 1), value: None },
            ],
            amortizations: vec![AmortizationEvent { date: date(2030, 1, 1), value: Some(dec!(1000)) }],
        };

        let filtered = calendar.within(date(2026, 10, 17), date(2027, 10, 17));
        assert_eq!(filtered.coupons.len(), 2);
        assert_eq!(filtered.coupons[0].date, date(2026, 11, 1));
        assert!(filtered.amortizations.is_empty());
    }

    #[test]
    fn test_next_coupon_and_maturity() {
        let calendar = BondCalendar {
            secid: "X".to_string(),
            coupons: vec![
                CouponEvent { date: date(2026, 9, 1), value: None },
                CouponEvent { date: date(2026, 12, 1), value: Some(dec!(12)) },
            ],
            amortizations: vec![
                AmortizationEvent { date: date(2027, 6, 1), value: Some(dec!(500)) },
                AmortizationEvent { date: date(2028, 6, 1), value: Some(dec!(500)) },
            ],
        };

        let next = calendar.next_coupon(date(2026, 10, 17)).unwrap();
        assert_eq!(next.value, Some(dec!(12)));
        assert_eq!(calendar.maturity(), Some(date(2028, 6, 1)));
    }
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Freshness, ProviderId, SecurityType};

/// Point-in-time market data for one security.
///
/// Produced by exactly one authoritative provider (`provider`); fields that
/// provider left empty may have been backfilled from another provider's
/// answer for the same query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub secid: String,
    pub ticker: Option<String>,
    pub isin: Option<String>,
    pub name: Option<String>,
    pub security_type: SecurityType,

    pub last_price: Option<Decimal>,
    pub change_day_pct: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub trading_status: Option<String>,
    pub currency: Option<String>,

    // Bonds
    pub ytm: Option<Decimal>,
    pub duration: Option<Decimal>,
    pub aci: Option<Decimal>,
    pub face_value: Option<Decimal>,
    pub coupon_value: Option<Decimal>,
    pub coupon_rate: Option<Decimal>,
    pub coupon_frequency: Option<u32>,
    pub next_coupon_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub rating: Option<String>,
    pub rating_agency: Option<String>,

    // Shares
    pub sector: Option<String>,
    pub next_dividend_date: Option<NaiveDate>,
    pub dividend_value: Option<Decimal>,

    pub provider: ProviderId,
    pub freshness: Option<Freshness>,
    pub is_trading_open: Option<bool>,
}

impl MarketSnapshot {
    /// An empty snapshot carrying only identity.
    pub fn new(
        secid: impl Into<String>,
        security_type: SecurityType,
        provider: ProviderId,
    ) -> Self {
        Self {
            secid: secid.into(),
            ticker: None,
            isin: None,
            name: None,
            security_type,
            last_price: None,
            change_day_pct: None,
            volume: None,
            trading_status: None,
            currency: None,
            ytm: None,
            duration: None,
            aci: None,
            face_value: None,
            coupon_value: None,
            coupon_rate: None,
            coupon_frequency: None,
            next_coupon_date: None,
            maturity_date: None,
            rating: None,
            rating_agency: None,
            sector: None,
            next_dividend_date: None,
            dividend_value: None,
            provider,
            freshness: None,
            is_trading_open: None,
        }
    }

    pub fn is_bond(&self) -> bool {
        self.security_type == SecurityType::Bond
    }
}

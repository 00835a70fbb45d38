//! Wire types for the T-Bank Invest REST gateway.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::SecurityType;

/// int64 fields are sent as JSON strings by the REST gateway, but some
/// proxies re-encode them as numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Units {
    Int(i64),
    Str(String),
}

fn units_from_any<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Units::deserialize(deserializer)? {
        Units::Int(v) => Ok(v),
        Units::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Fixed-point price: `units + nano / 1e9`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Quotation {
    #[serde(default, deserialize_with = "units_from_any")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl Quotation {
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.units) + Decimal::new(i64::from(self.nano), 9)
    }
}

/// Payout amount. The currency tag is not read: snapshots are quoted in
/// rubles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoneyValue {
    #[serde(default, deserialize_with = "units_from_any")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl MoneyValue {
    pub fn to_decimal(&self) -> Decimal {
        Quotation {
            units: self.units,
            nano: self.nano,
        }
        .to_decimal()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindInstrumentRequest<'a> {
    pub query: &'a str,
    pub instrument_kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FigiListRequest<'a> {
    pub figi: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct FigiRequest<'a> {
    pub figi: &'a str,
}

#[derive(Debug, Serialize)]
pub struct FigiRangeRequest<'a> {
    pub figi: &'a str,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindInstrumentResponse {
    #[serde(default)]
    pub instruments: Vec<InstrumentShort>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentShort {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub class_code: Option<String>,
}

impl InstrumentShort {
    pub fn security_type(&self) -> SecurityType {
        security_type_of(&self.instrument_type)
    }
}

/// Instrument type names used by the gateway.
pub fn security_type_of(instrument_type: &str) -> SecurityType {
    match instrument_type.to_ascii_lowercase().as_str() {
        "bond" | "corporate_bond" | "government_bond" => SecurityType::Bond,
        "etf" | "fund" => SecurityType::Fund,
        _ => SecurityType::Share,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPricesResponse {
    #[serde(default)]
    pub last_prices: Vec<PricePoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePricesResponse {
    #[serde(default)]
    pub close_prices: Vec<PricePoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricePoint {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub price: Option<Quotation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatusResponse {
    #[serde(default)]
    pub trading_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DividendsResponse {
    #[serde(default)]
    pub dividends: Vec<Dividend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dividend {
    #[serde(default)]
    pub dividend_net: Option<MoneyValue>,
    #[serde(default)]
    pub payment_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BondCouponsResponse {
    #[serde(default, alias = "coupons")]
    pub events: Vec<Coupon>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    #[serde(default)]
    pub coupon_date: Option<String>,
    #[serde(default, alias = "couponValue")]
    pub pay_one_bond: Option<MoneyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quotation_from_string_units() {
        let q: Quotation = serde_json::from_str(r#"{"units": "301", "nano": 150000000}"#).unwrap();
        assert_eq!(q.to_decimal(), dec!(301.15));
    }

    #[test]
    fn test_quotation_from_numeric_units() {
        let q: Quotation = serde_json::from_str(r#"{"units": 98, "nano": 500000000}"#).unwrap();
        assert_eq!(q.to_decimal(), dec!(98.5));
    }

    #[test]
    fn test_negative_quotation() {
        let q: Quotation = serde_json::from_str(r#"{"units": "-1", "nano": -250000000}"#).unwrap();
        assert_eq!(q.to_decimal(), dec!(-1.25));
    }

    #[test]
    fn test_instrument_type_mapping() {
        assert_eq!(security_type_of("corporate_bond"), SecurityType::Bond);
        assert_eq!(security_type_of("government_bond"), SecurityType::Bond);
        assert_eq!(security_type_of("etf"), SecurityType::Fund);
        assert_eq!(security_type_of("share"), SecurityType::Share);
        assert_eq!(security_type_of("currency"), SecurityType::Share);
    }

    #[test]
    fn test_coupons_accept_both_field_spellings() {
        let body = r#"{"coupons": [{"couponDate": "2026-11-20T00:00:00Z", "couponValue": {"currency": "rub", "units": "40", "nano": 0}}]}"#;
        let resp: BondCouponsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.events.len(), 1);
        assert_eq!(resp.events[0].pay_one_bond.as_ref().unwrap().to_decimal(), dec!(40));
    }
}

//! MOEX ISS provider.
//!
//! Public, token-less GET API of the Moscow Exchange. Responses use the ISS
//! table format (see [`models::IssTable`]).
//!
//! # Endpoints used
//!
//! - `/securities.json?q=` - free-text search
//! - `/engines/stock/markets/{market}/boards/{board}/securities/{secid}.json` - board data
//! - `/securities/{secid}/bondization.json` - coupons and amortizations

mod models;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::errors::MarketDataError;
use crate::models::{
    AmortizationEvent, BondCalendar, CouponEvent, MarketSnapshot, ResolvedSecurity, SecurityType,
};
use crate::provider::json;
use crate::provider::MarketDataProvider;
use crate::similarity::SimilarityStrategy;

pub use models::{IssRow, IssTable, SearchHit};
use models::{BoardResponse, BondizationResponse, SearchResponse};

pub const PROVIDER_ID: &str = "MOEX_ISS";
pub const DEFAULT_BASE_URL: &str = "https://iss.moex.com/iss";

const SEARCH_LIMIT: usize = 50;

/// Minimum fuzzy score for a search hit to count as a resolution.
const MIN_MATCH_SCORE: f64 = 0.8;

const SHARE_BOARDS: &[&str] = &["TQBR"];
const FUND_BOARDS: &[&str] = &["TQTF"];
const BOND_BOARDS: &[&str] = &["TQCB", "TQOB", "TQIR", "TQOD"];

pub struct MoexIssProvider {
    client: Client,
    base_url: String,
    similarity: Arc<dyn SimilarityStrategy>,
}

impl MoexIssProvider {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        similarity: Arc<dyn SimilarityStrategy>,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            similarity,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} GET {}", PROVIDER_ID, url);

        let response = self
            .client
            .get(&url)
            .query(&[("iss.meta", "off")])
            .query(query)
            .send()
            .await
            .map_err(|e| json::transport_error(PROVIDER_ID, e))?;

        let body = json::read_body(PROVIDER_ID, response).await?;
        json::parse(PROVIDER_ID, &body)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, MarketDataError> {
        let limit = SEARCH_LIMIT.to_string();
        let response: SearchResponse = self
            .get("/securities.json", &[("q", query), ("limit", &limit)])
            .await?;
        Ok(response
            .securities
            .rows()
            .filter_map(SearchHit::from_row)
            .collect())
    }

    async fn board(
        &self,
        market: &str,
        board: &str,
        secid: &str,
    ) -> Result<BoardResponse, MarketDataError> {
        let path = format!(
            "/engines/stock/markets/{}/boards/{}/securities/{}.json",
            market, board, secid
        );
        self.get(&path, &[("iss.only", "securities,marketdata")])
            .await
    }

    /// Score of a search hit against the query, 0.0 when below the threshold.
    pub fn match_score(&self, query: &str, hit: &SearchHit) -> f64 {
        match_score(self.similarity.as_ref(), query, hit)
    }
}

pub fn match_score(similarity: &dyn SimilarityStrategy, query: &str, hit: &SearchHit) -> f64 {
    let query = query.trim().to_uppercase();
    if query.is_empty() {
        return 0.0;
    }
    let secid = hit.secid.to_uppercase();
    let shortname = hit.shortname.to_uppercase();
    let name = hit.name.to_uppercase();

    if query == secid || hit.isin.as_deref().is_some_and(|i| i.eq_ignore_ascii_case(&query)) {
        return 1.0;
    }
    if query == shortname {
        return 0.95;
    }
    if query == name {
        return 0.9;
    }
    if name.starts_with(&query) || shortname.starts_with(&query) {
        return 0.85;
    }

    let best = [&name, &shortname, &secid]
        .iter()
        .map(|candidate| similarity.similarity(&query, candidate))
        .fold(0.0, f64::max);
    if best >= MIN_MATCH_SCORE {
        best
    } else {
        0.0
    }
}

/// Highest scoring hit; the earliest wins ties.
fn best_hit(
    similarity: &dyn SimilarityStrategy,
    query: &str,
    hits: Vec<SearchHit>,
) -> Option<(f64, SearchHit)> {
    hits.into_iter()
        .map(|hit| (match_score(similarity, query, &hit), hit))
        .filter(|(score, _)| *score > 0.0)
        .fold(None, |best, (score, hit)| match best {
            Some((best_score, _)) if best_score >= score => best,
            _ => Some((score, hit)),
        })
}

fn boards_for(security_type: SecurityType) -> (&'static str, &'static [&'static str]) {
    match security_type {
        SecurityType::Share => ("shares", SHARE_BOARDS),
        SecurityType::Fund => ("shares", FUND_BOARDS),
        SecurityType::Bond => ("bonds", BOND_BOARDS),
    }
}

fn currency_code(raw: Option<String>) -> Option<String> {
    raw.map(|c| match c.to_uppercase().as_str() {
        "SUR" | "RUR" => "RUB".to_string(),
        other => other.to_string(),
    })
}

/// Builds a snapshot from one board response; `None` when the board has no market data row.
fn snapshot_from_board(
    security: &ResolvedSecurity,
    response: &BoardResponse,
) -> Option<MarketSnapshot> {
    let market = response.marketdata.first()?;
    let info = response.securities.first();
    let from_info = |column: &str| info.and_then(|row| row.get(column)).cloned();

    let mut snapshot = MarketSnapshot::new(
        security.native_id.clone(),
        security.security_type,
        PROVIDER_ID.into(),
    );
    snapshot.ticker = Some(security.native_id.clone());
    snapshot.isin = info
        .and_then(|row| row.string("ISIN"))
        .or_else(|| security.isin.clone());
    snapshot.name = info
        .and_then(|row| row.string("SHORTNAME"))
        .or_else(|| security.name.clone());

    snapshot.last_price = market.decimal("LAST").filter(|p| !p.is_zero());
    snapshot.change_day_pct = market.decimal("LASTCHANGEPRCNT");
    snapshot.trading_status = market.string("TRADINGSTATUS");
    snapshot.volume = market.decimal("VOLTODAY");
    snapshot.currency = currency_code(
        market
            .string("CURRENCYID")
            .or_else(|| info.and_then(|row| row.string("CURRENCYID")))
            .or_else(|| info.and_then(|row| row.string("FACEUNIT"))),
    );

    if security.security_type == SecurityType::Bond {
        snapshot.ytm = market.decimal("YIELD");
        snapshot.duration = market.decimal("DURATION");
        snapshot.aci = market
            .decimal("ACCRUEDINT")
            .or_else(|| from_info("ACCRUEDINT").as_ref().and_then(json::decimal));
        snapshot.face_value = from_info("FACEVALUE").as_ref().and_then(json::decimal);
        snapshot.coupon_value = from_info("COUPONVALUE").as_ref().and_then(json::decimal);
        snapshot.coupon_rate = from_info("COUPONPERCENT").as_ref().and_then(json::decimal);
        snapshot.next_coupon_date = from_info("NEXTCOUPON").as_ref().and_then(json::date);
        snapshot.maturity_date = from_info("MATDATE").as_ref().and_then(json::date);
        snapshot.coupon_frequency = from_info("COUPONPERIOD")
            .as_ref()
            .and_then(json::decimal)
            .filter(|days| *days > Decimal::ZERO)
            .and_then(|days| (Decimal::from(365) / days).round().to_u32());
    }

    Some(snapshot)
}

fn calendar_from_bondization(secid: &str, response: &BondizationResponse) -> BondCalendar {
    BondCalendar {
        secid: secid.to_string(),
        coupons: response
            .coupons
            .rows()
            .filter_map(|row| {
                Some(CouponEvent {
                    date: row.date("coupondate")?,
                    value: row.decimal("value"),
                })
            })
            .collect(),
        amortizations: response
            .amortizations
            .rows()
            .filter_map(|row| {
                Some(AmortizationEvent {
                    date: row.date("amortdate")?,
                    value: row.decimal("value"),
                })
            })
            .collect(),
    }
}

#[async_trait]
impl MarketDataProvider for MoexIssProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn resolve(&self, query: &str) -> Result<Option<ResolvedSecurity>, MarketDataError> {
        let hits = self.search(query).await?;
        let Some((score, hit)) = best_hit(self.similarity.as_ref(), query, hits) else {
            debug!("{}: no acceptable match for '{}'", PROVIDER_ID, query);
            return Ok(None);
        };
        debug!(
            "{}: '{}' resolved to {} (score {:.2})",
            PROVIDER_ID, query, hit.secid, score
        );

        let security_type = hit.security_type();
        let name = if hit.shortname.is_empty() {
            hit.name
        } else {
            hit.shortname
        };
        Ok(Some(ResolvedSecurity {
            native_id: hit.secid.clone(),
            security_type,
            ticker: Some(hit.secid),
            isin: hit.isin,
            name: Some(name).filter(|n| !n.is_empty()),
        }))
    }

    async fn snapshot(
        &self,
        security: &ResolvedSecurity,
    ) -> Result<Option<MarketSnapshot>, MarketDataError> {
        let (market, boards) = boards_for(security.security_type);

        for board in boards {
            let response = match self.board(market, board, &security.native_id).await {
                Ok(r) => r,
                Err(MarketDataError::ProviderError { message, .. }) => {
                    debug!("{}: board {} unavailable: {}", PROVIDER_ID, board, message);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(mut snapshot) = snapshot_from_board(security, &response) else {
                continue;
            };

            if snapshot.is_bond() && snapshot.next_coupon_date.is_none() {
                match self.bond_calendar(&security.native_id).await {
                    Ok(calendar) => {
                        let today = Utc::now().date_naive();
                        if let Some(next) = calendar.next_coupon(today) {
                            snapshot.next_coupon_date = Some(next.date);
                            snapshot.coupon_value = snapshot.coupon_value.or(next.value);
                        }
                        snapshot.maturity_date = snapshot.maturity_date.or(calendar.maturity());
                    }
                    Err(e) => warn!(
                        "{}: calendar lookup failed for {}: {}",
                        PROVIDER_ID, security.native_id, e
                    ),
                }
            }

            return Ok(Some(snapshot));
        }

        Ok(None)
    }

    async fn bond_calendar(&self, secid: &str) -> Result<BondCalendar, MarketDataError> {
        let path = format!("/securities/{}/bondization.json", secid);
        let response: BondizationResponse = self
            .get(&path, &[("iss.only", "coupons,amortizations")])
            .await?;
        Ok(calendar_from_bondization(secid, &response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SequenceRatio;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn hit(secid: &str, shortname: &str, name: &str) -> SearchHit {
        SearchHit {
            secid: secid.to_string(),
            shortname: shortname.to_string(),
            name: name.to_string(),
            isin: None,
            kind: Some("common_share".to_string()),
            group: None,
        }
    }

    #[test]
    fn test_match_score_tiers() {
        let s = SequenceRatio;
        let sber = hit("SBER", "Сбербанк", "Сбербанк России ПАО ао");
        assert_eq!(match_score(&s, "sber", &sber), 1.0);
        assert_eq!(match_score(&s, "СБЕРБАНК", &sber), 0.95);
        assert_eq!(match_score(&s, "Сбербанк России ПАО ао", &sber), 0.9);
        assert_eq!(match_score(&s, "Сбербанк Рос", &sber), 0.85);
        assert_eq!(match_score(&s, "Лукойл", &sber), 0.0);
        assert_eq!(match_score(&s, "   ", &sber), 0.0);
    }

    #[test]
    fn test_match_score_fuzzy_above_threshold() {
        let s = SequenceRatio;
        let gazp = hit("GAZP", "ГАЗПРОМ", "Газпром ПАО");
        let score = match_score(&s, "ГАЗПРОММ", &gazp);
        assert!(score >= MIN_MATCH_SCORE, "score was {}", score);
    }

    #[test]
    fn test_best_hit_prefers_higher_score_then_first() {
        let s = SequenceRatio;
        let hits = vec![
            hit("SBERP", "Сбербанк-п", "Сбербанк России ПАО ап"),
            hit("SBER", "Сбербанк", "Сбербанк России ПАО ао"),
        ];
        let (score, best) = best_hit(&s, "SBER", hits).unwrap();
        assert_eq!(best.secid, "SBER");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_snapshot_from_bond_board() {
        let body = r#"{
            "securities": {
                "columns": ["SECID", "SHORTNAME", "ISIN", "FACEVALUE", "COUPONVALUE", "NEXTCOUPON", "MATDATE", "COUPONPERIOD", "FACEUNIT", "ACCRUEDINT"],
                "data": [["RU000A100001", "ГазпромК1Р2", "RU000A100001", 1000, 40.64, "2026-11-20", "2029-05-18", 182, "SUR", 12.3]]
            },
            "marketdata": {
                "columns": ["SECID", "LAST", "LASTCHANGEPRCNT", "TRADINGSTATUS", "YIELD", "DURATION", "VOLTODAY"],
                "data": [["RU000A100001", 98.7, -0.12, "T", 16.42, 640, 1200]]
            }
        }"#;
        let response: BoardResponse = serde_json::from_str(body).unwrap();
        let security = ResolvedSecurity::new("RU000A100001", SecurityType::Bond);

        let snapshot = snapshot_from_board(&security, &response).unwrap();
        assert_eq!(snapshot.provider, PROVIDER_ID);
        assert_eq!(snapshot.last_price, Some(dec!(98.7)));
        assert_eq!(snapshot.change_day_pct, Some(dec!(-0.12)));
        assert_eq!(snapshot.ytm, Some(dec!(16.42)));
        assert_eq!(snapshot.aci, Some(dec!(12.3)));
        assert_eq!(snapshot.face_value, Some(dec!(1000)));
        assert_eq!(snapshot.currency.as_deref(), Some("RUB"));
        assert_eq!(snapshot.coupon_frequency, Some(2));
        assert_eq!(snapshot.next_coupon_date, NaiveDate::from_ymd_opt(2026, 11, 20));
        assert_eq!(snapshot.maturity_date, NaiveDate::from_ymd_opt(2029, 5, 18));
    }

    #[test]
    fn test_board_without_marketdata_is_none() {
        let body = r#"{"securities": {"columns": [], "data": []}, "marketdata": {"columns": ["LAST"], "data": []}}"#;
        let response: BoardResponse = serde_json::from_str(body).unwrap();
        let security = ResolvedSecurity::new("SBER", SecurityType::Share);
        assert!(snapshot_from_board(&security, &response).is_none());
    }

    #[test]
    fn test_calendar_from_bondization() {
        let body = r#"{
            "coupons": {"columns": ["isin", "coupondate", "value"], "data": [["X", "2026-11-20", 40.64], ["X", "0000-00-00", null]]},
            "amortizations": {"columns": ["isin", "amortdate", "value"], "data": [["X", "2029-05-18", 1000]]}
        }"#;
        let response: BondizationResponse = serde_json::from_str(body).unwrap();
        let calendar = calendar_from_bondization("X", &response);
        assert_eq!(calendar.coupons.len(), 1);
        assert_eq!(calendar.coupons[0].value, Some(dec!(40.64)));
        assert_eq!(calendar.maturity(), NaiveDate::from_ymd_opt(2029, 5, 18));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_resolve_sber_live() {
        let provider = MoexIssProvider::new(
            DEFAULT_BASE_URL,
            Duration::from_secs(8),
            Arc::new(SequenceRatio),
        );
        let resolved = provider.resolve("SBER").await.unwrap().unwrap();
        assert_eq!(resolved.native_id, "SBER");
        assert_eq!(resolved.security_type, SecurityType::Share);
    }
}

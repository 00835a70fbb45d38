//! T-Bank Invest REST provider.
//!
//! All calls are `POST {base}/tinkoff.public.invest.api.contract.v1.{Service}/{Method}`
//! with a JSON body, a bearer token and a fresh `X-Request-ID`.
//!
//! # Endpoints used
//!
//! - `InstrumentsService/FindInstrument` - free-text resolution
//! - `MarketDataService/GetLastPrices`, `GetClosePrices` - price and daily change
//! - `MarketDataService/GetTradingStatus`
//! - `InstrumentsService/GetDividends`, `GetBondCoupons` - upcoming payments

mod models;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::MarketDataError;
use crate::models::{BondCalendar, CouponEvent, MarketSnapshot, ResolvedSecurity, SecurityType};
use crate::provider::json;
use crate::provider::MarketDataProvider;

pub use models::{security_type_of, InstrumentShort, Quotation};
use models::{
    BondCouponsResponse, ClosePricesResponse, DividendsResponse, FigiListRequest, FigiRangeRequest,
    FigiRequest, FindInstrumentRequest, FindInstrumentResponse, LastPricesResponse,
    TradingStatusResponse,
};

pub const PROVIDER_ID: &str = "TBANK";
pub const DEFAULT_BASE_URL: &str = "https://invest-public-api.tinkoff.ru/rest";

const CONTRACT: &str = "tinkoff.public.invest.api.contract.v1";

/// How far ahead coupon and dividend schedules are requested.
const SCHEDULE_HORIZON_DAYS: i64 = 400;

pub struct TBankProvider {
    client: Client,
    base_url: String,
    token: String,
}

impl TBankProvider {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn call<B, T>(&self, service: &str, method: &str, body: &B) -> Result<T, MarketDataError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}.{}/{}", self.base_url, CONTRACT, service, method);
        debug!("{} POST {}", PROVIDER_ID, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("X-Request-ID", Uuid::new_v4().to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| json::transport_error(PROVIDER_ID, e))?;

        let body = json::read_body(PROVIDER_ID, response).await?;
        json::parse(PROVIDER_ID, &body)
    }

    async fn find_instrument(&self, query: &str) -> Result<Vec<InstrumentShort>, MarketDataError> {
        let request = FindInstrumentRequest {
            query,
            instrument_kind: "INSTRUMENT_TYPE_UNSPECIFIED",
        };
        let response: FindInstrumentResponse = self
            .call("InstrumentsService", "FindInstrument", &request)
            .await?;
        Ok(response.instruments)
    }

    async fn last_price(&self, figi: &str) -> Result<Option<Decimal>, MarketDataError> {
        let response: LastPricesResponse = self
            .call(
                "MarketDataService",
                "GetLastPrices",
                &FigiListRequest { figi: vec![figi] },
            )
            .await?;
        Ok(first_price(response.last_prices.iter().map(|p| (&p.figi, &p.price)), figi))
    }

    async fn close_price(&self, figi: &str) -> Result<Option<Decimal>, MarketDataError> {
        let response: ClosePricesResponse = self
            .call(
                "MarketDataService",
                "GetClosePrices",
                &FigiListRequest { figi: vec![figi] },
            )
            .await?;
        Ok(first_price(response.close_prices.iter().map(|p| (&p.figi, &p.price)), figi))
    }

    async fn trading_status(&self, figi: &str) -> Result<Option<String>, MarketDataError> {
        let response: TradingStatusResponse = self
            .call("MarketDataService", "GetTradingStatus", &FigiRequest { figi })
            .await?;
        Ok(response.trading_status.filter(|s| !s.is_empty()))
    }

    async fn coupons(&self, figi: &str, from: NaiveDate) -> Result<Vec<CouponEvent>, MarketDataError> {
        let response: BondCouponsResponse = self
            .call("InstrumentsService", "GetBondCoupons", &range_request(figi, from))
            .await?;
        Ok(response
            .events
            .iter()
            .filter_map(|c| {
                let date = c.coupon_date.as_deref().and_then(parse_timestamp_date)?;
                Some(CouponEvent {
                    date,
                    value: c.pay_one_bond.as_ref().map(|m| m.to_decimal()),
                })
            })
            .collect())
    }

    async fn next_dividend(
        &self,
        figi: &str,
        from: NaiveDate,
    ) -> Result<Option<(NaiveDate, Option<Decimal>)>, MarketDataError> {
        let response: DividendsResponse = self
            .call("InstrumentsService", "GetDividends", &range_request(figi, from))
            .await?;
        Ok(response
            .dividends
            .iter()
            .filter_map(|d| {
                let date = d.payment_date.as_deref().and_then(parse_timestamp_date)?;
                (date >= from).then(|| (date, d.dividend_net.as_ref().map(|m| m.to_decimal())))
            })
            .min_by_key(|(date, _)| *date))
    }
}

fn range_request(figi: &str, from: NaiveDate) -> FigiRangeRequest<'_> {
    let to = from + chrono::Duration::days(SCHEDULE_HORIZON_DAYS);
    FigiRangeRequest {
        figi,
        from: format!("{}T00:00:00Z", from),
        to: format!("{}T00:00:00Z", to),
    }
}

fn parse_timestamp_date(text: &str) -> Option<NaiveDate> {
    json::date(&serde_json::Value::String(text.to_string()))
}

fn first_price<'a>(
    prices: impl Iterator<Item = (&'a String, &'a Option<Quotation>)>,
    figi: &str,
) -> Option<Decimal> {
    prices
        .filter(|(f, _)| f.is_empty() || f.as_str() == figi)
        .find_map(|(_, price)| price.as_ref().map(Quotation::to_decimal))
        .filter(|p| !p.is_zero())
}

/// Picks the instrument whose ticker or ISIN equals the query, else the first hit.
fn pick_instrument(query: &str, instruments: Vec<InstrumentShort>) -> Option<InstrumentShort> {
    let wanted = query.trim().to_uppercase();
    let exact = instruments.iter().position(|i| {
        i.ticker.eq_ignore_ascii_case(&wanted)
            || i
                .isin
                .as_deref()
                .is_some_and(|isin| isin.eq_ignore_ascii_case(&wanted))
    });
    match exact {
        Some(idx) => instruments.into_iter().nth(idx),
        None => instruments.into_iter().next(),
    }
}

/// Daily change in percent from last and previous close, rounded to 4 places.
pub fn change_pct(last: Option<Decimal>, close: Option<Decimal>) -> Option<Decimal> {
    match (last, close) {
        (Some(last), Some(close)) if close > Decimal::ZERO => {
            Some(((last / close - Decimal::ONE) * Decimal::ONE_HUNDRED).round_dp(4))
        }
        _ => None,
    }
}

fn base_snapshot(security: &ResolvedSecurity) -> MarketSnapshot {
    let secid = security
        .ticker
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| security.native_id.clone());
    let mut snapshot = MarketSnapshot::new(secid, security.security_type, PROVIDER_ID.into());
    snapshot.ticker = security.ticker.clone();
    snapshot.isin = security.isin.clone();
    snapshot.name = security.name.clone();
    snapshot.currency = Some("RUB".to_string());
    snapshot
}

#[async_trait]
impl MarketDataProvider for TBankProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn resolve(&self, query: &str) -> Result<Option<ResolvedSecurity>, MarketDataError> {
        let instruments = self.find_instrument(query).await?;
        let Some(instrument) = pick_instrument(query, instruments) else {
            debug!("{}: nothing found for '{}'", PROVIDER_ID, query);
            return Ok(None);
        };
        if instrument.figi.is_empty() {
            return Ok(None);
        }

        let security_type = instrument.security_type();
        Ok(Some(ResolvedSecurity {
            native_id: instrument.figi,
            security_type,
            ticker: Some(instrument.ticker).filter(|t| !t.is_empty()),
            isin: instrument.isin.filter(|i| !i.is_empty()),
            name: Some(instrument.name).filter(|n| !n.is_empty()),
        }))
    }

    async fn snapshot(
        &self,
        security: &ResolvedSecurity,
    ) -> Result<Option<MarketSnapshot>, MarketDataError> {
        let figi = security.native_id.as_str();
        let today = Utc::now().date_naive();

        let (last, close, status) = futures::join!(
            self.last_price(figi),
            self.close_price(figi),
            self.trading_status(figi)
        );

        // Without a last price there is nothing worth returning.
        let last = last?;
        let close = close.unwrap_or_else(|e| {
            warn!("{}: close price failed for {}: {}", PROVIDER_ID, figi, e);
            None
        });
        let status = status.unwrap_or_else(|e| {
            warn!("{}: trading status failed for {}: {}", PROVIDER_ID, figi, e);
            None
        });

        let mut snapshot = base_snapshot(security);
        snapshot.last_price = last;
        snapshot.change_day_pct = change_pct(last, close);
        snapshot.trading_status = status;

        match security.security_type {
            SecurityType::Bond => match self.coupons(figi, today).await {
                Ok(coupons) => {
                    let calendar = BondCalendar {
                        secid: snapshot.secid.clone(),
                        coupons,
                        amortizations: Vec::new(),
                    };
                    if let Some(next) = calendar.next_coupon(today) {
                        snapshot.next_coupon_date = Some(next.date);
                        snapshot.coupon_value = next.value;
                    }
                }
                Err(e) => warn!("{}: coupons failed for {}: {}", PROVIDER_ID, figi, e),
            },
            SecurityType::Share => match self.next_dividend(figi, today).await {
                Ok(Some((date, value))) => {
                    snapshot.next_dividend_date = Some(date);
                    snapshot.dividend_value = value;
                }
                Ok(None) => {}
                Err(e) => warn!("{}: dividends failed for {}: {}", PROVIDER_ID, figi, e),
            },
            SecurityType::Fund => {}
        }

        Ok(Some(snapshot))
    }

    async fn bond_calendar(&self, secid: &str) -> Result<BondCalendar, MarketDataError> {
        let security = self
            .resolve(secid)
            .await?
            .ok_or_else(|| MarketDataError::SymbolNotFound(secid.to_string()))?;
        let coupons = self
            .coupons(&security.native_id, Utc::now().date_naive())
            .await?;
        Ok(BondCalendar {
            secid: secid.to_string(),
            coupons,
            amortizations: Vec::new(),
        })
    }
}

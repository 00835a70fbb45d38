//! Concurrent fan-out over all providers with a deterministic merge.
//!
//! For a query the aggregator:
//! 1. returns the cached snapshot if there is one;
//! 2. asks every enabled provider at once, each under its own timeout;
//! 3. picks one answer with [`policy::choose`] and backfills it from the
//!    others with [`policy::merge`];
//! 4. tags freshness from the trading calendar and caches the result.
//!
//! Provider failures never escape: an error, a timeout or an open circuit
//! all mean "no data from that provider". If nobody has data the result
//! is `None`.

mod circuit_breaker;
mod diagnostics;
pub mod policy;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use diagnostics::{AttemptOutcome, FetchDiagnostics, ProviderAttempt};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use log::{debug, warn};

use crate::cache::{Clock, TtlCache};
use crate::errors::MarketDataError;
use crate::models::{BondCalendar, MarketSnapshot};
use crate::provider::MarketDataProvider;
use crate::trading_hours::calendar_for;
use policy::Candidate;

const SNAPSHOT_PREFIX: &str = "snapshot:";
const CALENDAR_PREFIX: &str = "calendar:";

/// Read access to aggregated market data.
///
/// The resolution pipeline depends on this rather than on the concrete
/// aggregator.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Snapshot for one free-text query, `None` when no provider has data.
    async fn get_snapshot_for(&self, query: &str) -> Option<MarketSnapshot>;

    /// Snapshots for many queries, in input order.
    async fn get_snapshots(&self, queries: &[String]) -> Vec<Option<MarketSnapshot>> {
        let mut out = Vec::with_capacity(queries.len());
        for query in queries {
            out.push(self.get_snapshot_for(query).await);
        }
        out
    }

    /// Upcoming coupons and amortizations of a bond.
    async fn get_bond_calendar(&self, secid: &str) -> Option<BondCalendar>;
}

#[derive(Clone, Debug)]
pub struct AggregatorOptions {
    /// Upper bound for one provider's resolve + snapshot round trip.
    pub provider_timeout: Duration,
    pub quote_ttl: Duration,
    pub calendar_ttl: Duration,
    /// Calendar events further out than this are dropped.
    pub calendar_horizon_days: u32,
    /// Queries in flight at once for batch lookups.
    pub concurrency: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(8),
            quote_ttl: Duration::from_secs(60),
            calendar_ttl: Duration::from_secs(3600),
            calendar_horizon_days: 365,
            concurrency: 10,
        }
    }
}

async fn resolve_and_fetch(
    provider: &dyn MarketDataProvider,
    query: &str,
) -> Result<Option<MarketSnapshot>, MarketDataError> {
    match provider.resolve(query).await? {
        Some(security) => provider.snapshot(&security).await,
        None => Ok(None),
    }
}

/// Upper-cased, whitespace-collapsed form used as the cache identity of a query.
pub fn canonical_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

type InFlightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Holder of one query's lock. The map entry goes away with its last
/// holder, including callers dropped while waiting.
struct InFlight<'a> {
    map: &'a InFlightMap,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map and this holder still reference it.
        let last = map
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) <= 2);
        if last {
            map.remove(&self.key);
        }
    }
}

pub struct MarketDataAggregator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: Arc<TtlCache>,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    options: AggregatorOptions,
    in_flight: InFlightMap,
}

impl MarketDataAggregator {
    pub fn new(
        mut providers: Vec<Arc<dyn MarketDataProvider>>,
        cache: Arc<TtlCache>,
        clock: Arc<dyn Clock>,
        breaker: Arc<CircuitBreaker>,
        options: AggregatorOptions,
    ) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            providers,
            cache,
            clock,
            breaker,
            options,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Returns the per-key lock that serializes fan-outs for one query.
    fn query_lock(&self, key: &str) -> InFlight<'_> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        let lock = in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        InFlight {
            map: &self.in_flight,
            key: key.to_string(),
            lock,
        }
    }

    async fn ask(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        query: &str,
    ) -> (AttemptOutcome, Option<Candidate>) {
        let id = provider.id();
        if !self.breaker.is_allowed(id) {
            return (AttemptOutcome::CircuitOpen, None);
        }

        let round_trip = resolve_and_fetch(provider.as_ref(), query);
        match tokio::time::timeout(self.options.provider_timeout, round_trip).await {
            Err(_) => {
                warn!("{} timed out for '{}'", id, query);
                self.breaker.record_failure(id);
                (AttemptOutcome::TimedOut, None)
            }
            Ok(Err(e)) => {
                warn!("{} failed for '{}': {}", id, query, e);
                if e.retry_class().penalizes() {
                    self.breaker.record_failure(id);
                }
                (AttemptOutcome::Error(e.to_string()), None)
            }
            Ok(Ok(None)) => {
                self.breaker.record_success(id);
                (AttemptOutcome::NotFound, None)
            }
            Ok(Ok(Some(snapshot))) => {
                self.breaker.record_success(id);
                let candidate = Candidate {
                    priority: provider.priority(),
                    snapshot,
                };
                (AttemptOutcome::Data, Some(candidate))
            }
        }
    }

    async fn fetch(&self, query: &str) -> Option<MarketSnapshot> {
        let answers = join_all(self.providers.iter().map(|p| self.ask(p, query))).await;

        let mut diagnostics = FetchDiagnostics::new();
        let mut candidates = Vec::new();
        for (provider, (outcome, candidate)) in self.providers.iter().zip(answers) {
            diagnostics.record(provider.id().into(), outcome);
            candidates.extend(candidate);
        }
        debug!("Fan-out for '{}': {}", query, diagnostics.summary());

        let choice = policy::choose(candidates)?;
        let mut snapshot = policy::merge(choice.chosen, &choice.others);

        let now = self.clock.now();
        let calendar = calendar_for(&snapshot.provider);
        snapshot.freshness = Some(calendar.freshness_at(now));
        snapshot.is_trading_open = Some(calendar.is_open(now));
        Some(snapshot)
    }

    /// Snapshot for `query`, served from cache when possible.
    pub async fn snapshot_for(&self, query: &str) -> Option<MarketSnapshot> {
        let canonical = canonical_query(query);
        if canonical.is_empty() {
            return None;
        }
        let key = format!("{}{}", SNAPSHOT_PREFIX, canonical);

        if let Some(hit) = self.cache.get::<MarketSnapshot>(&key) {
            debug!("Cache hit for '{}'", canonical);
            return Some(hit);
        }

        let in_flight = self.query_lock(&key);
        let result = {
            let _guard = in_flight.lock.lock().await;
            // Another task may have filled it while we waited.
            match self.cache.get::<MarketSnapshot>(&key) {
                Some(hit) => Some(hit),
                None => {
                    let fetched = self.fetch(query.trim()).await;
                    if let Some(snapshot) = &fetched {
                        self.cache.set(&key, snapshot, Some(self.options.quote_ttl));
                    }
                    fetched
                }
            }
        };
        result
    }

    /// Snapshots for many queries with bounded concurrency, in input order.
    pub async fn snapshots_for(&self, queries: &[String]) -> Vec<Option<MarketSnapshot>> {
        stream::iter(queries.to_vec())
            .map(|q| async move { self.snapshot_for(&q).await })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Bond calendar from the first provider (by priority) that has one,
    /// restricted to `[today, today + horizon]`.
    pub async fn bond_calendar(&self, secid: &str) -> Option<BondCalendar> {
        let secid = secid.trim().to_uppercase();
        if secid.is_empty() {
            return None;
        }
        let key = format!("{}{}", CALENDAR_PREFIX, secid);
        if let Some(hit) = self.cache.get::<BondCalendar>(&key) {
            return Some(hit);
        }

        let today = self.clock.now().date_naive();
        let horizon = today + chrono::Duration::days(i64::from(self.options.calendar_horizon_days));

        for provider in &self.providers {
            let id = provider.id();
            if !self.breaker.is_allowed(id) {
                continue;
            }
            match tokio::time::timeout(self.options.provider_timeout, provider.bond_calendar(&secid))
                .await
            {
                Ok(Ok(calendar)) if !calendar.is_empty() => {
                    self.breaker.record_success(id);
                    let calendar = calendar.within(today, horizon);
                    self.cache
                        .set(&key, &calendar, Some(self.options.calendar_ttl));
                    return Some(calendar);
                }
                Ok(Ok(_)) => debug!("{}: empty calendar for {}", id, secid),
                Ok(Err(e)) => {
                    debug!("{}: calendar for {} failed: {}", id, secid, e);
                    if e.retry_class().penalizes() {
                        self.breaker.record_failure(id);
                    }
                }
                Err(_) => {
                    warn!("{}: calendar for {} timed out", id, secid);
                    self.breaker.record_failure(id);
                }
            }
        }

        None
    }
}

#[async_trait]
impl SnapshotSource for MarketDataAggregator {
    async fn get_snapshot_for(&self, query: &str) -> Option<MarketSnapshot> {
        self.snapshot_for(query).await
    }

    async fn get_snapshots(&self, queries: &[String]) -> Vec<Option<MarketSnapshot>> {
        self.snapshots_for(queries).await
    }

    async fn get_bond_calendar(&self, secid: &str) -> Option<BondCalendar> {
        self.bond_calendar(secid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::models::{CouponEvent, Freshness, ResolvedSecurity, SecurityType};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Behaviour {
        Answer(MarketSnapshot),
        Nothing,
        Fail,
        Hang,
    }

    struct FakeProvider {
        id: &'static str,
        priority: u8,
        behaviour: Behaviour,
        calendar: Option<BondCalendar>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeProvider {
        fn new(id: &'static str, priority: u8, behaviour: Behaviour) -> Self {
            Self {
                id,
                priority,
                behaviour,
                calendar: None,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn resolve(&self, query: &str) -> Result<Option<ResolvedSecurity>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.behaviour {
                Behaviour::Answer(s) => Ok(Some(ResolvedSecurity::new(query, s.security_type))),
                Behaviour::Nothing => Ok(None),
                Behaviour::Fail => Err(MarketDataError::RateLimited {
                    provider: self.id.to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }
            }
        }

        async fn snapshot(
            &self,
            _security: &ResolvedSecurity,
        ) -> Result<Option<MarketSnapshot>, MarketDataError> {
            match &self.behaviour {
                Behaviour::Answer(s) => Ok(Some(s.clone())),
                _ => Ok(None),
            }
        }

        async fn bond_calendar(&self, secid: &str) -> Result<BondCalendar, MarketDataError> {
            match &self.calendar {
                Some(c) => Ok(c.clone()),
                None => Err(MarketDataError::NotSupported {
                    provider: self.id.to_string(),
                    operation: format!("bond_calendar({})", secid),
                }),
            }
        }
    }

    fn snapshot(provider: &'static str, kind: SecurityType) -> MarketSnapshot {
        MarketSnapshot::new("SBER", kind, provider.into())
    }

    fn clock() -> Arc<ManualClock> {
        // Wednesday 12:00 Moscow time
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()))
    }

    fn aggregator(
        providers: Vec<Arc<FakeProvider>>,
        clock: Arc<ManualClock>,
    ) -> MarketDataAggregator {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), clock.clone()));
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
            clock.clone(),
        ));
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn MarketDataProvider>)
            .collect();
        MarketDataAggregator::new(
            providers,
            cache,
            clock,
            breaker,
            AggregatorOptions {
                provider_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_canonical_query() {
        assert_eq!(canonical_query("  Сбербанк   пао "), "СБЕРБАНК ПАО");
        assert_eq!(canonical_query("   "), "");
    }

    #[tokio::test]
    async fn test_single_provider_answer_is_tagged_live() {
        let mut s = snapshot("TBANK", SecurityType::Share);
        s.last_price = Some(dec!(301.5));
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Answer(s)));
        let moex = Arc::new(FakeProvider::new("MOEX_ISS", 2, Behaviour::Nothing));
        let agg = aggregator(vec![tbank, moex], clock());

        let result = agg.snapshot_for("SBER").await.unwrap();
        assert_eq!(result.provider, "TBANK");
        assert_eq!(result.last_price, Some(dec!(301.5)));
        assert_eq!(result.freshness, Some(Freshness::Live));
        assert_eq!(result.is_trading_open, Some(true));
    }

    #[tokio::test]
    async fn test_after_hours_is_last_close() {
        let clock = clock();
        clock.set(Utc.with_ymd_and_hms(2026, 10, 14, 19, 0, 0).unwrap());
        let tbank = Arc::new(FakeProvider::new(
            "TBANK",
            1,
            Behaviour::Answer(snapshot("TBANK", SecurityType::Share)),
        ));
        let agg = aggregator(vec![tbank], clock);

        let result = agg.snapshot_for("SBER").await.unwrap();
        assert_eq!(result.freshness, Some(Freshness::LastClose));
    }

    #[tokio::test]
    async fn test_share_beats_bond_and_backfills() {
        let mut tbank_snap = snapshot("TBANK", SecurityType::Bond);
        tbank_snap.change_day_pct = Some(dec!(0.3));
        tbank_snap.currency = Some("RUB".to_string());
        let mut moex_snap = snapshot("MOEX_ISS", SecurityType::Share);
        moex_snap.last_price = Some(dec!(300));

        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Answer(tbank_snap)));
        let moex = Arc::new(FakeProvider::new("MOEX_ISS", 2, Behaviour::Answer(moex_snap)));
        let agg = aggregator(vec![tbank, moex], clock());

        let result = agg.snapshot_for("SBER").await.unwrap();
        assert_eq!(result.security_type, SecurityType::Share);
        assert_eq!(result.provider, "MOEX_ISS");
        assert_eq!(result.currency.as_deref(), Some("RUB"));
        assert_eq!(result.last_price, Some(dec!(300)));
    }

    #[tokio::test]
    async fn test_all_providers_failing_yields_none() {
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Fail));
        let moex = Arc::new(FakeProvider::new("MOEX_ISS", 2, Behaviour::Hang));
        let agg = aggregator(vec![tbank, moex], clock());

        assert!(agg.snapshot_for("SBER").await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_does_not_block_other_provider() {
        let moex = Arc::new(FakeProvider::new(
            "MOEX_ISS",
            2,
            Behaviour::Answer(snapshot("MOEX_ISS", SecurityType::Bond)),
        ));
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Hang));
        let agg = aggregator(vec![tbank, moex], clock());

        let result = agg.snapshot_for("RU000A100001").await.unwrap();
        assert_eq!(result.provider, "MOEX_ISS");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers_until_ttl() {
        let clock = clock();
        let tbank = Arc::new(FakeProvider::new(
            "TBANK",
            1,
            Behaviour::Answer(snapshot("TBANK", SecurityType::Share)),
        ));
        let agg = aggregator(vec![tbank.clone()], clock.clone());

        agg.snapshot_for("sber").await.unwrap();
        agg.snapshot_for("  SBER ").await.unwrap();
        assert_eq!(tbank.calls(), 1);

        clock.advance(chrono::Duration::seconds(61));
        agg.snapshot_for("SBER").await.unwrap();
        assert_eq!(tbank.calls(), 2);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Nothing));
        let agg = aggregator(vec![tbank.clone()], clock());

        assert!(agg.snapshot_for("XXXX").await.is_none());
        assert!(agg.snapshot_for("XXXX").await.is_none());
        assert_eq!(tbank.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_queries_share_one_fan_out() {
        let mut slow = FakeProvider::new(
            "TBANK",
            1,
            Behaviour::Answer(snapshot("TBANK", SecurityType::Share)),
        );
        slow.delay = Duration::from_millis(30);
        let tbank = Arc::new(slow);
        let agg = aggregator(vec![tbank.clone()], clock());

        let (a, b, c) = tokio::join!(
            agg.snapshot_for("SBER"),
            agg.snapshot_for("sber"),
            agg.snapshot_for("SBER")
        );
        assert!(a.is_some() && b.is_some() && c.is_some());
        assert_eq!(tbank.calls(), 1);
        assert!(agg.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_query_leaves_no_lock_behind() {
        let mut slow = FakeProvider::new(
            "TBANK",
            1,
            Behaviour::Answer(snapshot("TBANK", SecurityType::Share)),
        );
        slow.delay = Duration::from_millis(50);
        let agg = aggregator(vec![Arc::new(slow)], clock());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(5), agg.snapshot_for("SBER")).await;
        assert!(abandoned.is_err());
        assert!(agg.in_flight.lock().unwrap().is_empty());

        assert!(agg.snapshot_for("SBER").await.is_some());
        assert!(agg.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let tbank = Arc::new(FakeProvider::new(
            "TBANK",
            1,
            Behaviour::Answer(snapshot("TBANK", SecurityType::Share)),
        ));
        let agg = aggregator(vec![tbank], clock());

        let queries = vec!["SBER".to_string(), "   ".to_string(), "GAZP".to_string()];
        let results = agg.get_snapshots(&queries).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_some());
    }

    #[tokio::test]
    async fn test_failing_provider_gets_circuit_opened() {
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Fail));
        let agg = aggregator(vec![tbank.clone()], clock());

        agg.snapshot_for("A").await;
        agg.snapshot_for("B").await;
        agg.snapshot_for("C").await;
        assert_eq!(tbank.calls(), 2, "third query skipped by open circuit");
    }

    #[tokio::test]
    async fn test_bond_calendar_filtered_and_cached() {
        let day = |m, d| NaiveDate::from_ymd_opt(2026, m, d).unwrap();
        let mut moex = FakeProvider::new("MOEX_ISS", 2, Behaviour::Nothing);
        moex.calendar = Some(BondCalendar {
            secid: "RU000A100001".to_string(),
            coupons: vec![
                CouponEvent { date: day(9, 1), value: Some(dec!(40)) },
                CouponEvent { date: day(11, 20), value: Some(dec!(40)) },
            ],
            amortizations: Vec::new(),
        });
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Nothing));
        let agg = aggregator(vec![tbank, Arc::new(moex)], clock());

        let calendar = agg.get_bond_calendar("ru000a100001").await.unwrap();
        assert_eq!(calendar.coupons.len(), 1);
        assert_eq!(calendar.coupons[0].date, day(11, 20));

        let again = agg.bond_calendar("RU000A100001").await.unwrap();
        assert_eq!(again, calendar);
    }

    #[tokio::test]
    async fn test_bond_calendar_none_when_unsupported() {
        let tbank = Arc::new(FakeProvider::new("TBANK", 1, Behaviour::Nothing));
        let agg = aggregator(vec![tbank], clock());
        assert!(agg.bond_calendar("RU000A100001").await.is_none());
    }
}

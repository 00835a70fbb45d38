//! Shared fixtures: table-driven providers, an aggregator on a manual
//! clock and an in-memory holdings store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use radar_market_data::aggregator::{CircuitBreaker, CircuitBreakerConfig};
use radar_market_data::{
    AggregatorOptions, Clock, ManualClock, MarketDataAggregator, MarketDataError,
    MarketDataProvider, MarketSnapshot, ResolvedSecurity, SecurityType, SequenceRatio, TtlCache,
};

use radar_core::ingest::{HoldingsStore, UpsertOutcome};
use radar_core::reference::{ReferenceCatalog, DEFAULT_FUZZY_THRESHOLD};
use radar_core::{CashLine, CoreError, ResolvedPosition, Result};

/// Answers queries found in its table, case-insensitively.
pub struct TableProvider {
    id: &'static str,
    priority: u8,
    table: HashMap<String, MarketSnapshot>,
    failing: bool,
    calls: AtomicUsize,
}

impl TableProvider {
    pub fn new(id: &'static str, priority: u8) -> Self {
        Self {
            id,
            priority,
            table: HashMap::new(),
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails, as during an outage.
    pub fn failing(id: &'static str, priority: u8) -> Self {
        Self {
            failing: true,
            ..Self::new(id, priority)
        }
    }

    pub fn answer(mut self, query: &str, snapshot: MarketSnapshot) -> Self {
        self.table.insert(query.to_uppercase(), snapshot);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A snapshot as `provider` would report it.
pub fn snapshot(provider: &'static str, secid: &str, security_type: SecurityType) -> MarketSnapshot {
    let mut snapshot = MarketSnapshot::new(secid, security_type, provider.into());
    snapshot.ticker = Some(secid.to_string());
    snapshot
}

#[async_trait]
impl MarketDataProvider for TableProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn resolve(&self, query: &str) -> std::result::Result<Option<ResolvedSecurity>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(MarketDataError::provider(self.id, "HTTP error: 503"));
        }
        let key = query.trim().to_uppercase();
        Ok(self
            .table
            .get(&key)
            .map(|s| ResolvedSecurity::new(key.clone(), s.security_type)))
    }

    async fn snapshot(
        &self,
        security: &ResolvedSecurity,
    ) -> std::result::Result<Option<MarketSnapshot>, MarketDataError> {
        Ok(self.table.get(&security.native_id).cloned())
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    // A Wednesday, mid-session in Moscow.
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap(),
    ))
}

pub fn aggregator(providers: Vec<Arc<dyn MarketDataProvider>>) -> Arc<MarketDataAggregator> {
    let clock: Arc<dyn Clock> = manual_clock();
    let cache = Arc::new(TtlCache::new(Duration::from_secs(60), clock.clone()));
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::default(),
        clock.clone(),
    ));
    let options = AggregatorOptions {
        provider_timeout: Duration::from_secs(2),
        quote_ttl: Duration::from_secs(60),
        calendar_ttl: Duration::from_secs(3600),
        calendar_horizon_days: 365,
        concurrency: 4,
    };
    Arc::new(MarketDataAggregator::new(
        providers, cache, clock, breaker, options,
    ))
}

pub fn builtin_catalog() -> Arc<ReferenceCatalog> {
    Arc::new(ReferenceCatalog::builtin(
        Arc::new(SequenceRatio),
        DEFAULT_FUZZY_THRESHOLD,
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredHolding {
    pub position: ResolvedPosition,
    pub active: bool,
}

type AccountKey = (String, String);

/// Holdings keyed by user, account and normalized key.
#[derive(Default)]
pub struct InMemoryHoldingsStore {
    holdings: Mutex<HashMap<AccountKey, Vec<StoredHolding>>>,
    cash: Mutex<HashMap<AccountKey, Vec<CashLine>>>,
    pub fail_writes: bool,
}

impl InMemoryHoldingsStore {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn holdings(&self, user_id: &str, account_id: &str) -> Vec<StoredHolding> {
        self.holdings
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), account_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_keys(&self, user_id: &str, account_id: &str) -> Vec<String> {
        self.holdings(user_id, account_id)
            .into_iter()
            .filter(|h| h.active)
            .map(|h| h.position.normalized_key)
            .collect()
    }

    pub fn cash(&self, user_id: &str, account_id: &str) -> Vec<CashLine> {
        self.cash
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), account_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HoldingsStore for InMemoryHoldingsStore {
    async fn upsert_holding(
        &self,
        user_id: &str,
        account_id: &str,
        position: &ResolvedPosition,
    ) -> Result<UpsertOutcome> {
        if self.fail_writes {
            return Err(CoreError::Storage("database is locked".to_string()));
        }
        let mut holdings = self.holdings.lock().unwrap();
        let account = holdings
            .entry((user_id.to_string(), account_id.to_string()))
            .or_default();
        match account
            .iter_mut()
            .find(|h| h.position.normalized_key == position.normalized_key)
        {
            Some(existing) => {
                existing.position = position.clone();
                existing.active = true;
                Ok(UpsertOutcome::Merged)
            }
            None => {
                account.push(StoredHolding {
                    position: position.clone(),
                    active: true,
                });
                Ok(UpsertOutcome::Added)
            }
        }
    }

    async fn deactivate_missing(
        &self,
        user_id: &str,
        account_id: &str,
        keep_keys: &[String],
    ) -> Result<usize> {
        let mut holdings = self.holdings.lock().unwrap();
        let Some(account) = holdings.get_mut(&(user_id.to_string(), account_id.to_string())) else {
            return Ok(0);
        };
        let mut deactivated = 0;
        for holding in account.iter_mut() {
            if holding.active && !keep_keys.contains(&holding.position.normalized_key) {
                holding.active = false;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    async fn replace_cash(&self, user_id: &str, account_id: &str, cash: &[CashLine]) -> Result<()> {
        self.cash
            .lock()
            .unwrap()
            .insert((user_id.to_string(), account_id.to_string()), cash.to_vec());
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info};

use super::ingest_model::IngestReport;
use super::ingest_traits::{HoldingsStore, IngestServiceTrait};
use crate::errors::Result;
use crate::pipeline::ResolutionServiceTrait;
use crate::positions::{AccountPositions, ResolvedPosition};

type UserLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Writes resolved statements into the host's holdings store.
///
/// At most one ingest per user runs at a time, so two uploads from the
/// same user never interleave their writes.
pub struct IngestService {
    resolver: Arc<dyn ResolutionServiceTrait>,
    store: Arc<dyn HoldingsStore>,
    user_locks: UserLocks,
}

/// A user's lock, removed from the map once nobody holds or waits on it.
struct UserLock<'a> {
    locks: &'a UserLocks,
    user_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let idle = locks.get(&self.user_id).is_some_and(|entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) <= 2
        });
        if idle {
            locks.remove(&self.user_id);
        }
    }
}

impl IngestService {
    pub fn new(resolver: Arc<dyn ResolutionServiceTrait>, store: Arc<dyn HoldingsStore>) -> Self {
        Self {
            resolver,
            store,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: &str) -> UserLock<'_> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|p| p.into_inner());
        let lock = locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        UserLock {
            locks: &self.user_locks,
            user_id: user_id.to_string(),
            lock,
        }
    }
}

#[async_trait]
impl IngestServiceTrait for IngestService {
    async fn ingest(&self, user_id: &str, accounts: Vec<AccountPositions>) -> Result<IngestReport> {
        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock.lock().await;

        let batch = self.resolver.resolve_batch(accounts).await;
        let mut report = IngestReport {
            accounts: batch.accounts.len(),
            counts: batch.counts,
            ..IngestReport::default()
        };

        for account in &batch.accounts {
            for position in &account.positions {
                let outcome = self
                    .store
                    .upsert_holding(user_id, &account.account_id, position)
                    .await?;
                report.record(outcome);
            }
            let keep: Vec<String> = account
                .positions
                .iter()
                .map(|p| p.normalized_key.clone())
                .collect();
            report.deactivated += self
                .store
                .deactivate_missing(user_id, &account.account_id, &keep)
                .await?;
            self.store
                .replace_cash(user_id, &account.account_id, &account.cash)
                .await?;
            report.cash_lines += account.cash.len();
            debug!(
                "Stored account {} for user {}: {} holdings, {} cash lines",
                account.account_id,
                user_id,
                account.positions.len(),
                account.cash.len()
            );
        }

        info!(
            "Ingested {} accounts for user {}: {} added, {} merged, {} deactivated",
            report.accounts, user_id, report.added, report.merged, report.deactivated
        );
        Ok(report)
    }

    async fn add_manual_ticker(
        &self,
        user_id: &str,
        account_id: &str,
        ticker: &str,
    ) -> Result<Option<ResolvedPosition>> {
        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock.lock().await;

        let Some(position) = self.resolver.resolve_manual_ticker(ticker, None).await? else {
            info!("Manual ticker {:?} not found for user {}", ticker, user_id);
            return Ok(None);
        };
        self.store
            .upsert_holding(user_id, account_id, &position)
            .await?;
        Ok(Some(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use radar_market_data::SecurityType;

    use crate::errors::CoreError;
    use crate::ingest::UpsertOutcome;
    use crate::positions::{
        BatchResolution, CashLine, ExtractedPosition, ResolutionCounts, ResolvedAccount,
    };

    /// Resolves every position named in the account to itself.
    struct EchoResolver;

    fn echo(raw_name: &str) -> ResolvedPosition {
        ResolvedPosition {
            raw_name: raw_name.to_string(),
            name: raw_name.to_string(),
            secid: Some(raw_name.to_string()),
            ticker: Some(raw_name.to_string()),
            isin: None,
            security_type: Some(SecurityType::Share),
            quantity: None,
            normalized_key: format!("TICKER:{raw_name}"),
            provider: "echo".to_string(),
            fallback: false,
            resolved_query: Some(raw_name.to_string()),
            reference: None,
            snapshot: None,
        }
    }

    #[async_trait]
    impl ResolutionServiceTrait for EchoResolver {
        async fn resolve_batch(&self, accounts: Vec<AccountPositions>) -> BatchResolution {
            let mut counts = ResolutionCounts::default();
            let accounts = accounts
                .into_iter()
                .map(|account| {
                    counts.raw_detected += account.positions.len();
                    counts.resolved += account.positions.len();
                    ResolvedAccount {
                        positions: account.positions.iter().map(|p| echo(&p.raw_name)).collect(),
                        account_id: account.account_id,
                        account_name: account.account_name,
                        cash: account.cash,
                        dropped: Vec::new(),
                    }
                })
                .collect();
            BatchResolution { accounts, counts }
        }

        async fn resolve_manual_ticker(
            &self,
            ticker: &str,
            _security_type: Option<SecurityType>,
        ) -> Result<Option<ResolvedPosition>> {
            if ticker.is_empty() {
                return Err(CoreError::MalformedInput("ticker is empty".to_string()));
            }
            Ok((ticker != "NONE").then(|| echo(ticker)))
        }
    }

    /// Records calls; sleeps inside upsert so overlapping ingests would
    /// interleave their writes.
    #[derive(Default)]
    struct RecordingStore {
        events: Mutex<Vec<String>>,
        fail_upserts: bool,
    }

    impl RecordingStore {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HoldingsStore for RecordingStore {
        async fn upsert_holding(
            &self,
            user_id: &str,
            account_id: &str,
            position: &ResolvedPosition,
        ) -> Result<UpsertOutcome> {
            if self.fail_upserts {
                return Err(CoreError::Storage("disk full".to_string()));
            }
            self.events
                .lock()
                .unwrap()
                .push(format!("upsert {user_id}/{account_id}/{}", position.raw_name));
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(UpsertOutcome::Added)
        }

        async fn deactivate_missing(
            &self,
            user_id: &str,
            account_id: &str,
            keep_keys: &[String],
        ) -> Result<usize> {
            self.events.lock().unwrap().push(format!(
                "deactivate {user_id}/{account_id} keep {}",
                keep_keys.join(",")
            ));
            Ok(1)
        }

        async fn replace_cash(&self, user_id: &str, account_id: &str, cash: &[CashLine]) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("cash {user_id}/{account_id} {}", cash.len()));
            Ok(())
        }
    }

    fn upload(account_id: &str, names: &[&str]) -> Vec<AccountPositions> {
        let mut account = AccountPositions::new(account_id);
        account.positions = names.iter().map(|n| ExtractedPosition::new(*n)).collect();
        vec![account]
    }

    #[tokio::test]
    async fn test_ingest_writes_holdings_then_deactivates_and_replaces_cash() {
        let store = Arc::new(RecordingStore::default());
        let service = IngestService::new(Arc::new(EchoResolver), store.clone());

        let report = service
            .ingest("u1", upload("acc", &["SBER", "GAZP"]))
            .await
            .unwrap();

        assert_eq!(report.accounts, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.deactivated, 1);
        assert_eq!(report.counts.resolved, 2);
        assert_eq!(
            store.events(),
            vec![
                "upsert u1/acc/SBER",
                "upsert u1/acc/GAZP",
                "deactivate u1/acc keep TICKER:SBER,TICKER:GAZP",
                "cash u1/acc 0",
            ]
        );
    }

    #[tokio::test]
    async fn test_same_user_ingests_do_not_interleave() {
        let store = Arc::new(RecordingStore::default());
        let service = Arc::new(IngestService::new(Arc::new(EchoResolver), store.clone()));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.ingest("u1", upload("a", &["A1", "A2", "A3"])).await })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move { service.ingest("u1", upload("b", &["B1", "B2", "B3"])).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let accounts: Vec<char> = store
            .events()
            .iter()
            .filter(|e| e.starts_with("upsert"))
            .map(|e| e.chars().nth("upsert u1/".len()).unwrap())
            .collect();
        let switches = accounts.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(accounts.len(), 6);
        assert_eq!(switches, 1, "writes interleaved: {accounts:?}");
    }

    #[tokio::test]
    async fn test_user_locks_are_released_after_use() {
        let store = Arc::new(RecordingStore::default());
        let service = IngestService::new(Arc::new(EchoResolver), store);

        service.ingest("u1", upload("a", &["SBER"])).await.unwrap();
        service.add_manual_ticker("u2", "b", "LKOH").await.unwrap();
        assert!(service.user_locks.lock().unwrap().is_empty());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            service.ingest("u3", upload("c", &["A1", "A2", "A3"])),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(service.user_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_errors_surface() {
        let store = Arc::new(RecordingStore {
            fail_upserts: true,
            ..RecordingStore::default()
        });
        let service = IngestService::new(Arc::new(EchoResolver), store);

        let err = service.ingest("u1", upload("acc", &["SBER"])).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[tokio::test]
    async fn test_manual_ticker_does_not_deactivate() {
        let store = Arc::new(RecordingStore::default());
        let service = IngestService::new(Arc::new(EchoResolver), store.clone());

        let added = service.add_manual_ticker("u1", "acc", "LKOH").await.unwrap();
        assert_eq!(added.map(|p| p.normalized_key), Some("TICKER:LKOH".to_string()));
        assert!(service.add_manual_ticker("u1", "acc", "NONE").await.unwrap().is_none());
        assert!(matches!(
            service.add_manual_ticker("u1", "acc", "").await,
            Err(CoreError::MalformedInput(_))
        ));
        assert_eq!(store.events(), vec!["upsert u1/acc/LKOH"]);
    }
}

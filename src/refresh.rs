//! Refresh cycles driven by the consumer: retries, persistence, the
//! in-memory current rates and the foreground/background schedule.

use crate::core::config::RefreshConfig;
use crate::core::currency::{CurrencyKind, USD, kind_of};
use crate::core::rates::{RateFetching, RateMap, RatesSnapshot};
use crate::providers::util::with_retry;
use crate::store::RateStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The snapshot was persisted and is now the current data.
    Updated(RatesSnapshot),
    /// A newer cycle already applied every class this one fetched.
    Superseded,
    /// All attempts failed; cached data is left as it was.
    NoUpdate { attempts: usize, error: String },
}

#[derive(Debug, Default)]
struct RefreshState {
    rates: RateMap,
    last_updated_fiat: Option<DateTime<Utc>>,
    last_updated_crypto: Option<DateTime<Utc>>,
    // Generation of the newest cycle applied per class
    fiat_generation: u64,
    crypto_generation: u64,
}

/// Marks a cycle as in flight until dropped, including when the cycle's
/// future is cancelled.
struct FetchingGuard<'a>(&'a AtomicUsize);

impl<'a> FetchingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RateRefresher {
    fetcher: Arc<dyn RateFetching>,
    store: RateStore,
    selection: Vec<String>,
    attempts: usize,
    backoff: Duration,
    state: RwLock<RefreshState>,
    in_flight: AtomicUsize,
    generation: AtomicU64,
}

impl RateRefresher {
    /// Creates a refresher and loads the cached table as the current rates.
    pub async fn new(
        fetcher: Arc<dyn RateFetching>,
        store: RateStore,
        selection: Vec<String>,
        config: &RefreshConfig,
    ) -> Self {
        let refresher = Self {
            fetcher,
            store,
            selection,
            attempts: config.attempts.max(1),
            backoff: config.backoff(),
            state: RwLock::new(RefreshState::default()),
            in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        };
        refresher.load_stored().await;
        refresher
    }

    async fn load_stored(&self) {
        let rates = self.store.rate_map().await;
        let fiat = self.store.last_updated_for(CurrencyKind::Fiat).await;
        let crypto = self.store.last_updated_for(CurrencyKind::Crypto).await;
        debug!(rates = rates.len(), "Loaded cached rates");

        let mut state = self.state.write().await;
        state.rates = rates;
        state.last_updated_fiat = fiat;
        state.last_updated_crypto = crypto;
    }

    /// Replaces the cache with the given rates. Used for previews and tests.
    pub async fn seed(&self, rates: RateMap) {
        self.store.clear_all().await;
        self.store.upsert_merge(&rates, Utc::now()).await;
        self.load_stored().await;
    }

    pub fn store(&self) -> &RateStore {
        &self.store
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    /// Current rates with USD pinned to 1.0.
    pub async fn current_rates(&self) -> RateMap {
        let mut rates = self.state.read().await.rates.clone();
        rates.insert(USD.to_string(), 1.0);
        rates
    }

    pub async fn last_updated_fiat(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated_fiat
    }

    pub async fn last_updated_crypto(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated_crypto
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        state.last_updated_fiat.max(state.last_updated_crypto)
    }

    /// Runs one refresh cycle for the current selection.
    ///
    /// Never fails: when every attempt errors the cache is left untouched and
    /// `NoUpdate` is returned. Overlapping calls are not coalesced.
    pub async fn refresh_now(&self, include_fiat: bool, include_crypto: bool) -> RefreshOutcome {
        let _busy = FetchingGuard::new(&self.in_flight);
        let generation = self.next_generation();

        let fetcher = &self.fetcher;
        let codes_ref = &self.selection;
        let result = with_retry(
            move |attempt| {
                info!(
                    attempt,
                    generation, include_fiat, include_crypto, codes = ?codes_ref,
                    "Refresh attempt"
                );
                fetcher.fetch_all(codes_ref, include_fiat, include_crypto)
            },
            self.attempts,
            self.backoff,
        )
        .await;

        match result {
            Ok(snapshot) => {
                self.apply(generation, snapshot, include_fiat, include_crypto)
                    .await
                    .0
            }
            Err(e) => {
                warn!(error = %e, attempts = self.attempts, "Refresh failed, keeping cached rates");
                RefreshOutcome::NoUpdate {
                    attempts: self.attempts,
                    error: e.to_string(),
                }
            }
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Persists a resolved snapshot unless newer cycles already applied its
    /// classes. Codes of a class applied by a newer cycle are dropped.
    /// The flag tells whether the store write succeeded.
    async fn apply(
        &self,
        generation: u64,
        mut snapshot: RatesSnapshot,
        include_fiat: bool,
        include_crypto: bool,
    ) -> (RefreshOutcome, bool) {
        let mut state = self.state.write().await;
        let fiat_stale = generation < state.fiat_generation;
        let crypto_stale = generation < state.crypto_generation;

        if (include_fiat || include_crypto)
            && (!include_fiat || fiat_stale)
            && (!include_crypto || crypto_stale)
        {
            info!(generation, "Discarding superseded refresh");
            return (RefreshOutcome::Superseded, false);
        }

        snapshot.rates.retain(|code, _| {
            code == USD
                || match kind_of(code) {
                    CurrencyKind::Fiat => !fiat_stale,
                    CurrencyKind::Crypto => !crypto_stale,
                }
        });

        let persisted = if include_fiat || include_crypto {
            self.store
                .upsert_merge(&snapshot.rates, snapshot.combined_timestamp)
                .await
        } else {
            false
        };
        state
            .rates
            .extend(snapshot.rates.iter().map(|(k, v)| (k.clone(), *v)));

        if include_fiat && !fiat_stale {
            state.fiat_generation = generation;
            state.last_updated_fiat = snapshot.fiat_timestamp;
        }
        if include_crypto && !crypto_stale {
            state.crypto_generation = generation;
            state.last_updated_crypto = snapshot.crypto_timestamp;
        }

        for warning in &snapshot.warnings {
            debug!(warning = %warning, "Refresh degraded");
        }
        info!(
            generation,
            rates = snapshot.rates.len(),
            degraded = snapshot.is_degraded(),
            "Refresh applied"
        );
        (RefreshOutcome::Updated(snapshot), persisted)
    }

    /// One background cycle that is abandoned when `deadline` passes.
    pub async fn background_cycle(&self, deadline: Duration) -> bool {
        self.background_refresh(tokio::time::sleep(deadline)).await
    }

    /// Fetches all classes for the selection once and applies the result,
    /// unless `cancel` resolves first.
    ///
    /// Returns `true` only when fresh rates reached the store. Once the fetch
    /// resolved the write runs to completion, so cancellation never leaves a
    /// partial upsert behind. A cycle overtaken by a newer refresh is applied
    /// only for the classes nothing newer has written.
    pub async fn background_refresh<C>(&self, cancel: C) -> bool
    where
        C: Future<Output = ()>,
    {
        let generation = self.next_generation();
        let result = tokio::select! {
            biased;
            _ = cancel => {
                warn!(generation, "Background refresh expired before completion");
                return false;
            }
            result = self.fetcher.fetch_all(&self.selection, true, true) => result,
        };

        match result {
            Ok(snapshot) => {
                let (outcome, persisted) = self.apply(generation, snapshot, true, true).await;
                matches!(outcome, RefreshOutcome::Updated(_)) && persisted
            }
            Err(e) => {
                warn!(error = %e, "Background refresh failed, keeping cached rates");
                false
            }
        }
    }
}

/// Drives refreshes until `shutdown` resolves: one foreground cycle right
/// away and then every `interval`, plus deadline-bound background cycles.
/// Foreground ticks are skipped while a cycle is still in flight.
pub async fn run_ticker<S>(refresher: Arc<RateRefresher>, config: &RefreshConfig, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut foreground = tokio::time::interval(config.interval());
    foreground.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let background_period = config.background_interval();
    let mut background =
        tokio::time::interval_at(Instant::now() + background_period, background_period);
    background.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = config.background_deadline();

    let mut cycles = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopping refresh ticker");
                break;
            }
            _ = foreground.tick() => {
                if refresher.is_fetching() {
                    debug!("Refresh already in flight, skipping tick");
                    continue;
                }
                let refresher = Arc::clone(&refresher);
                cycles.spawn(async move {
                    refresher.refresh_now(true, true).await;
                });
            }
            _ = background.tick() => {
                let refresher = Arc::clone(&refresher);
                cycles.spawn(async move {
                    let success = refresher.background_cycle(deadline).await;
                    info!(success, "Background refresh finished");
                });
            }
            Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
        }
    }

    cycles.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{RateError, RateResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted fetcher. Each call pops the next step; once the script is
    /// exhausted every call fails.
    struct MockFetcher {
        script: Mutex<VecDeque<(Duration, RateResult<RateMap>)>>,
        calls: AtomicUsize,
        requested: Mutex<Vec<Vec<String>>>,
    }

    impl MockFetcher {
        fn new(script: Vec<(Duration, RateResult<RateMap>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Self::new(Vec::new())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn requested(&self) -> Vec<Vec<String>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateFetching for MockFetcher {
        async fn fetch_all(
            &self,
            codes: &[String],
            include_fiat: bool,
            include_crypto: bool,
        ) -> RateResult<RatesSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(codes.to_vec());
            let step = self.script.lock().unwrap().pop_front();
            let (delay, result) = step.unwrap_or((
                Duration::ZERO,
                Err(RateError::transport("mock", "connection refused")),
            ));
            tokio::time::sleep(delay).await;

            let mut rates = result?;
            rates.insert(USD.to_string(), 1.0);
            let now = Utc::now();
            Ok(RatesSnapshot {
                rates,
                fiat_timestamp: include_fiat.then_some(now),
                crypto_timestamp: include_crypto.then_some(now),
                combined_timestamp: now,
                warnings: Vec::new(),
            })
        }
    }

    fn rates(pairs: &[(&str, f64)]) -> RateMap {
        pairs.iter().map(|(c, v)| (c.to_string(), *v)).collect()
    }

    fn selection() -> Vec<String> {
        vec!["USD".to_string(), "EUR".to_string(), "BTC".to_string()]
    }

    async fn refresher(fetcher: Arc<MockFetcher>, store: RateStore) -> RateRefresher {
        RateRefresher::new(fetcher, store, selection(), &RefreshConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_leaves_cache_untouched() {
        let fetcher = MockFetcher::failing();
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher.clone(), store.clone()).await;
        refresher.seed(rates(&[("EUR", 0.9), ("BTC", 0.00002)])).await;
        let before = store.read_all().await;

        let start = Instant::now();
        let outcome = refresher.refresh_now(true, true).await;

        assert!(matches!(outcome, RefreshOutcome::NoUpdate { attempts: 2, .. }));
        assert_eq!(fetcher.calls(), 2);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(!refresher.is_fetching());
        assert_eq!(store.read_all().await, before);
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_succeeds() {
        let fetcher = MockFetcher::new(vec![
            (Duration::ZERO, Err(RateError::NoProviderReachable)),
            (Duration::ZERO, Ok(rates(&[("EUR", 0.95)]))),
        ]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher.clone(), store.clone()).await;

        let outcome = refresher.refresh_now(true, false).await;
        assert!(matches!(outcome, RefreshOutcome::Updated(_)));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(store.read_one("EUR").await.unwrap().units_per_usd, 0.95);
    }

    #[tokio::test]
    async fn test_successful_refresh_updates_store_and_state() {
        let fetcher = MockFetcher::new(vec![(
            Duration::ZERO,
            Ok(rates(&[("EUR", 0.9), ("BTC", 0.00002)])),
        )]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;
        assert!(refresher.last_updated().await.is_none());

        let outcome = refresher.refresh_now(true, true).await;
        let RefreshOutcome::Updated(snapshot) = outcome else {
            panic!("Expected an update, got {outcome:?}");
        };

        assert_eq!(snapshot.rates.get("USD"), Some(&1.0));
        assert_eq!(store.read_one("USD").await.unwrap().units_per_usd, 1.0);
        assert_eq!(store.read_all().await.len(), 3);
        assert_eq!(refresher.current_rates().await.get("BTC"), Some(&0.00002));
        assert_eq!(refresher.last_updated_fiat().await, snapshot.fiat_timestamp);
        assert_eq!(refresher.last_updated_crypto().await, snapshot.crypto_timestamp);
        assert!(!refresher.is_fetching());
    }

    #[tokio::test]
    async fn test_only_requested_class_timestamp_moves() {
        let fetcher = MockFetcher::new(vec![(Duration::ZERO, Ok(rates(&[("BTC", 0.00002)])))]);
        let refresher = refresher(fetcher, RateStore::in_memory()).await;

        refresher.refresh_now(false, true).await;
        assert!(refresher.last_updated_fiat().await.is_none());
        assert!(refresher.last_updated_crypto().await.is_some());
    }

    #[tokio::test]
    async fn test_loads_cached_rates_on_start() {
        let store = RateStore::in_memory();
        let fiat_ts = Utc::now() - chrono::Duration::hours(1);
        store.upsert_merge(&rates(&[("EUR", 0.9)]), fiat_ts).await;

        let refresher = refresher(MockFetcher::failing(), store).await;
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.9));
        assert_eq!(refresher.current_rates().await.get("USD"), Some(&1.0));
        assert_eq!(refresher.last_updated_fiat().await, Some(fiat_ts));
        assert!(refresher.last_updated_crypto().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion_is_superseded() {
        let fetcher = MockFetcher::new(vec![
            (Duration::from_secs(5), Ok(rates(&[("EUR", 0.80)]))),
            (Duration::from_secs(1), Ok(rates(&[("EUR", 0.99)]))),
        ]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;

        let (older, newer) = tokio::join!(
            refresher.refresh_now(true, false),
            refresher.refresh_now(true, false)
        );

        assert!(matches!(newer, RefreshOutcome::Updated(_)));
        assert_eq!(older, RefreshOutcome::Superseded);
        assert_eq!(store.read_one("EUR").await.unwrap().units_per_usd, 0.99);
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.99));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fiat_and_crypto_cycles_both_apply() {
        let fetcher = MockFetcher::new(vec![
            (Duration::from_secs(3), Ok(rates(&[("EUR", 0.9), ("RUB", 90.0)]))),
            (Duration::from_secs(1), Ok(rates(&[("BTC", 0.00002)]))),
        ]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;

        let (fiat, crypto) = tokio::join!(
            refresher.refresh_now(true, false),
            refresher.refresh_now(false, true)
        );

        assert!(matches!(fiat, RefreshOutcome::Updated(_)));
        assert!(matches!(crypto, RefreshOutcome::Updated(_)));
        let cached = store.rate_map().await;
        assert_eq!(
            cached,
            rates(&[("EUR", 0.9), ("RUB", 90.0), ("BTC", 0.00002), ("USD", 1.0)])
        );
        assert!(refresher.last_updated_fiat().await.is_some());
        assert!(refresher.last_updated_crypto().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_cancelled_writes_nothing() {
        let fetcher = MockFetcher::new(vec![(Duration::from_secs(30), Ok(rates(&[("EUR", 0.9)])))]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;

        let success = refresher
            .background_refresh(tokio::time::sleep(Duration::from_secs(10)))
            .await;

        assert!(!success);
        assert!(store.read_all().await.is_empty());
        assert!(refresher.last_updated().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_completes_before_deadline() {
        let fetcher = MockFetcher::new(vec![(Duration::from_secs(1), Ok(rates(&[("EUR", 0.9)])))]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher.clone(), store.clone()).await;

        assert!(refresher.background_cycle(Duration::from_secs(10)).await);
        assert_eq!(store.read_one("EUR").await.unwrap().units_per_usd, 0.9);
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.9));
        assert_eq!(fetcher.requested(), vec![selection()]);
    }

    #[tokio::test]
    async fn test_background_refresh_failure_reports_unsuccessful() {
        let refresher = refresher(MockFetcher::failing(), RateStore::in_memory()).await;
        assert!(!refresher.background_refresh(std::future::pending()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_overtaken_by_foreground_is_discarded() {
        let fetcher = MockFetcher::new(vec![
            (Duration::from_secs(5), Ok(rates(&[("EUR", 0.80)]))),
            (Duration::from_secs(1), Ok(rates(&[("EUR", 0.99)]))),
        ]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;

        let (background, foreground) = tokio::join!(
            refresher.background_cycle(Duration::from_secs(25)),
            refresher.refresh_now(true, true)
        );

        assert!(!background);
        assert!(matches!(foreground, RefreshOutcome::Updated(_)));
        assert_eq!(store.read_one("EUR").await.unwrap().units_per_usd, 0.99);
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.99));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_keeps_classes_nothing_newer_wrote() {
        let fetcher = MockFetcher::new(vec![
            (
                Duration::from_secs(5),
                Ok(rates(&[("EUR", 0.80), ("BTC", 0.00003)])),
            ),
            (Duration::from_secs(1), Ok(rates(&[("EUR", 0.99)]))),
        ]);
        let store = RateStore::in_memory();
        let refresher = refresher(fetcher, store.clone()).await;

        let (background, _) = tokio::join!(
            refresher.background_cycle(Duration::from_secs(25)),
            refresher.refresh_now(true, false)
        );

        assert!(background);
        assert_eq!(store.read_one("EUR").await.unwrap().units_per_usd, 0.99);
        assert_eq!(store.read_one("BTC").await.unwrap().units_per_usd, 0.00003);
        assert_eq!(refresher.current_rates().await.get("EUR"), Some(&0.99));
        assert_eq!(refresher.current_rates().await.get("BTC"), Some(&0.00003));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_refreshes_on_start_and_every_interval() {
        let script = (0..10)
            .map(|_| (Duration::ZERO, Ok(rates(&[("EUR", 0.9)]))))
            .collect();
        let fetcher = MockFetcher::new(script);
        let refresher = Arc::new(refresher(fetcher.clone(), RateStore::in_memory()).await);

        run_ticker(
            Arc::clone(&refresher),
            &RefreshConfig::default(),
            tokio::time::sleep(Duration::from_secs(150)),
        )
        .await;

        // Ticks at 0s, 60s and 120s
        assert_eq!(fetcher.calls(), 3);
        assert!(!refresher.is_fetching());
    }
}

//! # Balance Aggregator
//!
//! Fans a batch of wallet addresses out across the three tracked token
//! contracts, bounded by a semaphore, and streams each address's
//! completed [`AggregateWalletView`] back as soon as its three reads
//! resolve. The slowest address delays only itself.
//!
//! ## Concurrency model
//!
//! (address, token) is the unit of concurrency. Each read writes
//! exactly one slot in its address's view and one cache entry, nothing
//! else, so the only synchronization points are the per-address join
//! (built into `tokio::join!`) and the batch-level pending counter
//! behind `is_loading`. Abandoning an [`Aggregation`] simply discards
//! whatever the in-flight tasks produce; they mutate no shared state
//! beyond atomic cache replacement.
//!
//! ## Staleness cache
//!
//! A completed read stays fresh for the staleness window and is served
//! from cache within it, skipping the ledger entirely. Failed reads are
//! cached too: re-hammering an endpoint that just refused an answer for
//! the same pair is how flaky becomes down. Cache writes are atomic
//! replace-on-key, so concurrent aggregations over the same address
//! cannot corrupt an entry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};

use super::reader::BalanceReader;
use super::{AggregateWalletView, BalanceResult, TokenKind};
use crate::config;
use crate::roster;

/// Cache keys hold the hex form of the address so the `0x…` and
/// `ronin:…` spellings of one wallet share an entry.
type CacheKey = (String, TokenKind);

// ---------------------------------------------------------------------------
// AggregationStats
// ---------------------------------------------------------------------------

/// Cumulative read accounting for one aggregator instance.
///
/// `remote_reads + cache_hits` equals the number of (address, token)
/// pairs ever requested through the instance; `failed_reads` counts
/// remote reads that resolved as failed. Composing processes export
/// these through whatever metrics pipeline they run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregationStats {
    /// Reads that went out to the ledger.
    pub remote_reads: u64,
    /// Remote reads that came back failed.
    pub failed_reads: u64,
    /// Reads served from a fresh cache entry.
    pub cache_hits: u64,
}

#[derive(Default)]
struct StatCounters {
    remote_reads: AtomicU64,
    failed_reads: AtomicU64,
    cache_hits: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> AggregationStats {
        AggregationStats {
            remote_reads: self.remote_reads.load(Ordering::SeqCst),
            failed_reads: self.failed_reads.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
        }
    }
}

// ---------------------------------------------------------------------------
// BalanceAggregator
// ---------------------------------------------------------------------------

/// Batch balance aggregation over any [`BalanceReader`].
///
/// Cheap to share: the reader, cache, and fan-out semaphore all live
/// behind `Arc`, and concurrent `aggregate` calls interleave safely on
/// the same instance.
pub struct BalanceAggregator<R> {
    reader: Arc<R>,
    cache: Arc<DashMap<CacheKey, BalanceResult>>,
    fanout: Arc<Semaphore>,
    stats: Arc<StatCounters>,
    staleness: Duration,
}

impl<R> BalanceAggregator<R>
where
    R: BalanceReader + 'static,
{
    /// Builds an aggregator with the configured fan-out cap and the
    /// five-minute staleness window.
    pub fn new(reader: R) -> Self {
        Self::with_limits(
            reader,
            config::DEFAULT_FANOUT_CAP,
            config::BALANCE_STALENESS_WINDOW,
        )
    }

    /// Builds an aggregator with explicit limits. A `staleness` of zero
    /// disables cache reuse entirely.
    pub fn with_limits(reader: R, fanout_cap: usize, staleness: Duration) -> Self {
        Self {
            reader: Arc::new(reader),
            cache: Arc::new(DashMap::new()),
            fanout: Arc::new(Semaphore::new(fanout_cap.max(1))),
            stats: Arc::new(StatCounters::default()),
            staleness,
        }
    }

    /// Starts aggregating a batch of addresses.
    ///
    /// Duplicate addresses are collapsed; a batch is a set. For N
    /// distinct addresses the returned handle yields exactly N views,
    /// in completion order, each carrying all three token results
    /// (attempted, not necessarily succeeded).
    pub fn aggregate(&self, addresses: impl IntoIterator<Item = String>) -> Aggregation {
        let mut seen = HashSet::new();
        let addresses: Vec<String> = addresses
            .into_iter()
            .filter(|a| seen.insert(a.clone()))
            .collect();

        let total = addresses.len();
        let (tx, rx) = mpsc::channel(total.max(1));
        let remaining = Arc::new(AtomicUsize::new(total));

        for address in addresses {
            let reader = Arc::clone(&self.reader);
            let cache = Arc::clone(&self.cache);
            let fanout = Arc::clone(&self.fanout);
            let stats = Arc::clone(&self.stats);
            let staleness = self.staleness;
            let tx = tx.clone();
            let remaining = Arc::clone(&remaining);

            tokio::spawn(async move {
                let (slp, axs, eth) = tokio::join!(
                    read_cached(&*reader, &cache, &fanout, &stats, staleness, &address, TokenKind::Slp),
                    read_cached(&*reader, &cache, &fanout, &stats, staleness, &address, TokenKind::Axs),
                    read_cached(&*reader, &cache, &fanout, &stats, staleness, &address, TokenKind::Eth),
                );

                let view = AggregateWalletView::resolved(address, slp, axs, eth);

                // Decrement before sending so a consumer that sees the
                // final view also sees is_loading == false.
                remaining.fetch_sub(1, Ordering::SeqCst);

                // A dropped receiver means the caller abandoned the
                // batch; the completed view is simply discarded.
                let _ = tx.send(view).await;
            });
        }

        Aggregation {
            rx,
            remaining,
            total,
        }
    }

    /// Number of (address, token) entries currently cached.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Snapshot of the instance's cumulative read accounting.
    pub fn stats(&self) -> AggregationStats {
        self.stats.snapshot()
    }
}

/// One (address, token) read through the staleness cache and the
/// fan-out gate.
async fn read_cached<R: BalanceReader>(
    reader: &R,
    cache: &DashMap<CacheKey, BalanceResult>,
    fanout: &Semaphore,
    stats: &StatCounters,
    staleness: Duration,
    address: &str,
    token: TokenKind,
) -> BalanceResult {
    let key = (roster::as_hex(address), token);

    if let Some(entry) = cache.get(&key) {
        let age_ms = (Utc::now() - entry.fetched_at).num_milliseconds();
        if age_ms < staleness.as_millis() as i64 {
            stats.cache_hits.fetch_add(1, Ordering::SeqCst);
            return entry.clone();
        }
    }

    // Only remote reads consume a permit; cache hits cost nothing.
    let _permit = fanout
        .acquire()
        .await
        .expect("aggregator semaphore is never closed");

    let result = reader.read(address, token).await;
    stats.remote_reads.fetch_add(1, Ordering::SeqCst);
    if !result.is_ok() {
        stats.failed_reads.fetch_add(1, Ordering::SeqCst);
    }
    cache.insert(key, result.clone());
    result
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Handle to an in-flight batch: a finite stream of resolved views plus
/// the batch-level loading flag.
pub struct Aggregation {
    rx: mpsc::Receiver<AggregateWalletView>,
    remaining: Arc<AtomicUsize>,
    total: usize,
}

impl Aggregation {
    /// Number of distinct addresses in the batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// `true` while any address in the batch is still pending.
    pub fn is_loading(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) > 0
    }

    /// Waits for the next resolved view. Returns `None` once all views
    /// for the batch have been yielded.
    pub async fn next_view(&mut self) -> Option<AggregateWalletView> {
        self.rx.recv().await
    }

    /// Drains the stream, returning all views in completion order.
    pub async fn collect_all(mut self) -> Vec<AggregateWalletView> {
        let mut views = Vec::with_capacity(self.total);
        while let Some(view) = self.rx.recv().await {
            views.push(view);
        }
        views
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BalanceStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory reader with per-pair failure injection, a configurable
    /// delay, and concurrency accounting.
    struct FakeReader {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
        fail: HashSet<(String, TokenKind)>,
        delay: Duration,
    }

    impl FakeReader {
        fn instant() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                fail: HashSet::new(),
                delay,
            }
        }

        fn failing_on(mut self, address: &str, token: TokenKind) -> Self {
            self.fail.insert((address.to_string(), token));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BalanceReader for FakeReader {
        async fn read(&self, address: &str, token: TokenKind) -> BalanceResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&(address.to_string(), token)) {
                BalanceResult::failed(address, token)
            } else {
                BalanceResult::ok(address, token, 10.0)
            }
        }
    }

    /// Arc passthrough so tests can keep a handle on the fake while the
    /// aggregator owns its own.
    #[async_trait]
    impl BalanceReader for Arc<FakeReader> {
        async fn read(&self, address: &str, token: TokenKind) -> BalanceResult {
            self.as_ref().read(address, token).await
        }
    }

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("0x{i:040x}")).collect()
    }

    // -- 1. Completeness: N addresses, exactly N views, 3N reads -------------

    #[tokio::test]
    async fn batch_yields_one_view_per_address() {
        let reader = Arc::new(FakeReader::instant());
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        let batch = addresses(4);
        let views = aggregator.aggregate(batch.clone()).collect_all().await;

        assert_eq!(views.len(), 4);
        assert_eq!(reader.calls(), 12);
        for view in &views {
            assert!(!view.is_loading);
            for token in TokenKind::ALL {
                assert_eq!(view.result_for(token).token, token);
                assert_eq!(view.result_for(token).address, view.address);
            }
        }
    }

    // -- 2. Failure isolation ------------------------------------------------

    #[tokio::test]
    async fn one_failed_read_does_not_poison_its_neighbors() {
        let batch = addresses(2);
        let reader =
            Arc::new(FakeReader::instant().failing_on(&batch[0], TokenKind::Axs));
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        let views = aggregator.aggregate(batch.clone()).collect_all().await;
        let by_address: HashMap<&str, &AggregateWalletView> =
            views.iter().map(|v| (v.address.as_str(), v)).collect();

        let hit = by_address[batch[0].as_str()];
        assert_eq!(hit.axs.status, BalanceStatus::Failed);
        assert_eq!(hit.axs.amount, 0.0);
        assert!(hit.slp.is_ok());
        assert!(hit.eth.is_ok());

        let untouched = by_address[batch[1].as_str()];
        for token in TokenKind::ALL {
            assert!(untouched.result_for(token).is_ok());
        }
    }

    // -- 3. Fresh cache entries skip the reader ------------------------------

    #[tokio::test]
    async fn repeated_batch_within_window_is_served_from_cache() {
        let reader = Arc::new(FakeReader::instant());
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));
        let batch = addresses(3);

        let first = aggregator.aggregate(batch.clone()).collect_all().await;
        assert_eq!(reader.calls(), 9);

        let second = aggregator.aggregate(batch).collect_all().await;
        assert_eq!(reader.calls(), 9, "cache hit must not touch the reader");
        assert_eq!(second.len(), first.len());
    }

    // -- 4. Failed reads are cached too --------------------------------------

    #[tokio::test]
    async fn cached_failure_is_not_retried_within_window() {
        let batch = addresses(1);
        let reader =
            Arc::new(FakeReader::instant().failing_on(&batch[0], TokenKind::Eth));
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        aggregator.aggregate(batch.clone()).collect_all().await;
        let views = aggregator.aggregate(batch).collect_all().await;

        assert_eq!(reader.calls(), 3);
        assert_eq!(views[0].eth.status, BalanceStatus::Failed);
    }

    // -- 5. A zero window forces re-query ------------------------------------

    #[tokio::test]
    async fn stale_entries_are_requeried() {
        let reader = Arc::new(FakeReader::instant());
        let aggregator =
            BalanceAggregator::with_limits(Arc::clone(&reader), 8, Duration::ZERO);
        let batch = addresses(2);

        aggregator.aggregate(batch.clone()).collect_all().await;
        aggregator.aggregate(batch).collect_all().await;

        assert_eq!(reader.calls(), 12, "every pair must be re-read");
    }

    // -- 6. Fan-out never exceeds the cap ------------------------------------

    #[tokio::test]
    async fn in_flight_reads_are_bounded_by_the_cap() {
        let reader = Arc::new(FakeReader::with_delay(Duration::from_millis(20)));
        let aggregator =
            BalanceAggregator::with_limits(Arc::clone(&reader), 2, Duration::ZERO);

        aggregator.aggregate(addresses(4)).collect_all().await;

        assert_eq!(reader.calls(), 12);
        assert!(
            reader.high_water.load(Ordering::SeqCst) <= 2,
            "high-water mark {} exceeded the fan-out cap",
            reader.high_water.load(Ordering::SeqCst)
        );
    }

    // -- 7. is_loading flips once the batch drains ---------------------------

    #[tokio::test]
    async fn loading_flag_tracks_pending_addresses() {
        let reader = Arc::new(FakeReader::with_delay(Duration::from_millis(30)));
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        let mut aggregation = aggregator.aggregate(addresses(3));
        assert!(aggregation.is_loading());

        let mut received = 0;
        while let Some(_view) = aggregation.next_view().await {
            received += 1;
        }
        assert_eq!(received, 3);
        assert!(!aggregation.is_loading());
    }

    // -- 8. Empty batch ------------------------------------------------------

    #[tokio::test]
    async fn empty_batch_resolves_immediately() {
        let aggregator = BalanceAggregator::new(Arc::new(FakeReader::instant()));
        let aggregation = aggregator.aggregate(Vec::new());

        assert_eq!(aggregation.total(), 0);
        assert!(!aggregation.is_loading());
        assert!(aggregation.collect_all().await.is_empty());
    }

    // -- 9. Duplicates collapse: a batch is a set ----------------------------

    #[tokio::test]
    async fn duplicate_addresses_are_collapsed() {
        let reader = Arc::new(FakeReader::instant());
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));
        let addr = addresses(1).remove(0);

        let aggregation = aggregator.aggregate(vec![addr.clone(), addr.clone(), addr]);
        assert_eq!(aggregation.total(), 1);

        let views = aggregation.collect_all().await;
        assert_eq!(views.len(), 1);
        assert_eq!(reader.calls(), 3);
    }

    // -- 10. Both address spellings share one cache entry ---------------------

    #[tokio::test]
    async fn hex_and_ronin_forms_of_one_wallet_share_the_cache() {
        let reader = Arc::new(FakeReader::instant());
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        let hex = "0xabc1057399f2ffa37ab15a83b41c0e14b2b9f601".to_string();
        let ronin = "ronin:abc1057399f2ffa37ab15a83b41c0e14b2b9f601".to_string();

        aggregator.aggregate(vec![hex]).collect_all().await;
        assert_eq!(reader.calls(), 3);

        let views = aggregator.aggregate(vec![ronin.clone()]).collect_all().await;
        assert_eq!(reader.calls(), 3, "respelled wallet must hit the cache");
        assert_eq!(views[0].address, ronin);
        assert_eq!(aggregator.cached_entries(), 3);
    }

    // -- 11. Read accounting -------------------------------------------------

    #[tokio::test]
    async fn stats_track_remote_reads_failures_and_cache_hits() {
        let batch = addresses(2);
        let reader =
            Arc::new(FakeReader::instant().failing_on(&batch[0], TokenKind::Slp));
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));

        aggregator.aggregate(batch.clone()).collect_all().await;
        let first = aggregator.stats();
        assert_eq!(first.remote_reads, 6);
        assert_eq!(first.failed_reads, 1);
        assert_eq!(first.cache_hits, 0);

        aggregator.aggregate(batch).collect_all().await;
        let second = aggregator.stats();
        assert_eq!(second.remote_reads, 6, "fresh entries stay cached");
        assert_eq!(second.failed_reads, 1);
        assert_eq!(second.cache_hits, 6);
    }

    // -- 12. Views arrive indexable regardless of completion order -----------

    #[tokio::test]
    async fn views_are_indexable_by_address() {
        let reader = Arc::new(FakeReader::with_delay(Duration::from_millis(5)));
        let aggregator = BalanceAggregator::new(Arc::clone(&reader));
        let batch = addresses(5);

        let views = aggregator.aggregate(batch.clone()).collect_all().await;
        let by_address: HashMap<String, AggregateWalletView> = views
            .into_iter()
            .map(|v| (v.address.clone(), v))
            .collect();

        for address in &batch {
            assert!(by_address.contains_key(address), "missing view for {address}");
        }
    }
}

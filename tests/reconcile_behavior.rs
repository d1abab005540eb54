//! Behavior-driven tests for the reconcile cycle
//!
//! These tests verify HOW one reconciliation treats the stored object: when
//! it fetches, what it writes, what it leaves alone and how it asks to be
//! retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quotesync_core::{
    CancelHandle, CredentialRef, CredentialResolver, Event, EventType, FetchError,
    InMemoryCredentialStore, InMemoryObjectStore, IntervalMinutes, ManualClock, ObjectKey,
    ObjectStore, Outcome, PriceSource, ReconcileContext, ReconcileErrorKind, Reconciler,
    RetryDecision, SecretKey, StockQuote, StockQuoteSpec, StockQuoteStatus, StoreError, Ticker,
    UtcDateTime, WatchEvent, PRICE_UPDATED_REASON,
};
use tokio::sync::broadcast;

// =============================================================================
// Fixtures
// =============================================================================

const START: &str = "2024-01-01T00:00:00Z";

fn at(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("valid timestamp")
}

fn key() -> ObjectKey {
    ObjectKey::new("default", "apple")
}

fn spec(minutes: u32) -> StockQuoteSpec {
    StockQuoteSpec::new(
        Ticker::parse("AAPL").expect("valid ticker"),
        IntervalMinutes::new(minutes).expect("valid interval"),
        CredentialRef::new("polygon", "default"),
    )
}

type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<f64, FetchError>> + Send + 'a>>;

/// Price source returning a fixed result and counting calls.
struct ScriptedSource {
    result: Result<f64, FetchError>,
    calls: AtomicUsize,
    last_api_key: std::sync::Mutex<Option<String>>,
}

impl ScriptedSource {
    fn returning(result: Result<f64, FetchError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
            last_api_key: std::sync::Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn latest_close<'a>(&'a self, _ticker: &'a Ticker, api_key: &'a str) -> FetchFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_api_key.lock().expect("lock") = Some(api_key.to_owned());
        let result = self.result.clone();
        Box::pin(async move { result })
    }
}

struct Harness {
    store: InMemoryObjectStore,
    credentials: InMemoryCredentialStore,
    clock: ManualClock,
}

impl Harness {
    async fn new() -> Self {
        let credentials = InMemoryCredentialStore::new();
        credentials
            .insert_strings(
                SecretKey::new("default", "polygon"),
                [("api-key", "test-api-key")],
            )
            .await;

        Self {
            store: InMemoryObjectStore::new(),
            credentials,
            clock: ManualClock::new(at(START)),
        }
    }

    fn reconciler(&self, source: Arc<dyn PriceSource>) -> Reconciler {
        self.reconciler_over(Arc::new(self.store.clone()), source)
    }

    fn reconciler_over(&self, store: Arc<dyn ObjectStore>, source: Arc<dyn PriceSource>) -> Reconciler {
        Reconciler::new(
            store,
            CredentialResolver::new(Arc::new(self.credentials.clone())),
            source,
        )
        .with_clock(Arc::new(self.clock.clone()))
    }

    async fn apply(&self, minutes: u32) -> StockQuote {
        self.store.apply(key(), spec(minutes)).await.expect("apply")
    }

    async fn apply_with_status(&self, minutes: u32, status: StockQuoteStatus) -> StockQuote {
        let object = self.apply(minutes).await;
        self.store
            .update_status(&key(), object.metadata.resource_version, status)
            .await
            .expect("seed status")
    }

    async fn stored(&self) -> StockQuote {
        self.store.get(&key()).await.expect("object exists")
    }

    async fn events(&self) -> Vec<Event> {
        self.store.events(&key()).await
    }
}

fn prior_status() -> StockQuoteStatus {
    StockQuoteStatus {
        price: Some(String::from("149.00")),
        last_updated: Some(at("2023-12-31T23:50:00Z")),
        next_update_time: Some(at("2023-12-31T23:55:00Z")),
    }
}

fn detached() -> ReconcileContext {
    ReconcileContext::detached(&key())
}

// =============================================================================
// Reconcile: Due Gate
// =============================================================================

#[tokio::test]
async fn when_next_update_is_unset_reconciler_always_fetches() {
    // Given: A fresh object with no status
    let harness = Harness::new().await;
    harness.apply(5).await;
    let source = ScriptedSource::returning(Ok(150.50));

    // When: It is reconciled
    let reconciled = harness
        .reconciler(source.clone())
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: A fetch happened and the price was published with the resolved key
    assert_eq!(source.calls(), 1);
    assert_eq!(
        source.last_api_key.lock().expect("lock").as_deref(),
        Some("test-api-key")
    );
    assert!(matches!(reconciled.outcome, Outcome::Updated { .. }));
}

#[tokio::test]
async fn when_next_update_is_in_future_reconciler_waits_exactly_the_remaining_time() {
    // Given: An object whose next update is 3m20s away
    let harness = Harness::new().await;
    let seeded = harness
        .apply_with_status(
            5,
            StockQuoteStatus {
                price: Some(String::from("149.00")),
                last_updated: Some(at("2023-12-31T23:58:20Z")),
                next_update_time: Some(at("2024-01-01T00:03:20Z")),
            },
        )
        .await;
    let source = ScriptedSource::returning(Ok(150.50));

    // When: It is reconciled
    let reconciled = harness
        .reconciler(source.clone())
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: No fetch, no write, and the requeue equals the remaining time
    let remaining = Duration::from_secs(200);
    assert_eq!(source.calls(), 0);
    assert_eq!(reconciled.outcome, Outcome::NotDue { remaining });
    assert_eq!(reconciled.action.requeue_after(), Some(remaining));
    assert_eq!(harness.stored().await, seeded);
    assert!(harness.events().await.is_empty());
}

#[tokio::test]
async fn when_next_update_equals_now_object_is_due() {
    // Given: An object whose next update is exactly now
    let harness = Harness::new().await;
    harness
        .apply_with_status(
            5,
            StockQuoteStatus {
                next_update_time: Some(at(START)),
                ..prior_status()
            },
        )
        .await;
    let source = ScriptedSource::returning(Ok(151.00));

    // When: It is reconciled
    harness
        .reconciler(source.clone())
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: The inclusive gate lets the fetch through
    assert_eq!(source.calls(), 1);
}

// =============================================================================
// Reconcile: Successful Update
// =============================================================================

#[tokio::test]
async fn when_provider_returns_price_status_is_written_and_interval_is_requested() {
    // Given: A 5-minute object and a provider quoting 150.50
    let harness = Harness::new().await;
    harness.apply(5).await;

    // When: It is reconciled
    let reconciled = harness
        .reconciler(ScriptedSource::returning(Ok(150.50)))
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: Price, timestamps and requeue all line up
    let status = harness.stored().await.status;
    assert_eq!(status.price.as_deref(), Some("150.50"));
    assert_eq!(status.last_updated, Some(at(START)));
    assert_eq!(status.next_update_time, Some(at("2024-01-01T00:05:00Z")));
    assert_eq!(
        reconciled.action.requeue_after(),
        Some(Duration::from_secs(5 * 60))
    );
}

#[tokio::test]
async fn next_update_minus_last_update_equals_interval() {
    for minutes in [1, 7, 60, 1440] {
        // Given: An object with the given interval
        let harness = Harness::new().await;
        harness.apply(minutes).await;

        // When: It is reconciled
        harness
            .reconciler(ScriptedSource::returning(Ok(10.0)))
            .reconcile(&key(), &detached())
            .await
            .expect("reconcile succeeds");

        // Then: The stored pair is exactly one interval apart
        let status = harness.stored().await.status;
        let last = status.last_updated.expect("last updated");
        let next = status.next_update_time.expect("next update");
        assert_eq!(
            last.duration_until(next),
            Some(Duration::from_secs(u64::from(minutes) * 60)),
            "interval {minutes}"
        );
    }
}

#[tokio::test]
async fn midpoint_prices_round_half_away_from_zero() {
    // Given: A provider quoting a price on the rounding midpoint
    let harness = Harness::new().await;
    harness.apply(5).await;

    // When: It is reconciled
    harness
        .reconciler(ScriptedSource::returning(Ok(150.505)))
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: The published price rounds up
    assert_eq!(harness.stored().await.status.price.as_deref(), Some("150.51"));
}

#[tokio::test]
async fn successful_update_is_recorded_as_normal_event() {
    // Given: A fresh object
    let harness = Harness::new().await;
    harness.apply(5).await;

    // When: It is reconciled successfully
    harness
        .reconciler(ScriptedSource::returning(Ok(150.50)))
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: Operators see a PriceUpdated event
    let events = harness.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Normal);
    assert_eq!(events[0].reason, PRICE_UPDATED_REASON);
    assert!(events[0].message.contains("150.50"));
}

/// Advances the clock while the fetch is in flight.
struct SlowSource {
    clock: ManualClock,
    latency: Duration,
}

impl PriceSource for SlowSource {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn latest_close<'a>(&'a self, _ticker: &'a Ticker, _api_key: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.clock.advance(self.latency).expect("advance clock");
            Ok(42.0)
        })
    }
}

#[tokio::test]
async fn timestamps_are_taken_when_the_fetch_completes() {
    // Given: A fetch that takes 30 seconds of wall-clock time
    let harness = Harness::new().await;
    harness.apply(5).await;
    let source = Arc::new(SlowSource {
        clock: harness.clock.clone(),
        latency: Duration::from_secs(30),
    });

    // When: It is reconciled
    harness
        .reconciler(source)
        .reconcile(&key(), &detached())
        .await
        .expect("reconcile succeeds");

    // Then: The interval counts from completion, not from the start
    let status = harness.stored().await.status;
    assert_eq!(status.last_updated, Some(at("2024-01-01T00:00:30Z")));
    assert_eq!(status.next_update_time, Some(at("2024-01-01T00:05:30Z")));
}

// =============================================================================
// Reconcile: Fetch Failures
// =============================================================================

async fn assert_fetch_failure_leaves_status(error: FetchError, expected: ReconcileErrorKind) {
    // Given: An overdue object with a previously published price
    let harness = Harness::new().await;
    let seeded = harness.apply_with_status(5, prior_status()).await;
    let reconciler = harness.reconciler(ScriptedSource::returning(Err(error)));

    // When: It is reconciled and the fetch fails
    let err = reconciler
        .reconcile(&key(), &detached())
        .await
        .expect_err("reconcile fails");

    // Then: The kind is surfaced, status is byte-identical, backoff applies
    assert_eq!(err.kind(), expected);
    let stored = harness.stored().await;
    assert_eq!(
        serde_json::to_string(&stored.status).expect("serialize"),
        serde_json::to_string(&seeded.status).expect("serialize")
    );
    assert_eq!(reconciler.error_policy(&err), RetryDecision::Backoff);

    // And: The failure is visible on the object
    let events = harness.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Warning);
    assert_eq!(events[0].reason, expected.as_str());
}

#[tokio::test]
async fn when_provider_returns_500_reconcile_fails_with_provider_error() {
    assert_fetch_failure_leaves_status(
        FetchError::Provider {
            status: 500,
            body: String::from(r#"{"error":"Internal Server Error"}"#),
        },
        ReconcileErrorKind::ProviderError,
    )
    .await;
}

#[tokio::test]
async fn when_provider_returns_429_reconcile_fails_with_rate_limited() {
    assert_fetch_failure_leaves_status(
        FetchError::RateLimited {
            ticker: Ticker::parse("AAPL").expect("valid ticker"),
        },
        ReconcileErrorKind::RateLimited,
    )
    .await;
}

#[tokio::test]
async fn when_provider_returns_no_results_reconcile_fails_with_no_data() {
    assert_fetch_failure_leaves_status(
        FetchError::NoData {
            ticker: Ticker::parse("AAPL").expect("valid ticker"),
        },
        ReconcileErrorKind::NoData,
    )
    .await;
}

#[tokio::test]
async fn when_provider_returns_zero_price_reconcile_fails_with_invalid_price() {
    assert_fetch_failure_leaves_status(
        FetchError::InvalidPrice {
            ticker: Ticker::parse("AAPL").expect("valid ticker"),
            price: 0.0,
        },
        ReconcileErrorKind::InvalidPrice,
    )
    .await;
}

#[tokio::test]
async fn when_body_is_malformed_reconcile_fails_with_decode_error() {
    assert_fetch_failure_leaves_status(
        FetchError::Decode {
            message: String::from("expected value at line 1 column 1"),
        },
        ReconcileErrorKind::DecodeError,
    )
    .await;
}

// =============================================================================
// Reconcile: Credential Failures
// =============================================================================

#[tokio::test]
async fn when_credential_is_missing_reconcile_retries_after_five_minutes() {
    // Given: An object referencing a credential in a namespace with no entry
    let harness = Harness::new().await;
    harness
        .store
        .apply(
            key(),
            StockQuoteSpec::new(
                Ticker::parse("AAPL").expect("valid ticker"),
                IntervalMinutes::new(5).expect("valid interval"),
                CredentialRef::new("polygon", "elsewhere"),
            ),
        )
        .await
        .expect("apply");
    let source = ScriptedSource::returning(Ok(150.50));
    let reconciler = harness.reconciler(source.clone());

    // When: It is reconciled
    let err = reconciler
        .reconcile(&key(), &detached())
        .await
        .expect_err("reconcile fails");

    // Then: No fetch, CredentialNotFound, fixed 5-minute retry
    assert_eq!(source.calls(), 0);
    assert_eq!(err.kind(), ReconcileErrorKind::CredentialNotFound);
    assert_eq!(
        reconciler.error_policy(&err),
        RetryDecision::After(Duration::from_secs(5 * 60))
    );
    assert_eq!(harness.stored().await.status, StockQuoteStatus::default());
    assert_eq!(harness.events().await[0].reason, "CredentialNotFound");
}

#[tokio::test]
async fn when_credential_lacks_field_reconcile_fails_with_missing_field() {
    // Given: A credential entry without the referenced field
    let harness = Harness::new().await;
    harness
        .store
        .apply(
            key(),
            StockQuoteSpec::new(
                Ticker::parse("AAPL").expect("valid ticker"),
                IntervalMinutes::new(5).expect("valid interval"),
                CredentialRef::new("polygon", "default").with_key("token"),
            ),
        )
        .await
        .expect("apply");

    // When: It is reconciled
    let err = harness
        .reconciler(ScriptedSource::returning(Ok(1.0)))
        .reconcile(&key(), &detached())
        .await
        .expect_err("reconcile fails");

    // Then: The missing field is named
    assert_eq!(err.kind(), ReconcileErrorKind::CredentialMissingField);
    assert!(err.to_string().contains("token"));
}

// =============================================================================
// Reconcile: Object Lifecycle and Concurrency
// =============================================================================

#[tokio::test]
async fn when_object_is_gone_reconcile_is_a_quiet_no_op() {
    // Given: No object at the key
    let harness = Harness::new().await;
    let source = ScriptedSource::returning(Ok(1.0));

    // When: It is reconciled
    let reconciled = harness
        .reconciler(source.clone())
        .reconcile(&key(), &detached())
        .await
        .expect("missing object is not a failure");

    // Then: Nothing is fetched or scheduled
    assert_eq!(reconciled.outcome, Outcome::Deleted);
    assert_eq!(reconciled.action.requeue_after(), None);
    assert_eq!(source.calls(), 0);
}

/// Edits the object's spec while the fetch is in flight.
struct ConcurrentEditSource {
    store: InMemoryObjectStore,
}

impl PriceSource for ConcurrentEditSource {
    fn name(&self) -> &'static str {
        "concurrent-edit"
    }

    fn latest_close<'a>(&'a self, _ticker: &'a Ticker, _api_key: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.store.apply(key(), spec(30)).await.expect("concurrent edit");
            Ok(150.50)
        })
    }
}

#[tokio::test]
async fn when_spec_changes_during_fetch_status_write_conflicts() {
    // Given: A user edits the interval while the price is being fetched
    let harness = Harness::new().await;
    harness.apply(5).await;
    let reconciler = harness.reconciler(Arc::new(ConcurrentEditSource {
        store: harness.store.clone(),
    }));

    // When: It is reconciled
    let err = reconciler
        .reconcile(&key(), &detached())
        .await
        .expect_err("stale write must fail");

    // Then: The edit survives, status is untouched and the retry is immediate
    assert_eq!(err.kind(), ReconcileErrorKind::StatusWriteConflict);
    assert_eq!(reconciler.error_policy(&err), RetryDecision::Immediate);
    let stored = harness.stored().await;
    assert_eq!(stored.spec.interval_minutes.minutes(), 30);
    assert_eq!(stored.status, StockQuoteStatus::default());
}

/// Deletes the object while the fetch is in flight.
struct DeletingSource {
    store: InMemoryObjectStore,
}

impl PriceSource for DeletingSource {
    fn name(&self) -> &'static str {
        "deleting"
    }

    fn latest_close<'a>(&'a self, _ticker: &'a Ticker, _api_key: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.store.delete(&key()).await.expect("object existed");
            Ok(150.50)
        })
    }
}

#[tokio::test]
async fn when_object_is_deleted_during_fetch_price_is_dropped() {
    // Given: The object disappears while its price is being fetched
    let harness = Harness::new().await;
    harness.apply(5).await;
    let reconciler = harness.reconciler(Arc::new(DeletingSource {
        store: harness.store.clone(),
    }));

    // When: It is reconciled
    let reconciled = reconciler
        .reconcile(&key(), &detached())
        .await
        .expect("deletion is not a failure");

    // Then: Nothing is written and nothing is scheduled
    assert_eq!(reconciled.outcome, Outcome::Deleted);
    assert_eq!(reconciled.action.requeue_after(), None);
    assert!(harness.store.get(&key()).await.is_err());
}

/// Delegates to an in-memory store but refuses status writes.
struct ReadOnlyStore {
    inner: InMemoryObjectStore,
}

impl ObjectStore for ReadOnlyStore {
    fn get<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> Pin<Box<dyn Future<Output = Result<StockQuote, StoreError>> + Send + 'a>> {
        self.inner.get(key)
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<StockQuote>, StoreError>> + Send + '_>> {
        self.inner.list()
    }

    fn update_status<'a>(
        &'a self,
        _key: &'a ObjectKey,
        _expected_version: u64,
        _status: StockQuoteStatus,
    ) -> Pin<Box<dyn Future<Output = Result<StockQuote, StoreError>> + Send + 'a>> {
        Box::pin(async { Err(StoreError::Unavailable(String::from("read-only"))) })
    }

    fn record_event<'a>(
        &'a self,
        key: &'a ObjectKey,
        event: Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        self.inner.record_event(key, event)
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn when_status_write_fails_error_is_surfaced_without_schedule() {
    // Given: A store that rejects status writes
    let harness = Harness::new().await;
    harness.apply(5).await;
    let store = Arc::new(ReadOnlyStore {
        inner: harness.store.clone(),
    });
    let reconciler = harness.reconciler_over(store, ScriptedSource::returning(Ok(150.50)));

    // When: It is reconciled
    let err = reconciler
        .reconcile(&key(), &detached())
        .await
        .expect_err("write fails");

    // Then: StatusWriteError with default backoff, recorded on the object
    assert_eq!(err.kind(), ReconcileErrorKind::StatusWriteError);
    assert_eq!(reconciler.error_policy(&err), RetryDecision::Backoff);
    assert_eq!(harness.events().await[0].reason, "StatusWriteError");
}

/// Never completes on its own.
struct HangingSource;

impl PriceSource for HangingSource {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn latest_close<'a>(&'a self, _ticker: &'a Ticker, _api_key: &'a str) -> FetchFuture<'a> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn when_cancelled_mid_fetch_status_is_untouched_and_retry_is_abandoned() {
    // Given: A fetch that never returns and a cancellable context
    let harness = Harness::new().await;
    let seeded = harness.apply_with_status(5, prior_status()).await;
    let reconciler = harness.reconciler(Arc::new(HangingSource));
    let shutdown = CancelHandle::new();
    let context = shutdown.context_for(&key());

    // When: Cancellation arrives while the fetch is in flight
    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        canceller.cancel();
    });
    let err = reconciler
        .reconcile(&key(), &context)
        .await
        .expect_err("cancelled");

    // Then: Cancelled is distinct from failure and never retried by delay
    assert_eq!(err.kind(), ReconcileErrorKind::Cancelled);
    assert_eq!(reconciler.error_policy(&err), RetryDecision::Abandon);
    assert_eq!(harness.stored().await.status, seeded.status);
}

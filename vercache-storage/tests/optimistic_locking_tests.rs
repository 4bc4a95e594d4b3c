//! Optimistic Locking and Cancellation Tests
//!
//! **Property 4: Single compare-and-swap winner**
//! Among N concurrent `check_and_set` calls with the same expected version,
//! exactly one succeeds.
//!
//! **Property 5: Lazy version expiry**
//! `get_version` reports absence once 5 minutes have passed since the last
//! touch, without a sweep.
//!
//! Also covers concurrent durable updates racing through a strategy, a
//! caller-side retry loop, and context cancellation between steps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use tokio::sync::Barrier;
use vercache_core::SweepConfig;
use vercache_storage::{
    version_sweep_task, CacheAside, CacheStrategy, ChangeLogReader, ChangeOperation, DurableStore,
    VersionManager, VolatileStore,
};
use vercache_test_utils::assertions::assert_context_error;
use vercache_test_utils::fixtures::{cancelled_context, doc, minutes_ago, update_request};
use vercache_test_utils::{DurableOp, Harness, OpContext, VercacheResult, VolatileOp};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Exactly one of N racing compare-and-swaps commits.
    #[test]
    fn prop_single_cas_winner(callers in 2usize..24, expected in 0i64..100) {
        let versions = Arc::new(VersionManager::new());
        versions.set_version("hot", expected);
        let barrier = Arc::new(std::sync::Barrier::new(callers));

        let handles: Vec<_> = (0..callers)
            .map(|i| {
                let versions = Arc::clone(&versions);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    versions.check_and_set("hot", expected, expected + 1 + i as i64)
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        prop_assert_eq!(winners, 1);
    }

    /// Entries vanish from reads after the TTL, with no sweep in between.
    #[test]
    fn prop_version_expires_lazily(version in any::<i64>(), extra_secs in 1i64..3600) {
        let versions = VersionManager::new();
        let touched = Utc::now();
        versions.set_version_at("k", version, touched);

        let just_before = touched + chrono::Duration::minutes(5);
        let after = just_before + chrono::Duration::seconds(extra_secs);
        prop_assert_eq!(versions.get_version_at("k", just_before), Some(version));
        prop_assert_eq!(versions.get_version_at("k", after), None);
        prop_assert_eq!(versions.len(), 1);
    }
}

#[test]
fn test_version_touched_five_minutes_ago_is_gone() {
    let versions = VersionManager::new();
    versions.set_version_at("k", 1, minutes_ago(6));
    assert_eq!(versions.get_version("k"), None);
    assert_eq!(versions.cleanup_expired(), 1);
    assert!(versions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_one_winner() {
    const WRITERS: usize = 8;

    let h = Arc::new(Harness::new());
    h.durable.seed("acct:1", &doc("initial"), 1).await;
    let barrier = Arc::new(Barrier::new(WRITERS));

    let tasks: Vec<_> = (0..WRITERS)
        .map(|i| {
            let h = Arc::clone(&h);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                let ctx = OpContext::background();
                h.cache_aside
                    .update(&ctx, "acct:1", &update_request(&format!("writer-{}", i), 1))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, WRITERS - 1);
    assert_eq!(h.durable.peek("acct:1").await.unwrap().version, 2);
}

/// Read the current version, attempt the update, re-read on conflict.
async fn update_with_retry<S: CacheStrategy + ?Sized>(
    strategy: &S,
    ctx: &OpContext,
    key: &str,
    data: &str,
    max_attempts: usize,
) -> VercacheResult<usize> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = strategy
            .get(ctx, key)
            .await?
            .and_then(|d| d.version())
            .unwrap_or(1);
        match strategy.update(ctx, key, &update_request(data, current)).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_conflict() && attempt < max_attempts => continue,
            Err(e) => return Err(e),
        }
    }
}

#[tokio::test]
async fn test_retry_after_conflict_succeeds() {
    let h = Harness::new();
    let ctx = OpContext::background();
    h.durable.seed("k", &doc("v1"), 1).await;

    // Populate the cache at version 1, then move the durable record on.
    h.cache_aside.get(&ctx, "k").await.unwrap();
    h.durable.seed("k", &doc("v2"), 2).await;

    // The first attempt reads the stale cached version and conflicts; a
    // successful conditional update needs the fresh version.
    let err = h
        .cache_aside
        .update(&ctx, "k", &update_request("mine", 1))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    h.volatile.delete(&ctx, "k").await.unwrap();
    let attempts = update_with_retry(&h.cache_aside, &ctx, "k", "mine", 3)
        .await
        .unwrap();
    assert_eq!(attempts, 1);

    let record = h.durable.peek("k").await.unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.value, doc("mine"));
    assert_eq!(h.volatile.peek("k").await, Some(doc("mine").with_version(3)));
}

#[tokio::test]
async fn test_version_manager_guards_retry_loop() {
    let versions = Arc::new(VersionManager::new());
    versions.set_version("k", 1);

    // Two callers read version 1; only the first compare-and-swap wins.
    let read_a = versions.get_version("k").unwrap();
    let read_b = versions.get_version("k").unwrap();
    assert!(versions.check_and_set("k", read_a, read_a + 1));
    assert!(!versions.check_and_set("k", read_b, read_b + 1));

    // The loser re-reads and retries.
    let fresh = versions.get_version("k").unwrap();
    assert!(versions.check_and_set("k", fresh, fresh + 1));
    assert_eq!(versions.get_version("k"), Some(3));
}

#[tokio::test]
async fn test_cancelled_context_stops_before_any_store() {
    let h = Harness::new();
    let ctx = cancelled_context();

    assert_context_error(&h.cache_aside.get(&ctx, "k").await);
    assert_context_error(&h.cache_aside.update(&ctx, "k", &update_request("x", 1)).await);
    assert_context_error(&h.write_through.set(&ctx, "k", &doc("x")).await);
    assert_context_error(&h.write_through.delete(&ctx, "k").await);
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_cancellation_between_steps_skips_cache_write() {
    let h = Harness::new();
    h.durable.seed("k", &doc("v"), 1).await;

    // Cancel as soon as the durable update has been made.
    let (handle, ctx) = OpContext::cancellable();
    let strategy = CacheAside::new(
        Arc::clone(&h.volatile),
        Arc::new(CancelAfterUpdate {
            inner: Arc::clone(&h.durable),
            handle,
        }),
    );

    let result = strategy.update(&ctx, "k", &update_request("new", 1)).await;
    assert_context_error(&result);

    // The durable write stands; nothing else ran.
    assert_eq!(h.durable.peek("k").await.unwrap().version, 2);
    assert_eq!(h.durable.faults().calls(DurableOp::Get), 0);
    assert_eq!(h.volatile.faults().calls(VolatileOp::Set), 0);
}

/// Durable store wrapper that cancels the caller once an update has landed.
struct CancelAfterUpdate {
    inner: Arc<vercache_test_utils::InMemoryDurableStore>,
    handle: vercache_core::CancelHandle,
}

#[async_trait::async_trait]
impl DurableStore for CancelAfterUpdate {
    async fn get(
        &self,
        ctx: &OpContext,
        key: &str,
    ) -> VercacheResult<Option<vercache_core::Record>> {
        self.inner.get(ctx, key).await
    }

    async fn set(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &vercache_core::Document,
    ) -> VercacheResult<()> {
        self.inner.set(ctx, key, value).await
    }

    async fn update(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &vercache_core::Document,
        expected_version: vercache_core::Version,
    ) -> VercacheResult<()> {
        let result = self.inner.update(ctx, key, value, expected_version).await;
        self.handle.cancel();
        result
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        self.inner.delete(ctx, key).await
    }
}

#[tokio::test]
async fn test_record_deleted_after_update_invalidates_cache() {
    let h = Harness::new();
    let ctx = OpContext::background();
    h.durable.seed("k", &doc("v"), 1).await;
    h.volatile
        .set(&ctx, "k", &doc("v").with_version(1), Duration::from_secs(300))
        .await
        .unwrap();

    let strategy = CacheAside::new(
        Arc::clone(&h.volatile),
        Arc::new(DeleteAfterUpdate {
            inner: Arc::clone(&h.durable),
        }),
    );

    strategy
        .update(&ctx, "k", &update_request("new", 1))
        .await
        .unwrap();

    assert!(h.durable.peek("k").await.is_none());
    assert!(!h.volatile.contains("k").await);
    assert_eq!(h.volatile.faults().calls(VolatileOp::Set), 1);
    assert_eq!(h.volatile.faults().calls(VolatileOp::Delete), 1);
}

/// Durable store wrapper that deletes the row right after an update, as a
/// concurrent writer would.
struct DeleteAfterUpdate {
    inner: Arc<vercache_test_utils::InMemoryDurableStore>,
}

#[async_trait::async_trait]
impl DurableStore for DeleteAfterUpdate {
    async fn get(
        &self,
        ctx: &OpContext,
        key: &str,
    ) -> VercacheResult<Option<vercache_core::Record>> {
        self.inner.get(ctx, key).await
    }

    async fn set(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &vercache_core::Document,
    ) -> VercacheResult<()> {
        self.inner.set(ctx, key, value).await
    }

    async fn update(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &vercache_core::Document,
        expected_version: vercache_core::Version,
    ) -> VercacheResult<()> {
        self.inner.update(ctx, key, value, expected_version).await?;
        self.inner.delete(ctx, key).await
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        self.inner.delete(ctx, key).await
    }
}

#[tokio::test]
async fn test_deadline_exceeded_is_reported() {
    let h = Harness::new();
    let ctx = OpContext::with_timeout(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = h.cache_aside.set(&ctx, "k", &doc("v")).await.unwrap_err();
    assert_eq!(
        err,
        vercache_core::VercacheError::Context(vercache_core::ContextError::DeadlineExceeded)
    );
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_change_log_records_strategy_writes() {
    let h = Harness::new();
    let ctx = OpContext::background();

    h.cache_aside.set(&ctx, "k", &doc("a")).await.unwrap();
    h.cache_aside
        .update(&ctx, "k", &update_request("b", 1))
        .await
        .unwrap();
    h.cache_aside.delete(&ctx, "k").await.unwrap();

    let entries = h.durable.changes_since(&ctx, 0, 10).await.unwrap();
    let ops: Vec<_> = entries.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOperation::Insert,
            ChangeOperation::Update,
            ChangeOperation::Delete
        ]
    );
    assert!(entries[2].new_data.is_none());
    assert!(entries.iter().all(|e| e.record_id == "k"));
}

#[tokio::test]
async fn test_sweeper_reclaims_expired_versions() {
    let versions = Arc::new(VersionManager::new());
    for i in 0..5 {
        versions.set_version_at(&format!("old:{}", i), i, minutes_ago(10));
    }
    versions.set_version("live", 1);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let config = SweepConfig::default().with_interval(Duration::from_millis(10));
    let task = tokio::spawn(version_sweep_task(Arc::clone(&versions), config, shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    let metrics = task.await.unwrap().snapshot();

    assert_eq!(metrics.entries_removed, 5);
    assert_eq!(versions.len(), 1);
}

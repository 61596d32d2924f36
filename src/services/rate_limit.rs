//! Tier-keyed rate limiting against a shared atomic counter store.
//!
//! Every request increments a counter for its identifier (owner-scoped for
//! paid tiers, client IP otherwise) within the current 60-second window and
//! is rejected once the tier's ceiling is crossed.
//!
//! # Atomicity
//!
//! The increment-and-read is a single statement evaluated inside the shared
//! store ([`PgCounterStore::incr`]). Concurrent requests for the same
//! identifier can never both observe the last free slot; the store hands
//! each caller a distinct post-increment count in one round trip. A
//! read-counter/compare/write-counter sequence would not survive this.
//!
//! # Architecture
//!
//! The storage backend sits behind the [`CounterStore`] trait so the
//! gateway stays stateless and horizontally replicable: every process
//! instance talks to the same external counters. Tests substitute an
//! in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{db::DbPool, models::plan::Plan};

/// Fixed rate-limit window length.
pub const WINDOW_MILLIS: i64 = 60_000;

/// Outcome of a rate-limit check.
///
/// Carries everything the gate needs for the `X-RateLimit-*` telemetry
/// headers and, on rejection, `Retry-After`.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Ceiling for the tier that was checked
    pub limit: i64,

    /// Slots left in the current window (0 when rejected)
    pub remaining: i64,

    /// Epoch milliseconds at which the current window ends
    pub reset_at_ms: i64,
}

impl RateDecision {
    /// Seconds a rejected caller should wait before retrying.
    ///
    /// `ceil((reset_at - now) / 1000)`, floored at 0 so a window edge that
    /// has already passed never produces a negative hint.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        let until_reset = (self.reset_at_ms - now_ms).max(0);
        (until_reset + 999) / 1000
    }
}

/// Shared atomic counter store the limiter runs against.
///
/// Implementations must make [`incr`](CounterStore::incr) a single atomic
/// operation: increment the counter for `(identifier, window_start_ms)`,
/// creating it at 1 if absent, and return the post-increment count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment and read the counter for one window.
    async fn incr(&self, identifier: &str, window_start_ms: i64) -> anyhow::Result<i64>;

    /// Delete windows that ended before `before_ms`. Returns rows removed.
    async fn purge_expired(&self, before_ms: i64) -> anyhow::Result<u64>;
}

/// Postgres-backed counter store.
///
/// Counters live in the `rate_limit_windows` table, reachable from every
/// gateway instance. The upsert below is the store-side atomic primitive:
/// one round trip that inserts the window row at 1 or increments it, and
/// returns the resulting count.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: DbPool,
}

impl PgCounterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn incr(&self, identifier: &str, window_start_ms: i64) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_windows (identifier, window_start_ms, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (identifier, window_start_ms)
            DO UPDATE SET request_count = rate_limit_windows.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(identifier)
        .bind(window_start_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn purge_expired(&self, before_ms: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_windows WHERE window_start_ms < $1")
            .bind(before_ms)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// The rate limiter injected into the request gate.
///
/// Stateless apart from the external store handle; safe to clone and share
/// across arbitrary request concurrency.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Count this request against `identifier` and compare with the plan's
    /// ceiling.
    ///
    /// A rejected request has still been counted; the attempt occurred.
    ///
    /// # Errors
    ///
    /// Propagates store errors untouched. The gate decides the
    /// fail-open/fail-closed policy per tier; this layer does not.
    pub async fn check(&self, identifier: &str, plan: Plan) -> anyhow::Result<RateDecision> {
        self.check_at(identifier, plan, Utc::now().timestamp_millis())
            .await
    }

    /// [`check`](Self::check) with an explicit clock, for tests.
    async fn check_at(
        &self,
        identifier: &str,
        plan: Plan,
        now_ms: i64,
    ) -> anyhow::Result<RateDecision> {
        let window_start_ms = now_ms - now_ms.rem_euclid(WINDOW_MILLIS);
        let limit = plan.requests_per_minute();

        let count = self.store.incr(identifier, window_start_ms).await?;

        Ok(RateDecision {
            allowed: count <= limit,
            limit,
            remaining: (limit - count).max(0),
            reset_at_ms: window_start_ms + WINDOW_MILLIS,
        })
    }

    /// Drop windows that ended before the previous window edge.
    ///
    /// Housekeeping only; the check never reads past windows, so
    /// correctness does not depend on when (or whether) this runs.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let current_window_start = now_ms - now_ms.rem_euclid(WINDOW_MILLIS);
        self.store
            .purge_expired(current_window_start - WINDOW_MILLIS)
            .await
    }
}

/// Derive the rate-limit partition key for a request.
///
/// Authenticated pro/enterprise callers are partitioned per owner so the
/// whole subscription shares one budget regardless of source address.
/// Anonymous and free-tier traffic is partitioned by client IP.
pub fn identifier_for(plan: Plan, owner_id: Option<Uuid>, client_ip: &str) -> String {
    match (plan, owner_id) {
        (Plan::Free, _) | (_, None) => format!("ip:{client_ip}"),
        (plan, Some(owner_id)) => format!("{plan}:{owner_id}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory stand-in for the shared store. The mutex gives the same
    /// guarantee the Postgres upsert does: each increment observes a
    /// distinct count.
    #[derive(Default)]
    struct MemoryCounterStore {
        windows: Mutex<HashMap<(String, i64), i64>>,
    }

    #[async_trait]
    impl CounterStore for MemoryCounterStore {
        async fn incr(&self, identifier: &str, window_start_ms: i64) -> anyhow::Result<i64> {
            let mut windows = self.windows.lock().unwrap();
            let count = windows
                .entry((identifier.to_string(), window_start_ms))
                .or_insert(0);
            *count += 1;
            Ok(*count)
        }

        async fn purge_expired(&self, before_ms: i64) -> anyhow::Result<u64> {
            let mut windows = self.windows.lock().unwrap();
            let before = windows.len();
            windows.retain(|(_, window_start), _| *window_start >= before_ms);
            Ok((before - windows.len()) as u64)
        }
    }

    fn memory_limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::default()))
    }

    const NOW_MS: i64 = 1_750_000_020_000;

    #[tokio::test]
    async fn allows_up_to_ceiling_then_rejects() {
        let limiter = memory_limiter();

        for i in 0..60 {
            let decision = limiter
                .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
                .await
                .unwrap();
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.limit, 60);
            assert_eq!(decision.remaining, 60 - (i + 1));
        }

        let decision = limiter
            .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn window_elapse_resets_the_budget() {
        let limiter = memory_limiter();

        for _ in 0..=60 {
            limiter
                .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
                .await
                .unwrap();
        }

        let next_window = NOW_MS + WINDOW_MILLIS;
        let decision = limiter
            .check_at("ip:203.0.113.7", Plan::Free, next_window)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 59);
    }

    #[tokio::test]
    async fn identifiers_have_independent_budgets() {
        let limiter = memory_limiter();

        for _ in 0..=60 {
            limiter
                .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
                .await
                .unwrap();
        }

        let decision = limiter
            .check_at("ip:198.51.100.2", Plan::Free, NOW_MS)
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn concurrent_requests_admit_exactly_the_ceiling() {
        let limiter = memory_limiter();
        let owner = Uuid::new_v4();
        let identifier = identifier_for(Plan::Free, Some(owner), "203.0.113.7");

        let mut handles = Vec::new();
        for _ in 0..75 {
            let limiter = limiter.clone();
            let identifier = identifier.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .check_at(&identifier, Plan::Free, NOW_MS)
                    .await
                    .unwrap()
                    .allowed
            }));
        }

        let mut allowed = 0;
        let mut rejected = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            } else {
                rejected += 1;
            }
        }

        assert_eq!(allowed, 60);
        assert_eq!(rejected, 15);
    }

    #[tokio::test]
    async fn pro_ceiling_is_600() {
        let limiter = memory_limiter();
        let identifier = format!("pro:{}", Uuid::new_v4());

        for _ in 0..600 {
            let decision = limiter
                .check_at(&identifier, Plan::Pro, NOW_MS)
                .await
                .unwrap();
            assert!(decision.allowed);
        }

        let decision = limiter
            .check_at(&identifier, Plan::Pro, NOW_MS)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 600);
    }

    #[tokio::test]
    async fn purge_drops_only_past_windows() {
        let store = Arc::new(MemoryCounterStore::default());
        let limiter = RateLimiter::new(store.clone());

        limiter
            .check_at("ip:203.0.113.7", Plan::Free, NOW_MS - 2 * WINDOW_MILLIS)
            .await
            .unwrap();
        limiter
            .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
            .await
            .unwrap();

        let window_start = NOW_MS - NOW_MS.rem_euclid(WINDOW_MILLIS);
        let removed = store.purge_expired(window_start).await.unwrap();
        assert_eq!(removed, 1);

        // The current window survived: the next check continues its count.
        let decision = limiter
            .check_at("ip:203.0.113.7", Plan::Free, NOW_MS)
            .await
            .unwrap();
        assert_eq!(decision.remaining, 58);
    }

    #[test]
    fn retry_after_rounds_up_and_clamps_at_zero() {
        let decision = RateDecision {
            allowed: false,
            limit: 60,
            remaining: 0,
            reset_at_ms: NOW_MS + 1_500,
        };
        assert_eq!(decision.retry_after_secs(NOW_MS), 2);
        assert_eq!(decision.retry_after_secs(NOW_MS + 1_500), 0);
        assert_eq!(decision.retry_after_secs(NOW_MS + 5_000), 0);
    }

    #[test]
    fn identifier_partitions_by_tier() {
        let owner = Uuid::new_v4();

        assert_eq!(
            identifier_for(Plan::Pro, Some(owner), "203.0.113.7"),
            format!("pro:{owner}")
        );
        assert_eq!(
            identifier_for(Plan::Enterprise, Some(owner), "203.0.113.7"),
            format!("enterprise:{owner}")
        );
        // Free and anonymous traffic share the IP partition.
        assert_eq!(
            identifier_for(Plan::Free, Some(owner), "203.0.113.7"),
            "ip:203.0.113.7"
        );
        assert_eq!(
            identifier_for(Plan::Free, None, "203.0.113.7"),
            "ip:203.0.113.7"
        );
    }
}

//! Fixed-window admission control for public write endpoints.
//!
//! Each protected operation picks a namespace (`reports:create`,
//! `reports:evidence`, ...) and every `(namespace, client)` pair gets its own
//! counting window held in process memory. Namespaces never share budget.
//!
//! # Algorithm
//!
//! Plain fixed window: a bucket counts admissions until `reset_at`, then is
//! replaced by a fresh bucket on the next request. A client can therefore be
//! admitted up to `2 * limit` times across a window boundary (`limit` at the
//! tail of one window, `limit` again at the head of the next). That is the
//! accepted cost of O(1) state per key; there is no smoothing.
//!
//! # Concurrency
//!
//! The read-check-increment for a key runs while holding the `DashMap`
//! entry guard, which is a write lock on the key's shard. The sweep uses
//! `DashMap::retain`, which takes the same shard locks, so it can neither
//! observe a half-updated bucket nor delete one that a `check` is holding.

use super::client_identity::resolve_client_identity;
use crate::metrics;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use http::header::{HeaderName, RETRY_AFTER};
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

/// Default spacing between lazy sweeps of expired buckets.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    namespace: String,
    client: String,
}

/// Consumption of one client inside one namespace.
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    /// Admissions so far in the current window.
    count: u32,
    /// Absolute end of the current window.
    reset_at: DateTime<Utc>,
}

impl RateBucket {
    fn fresh(now: DateTime<Utc>, window: TimeDelta) -> Self {
        Self {
            count: 0,
            reset_at: now
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Admissions left in the window; 0 when denied.
    pub remaining: u32,
    /// Bucket count after this check.
    pub count: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until the window resets, rounded up, never below 1.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn new(allowed: bool, limit: u32, count: u32, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = if allowed {
            limit.saturating_sub(count)
        } else {
            0
        };
        let millis = (reset_at - now).num_milliseconds().max(0) as u64;
        let retry_after_secs = millis.div_ceil(1000).max(1);

        Self {
            allowed,
            limit,
            remaining,
            count,
            reset_at,
            retry_after_secs,
        }
    }

    /// Window end as Unix seconds, rounded up.
    pub fn reset_unix(&self) -> i64 {
        let secs = self.reset_at.timestamp();
        if self.reset_at.timestamp_subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Response headers for this decision.
    ///
    /// Limit, remaining and reset are always present; `Retry-After` only
    /// when the request was denied.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_unix()));
        if !self.allowed {
            headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        }
        headers
    }
}

/// Thread-safe fixed-window rate limit store.
///
/// Constructed once at startup and shared by `Arc` with every handler.
#[derive(Debug)]
pub struct RateLimitManager {
    buckets: DashMap<BucketKey, RateBucket>,
    /// Time of the last lazy sweep (`None` until the first check).
    last_sweep: Mutex<Option<DateTime<Utc>>>,
    sweep_interval: TimeDelta,
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitManager {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            last_sweep: Mutex::new(None),
            sweep_interval: to_delta(interval),
        }
    }

    /// Check whether a request may proceed, using the wall clock.
    pub fn check(
        &self,
        namespace: &str,
        headers: &HeaderMap,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        self.check_at(namespace, headers, limit, window, Utc::now())
    }

    /// Check whether a request may proceed at time `now`.
    pub fn check_at(
        &self,
        namespace: &str,
        headers: &HeaderMap,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let client = resolve_client_identity(headers);
        self.check_identity_at(namespace, &client, limit, window, now)
    }

    /// Admission check for an already resolved client identity.
    ///
    /// A zero `limit` is treated as 1 and a zero `window` as one second.
    pub fn check_identity_at(
        &self,
        namespace: &str,
        client: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        // Must run before the entry guard is taken: retain locks every shard.
        self.maybe_sweep_at(now);

        let limit = limit.max(1);
        let window = to_delta(window);
        let key = BucketKey {
            namespace: namespace.to_string(),
            client: client.to_string(),
        };

        let decision = {
            let mut bucket = self
                .buckets
                .entry(key)
                .or_insert_with(|| RateBucket::fresh(now, window));

            if bucket.is_expired(now) {
                *bucket = RateBucket::fresh(now, window);
            }

            let allowed = bucket.count < limit;
            if allowed {
                bucket.count += 1;
            }
            RateLimitDecision::new(allowed, limit, bucket.count, bucket.reset_at, now)
        };

        if !decision.allowed {
            debug!(
                namespace = %namespace,
                client = %client,
                retry_after = decision.retry_after_secs,
                "rate limit exceeded"
            );
        }
        metrics::record_admission(namespace, decision.allowed);

        decision
    }

    /// Run [`sweep_expired_at`](Self::sweep_expired_at) if at least one
    /// sweep interval has passed since the previous sweep.
    pub fn maybe_sweep_at(&self, now: DateTime<Utc>) {
        {
            let mut last = self.last_sweep.lock();
            if let Some(previous) = *last
                && previous
                    .checked_add_signed(self.sweep_interval)
                    .is_none_or(|due| now < due)
            {
                return;
            }
            *last = Some(now);
        }
        self.sweep_expired_at(now);
    }

    /// Remove every bucket whose window has ended. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now));
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "expired rate buckets swept");
        }
        metrics::set_rate_buckets(self.buckets.len());
        removed
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            buckets: self.buckets.len(),
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Number of tracked `(namespace, client)` buckets.
    pub buckets: usize,
}

fn to_delta(duration: Duration) -> TimeDelta {
    let duration = duration.max(Duration::from_secs(1));
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

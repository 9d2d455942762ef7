//! Token bucket rate limiting keyed by rule class, client and endpoint.
//!
//! # Locking
//! ```text
//! RateLimiter.buckets (RwLock)   structural: lookup, creation, sweep
//!     └─ TokenBucket.state (Mutex)   arithmetic: refill, spend, retry-after
//! ```
//! Requests against different keys only share the map read lock, so they never
//! serialize on each other's arithmetic. Requests against the same key are
//! serialized by that bucket's mutex.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{EndpointRule, RateLimitConfig, Rule};
use crate::observability::metrics;

/// Rule class used when no endpoint fragment matches.
pub const GLOBAL_CLASS: &str = "global";

/// Buckets untouched for longer than this are evicted by the sweep.
pub const IDLE_BUCKET_TTL: Duration = Duration::from_secs(3600);

/// Wait reported by buckets that can never satisfy the request.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

const FALLBACK_GLOBAL_RULE: Rule = Rule {
    capacity: 100.0,
    rate: 10.0,
};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    pub(crate) fn new_at(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Spend `cost` tokens if available. All or nothing.
    pub fn consume(&self, cost: f64) -> bool {
        self.consume_at(cost, Instant::now())
    }

    pub(crate) fn consume_at(&self, cost: f64, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available.
    ///
    /// Buckets that never refill, or whose capacity is below `cost`, report
    /// [`MAX_RETRY_AFTER`].
    pub fn retry_after(&self, cost: f64) -> Duration {
        self.retry_after_at(cost, Instant::now())
    }

    pub(crate) fn retry_after_at(&self, cost: f64, now: Instant) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if self.refill_rate <= 0.0 || cost > self.capacity {
            return MAX_RETRY_AFTER;
        }

        let deficit = cost - self.projected_tokens(&state, now);
        if deficit <= 0.0 {
            return Duration::ZERO;
        }

        Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(MAX_RETRY_AFTER)
    }

    /// Tokens currently available, including refill accrued since the last spend.
    pub fn tokens(&self) -> f64 {
        self.tokens_at(Instant::now())
    }

    pub(crate) fn tokens_at(&self, now: Instant) -> f64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.projected_tokens(&state, now)
    }

    fn projected_tokens(&self, state: &BucketState, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(state.last_refill)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Zero when allowed.
    pub retry_after: Duration,
    /// Rule class the request was charged against.
    pub rule_class: String,
}

/// In-process rate limiter holding one bucket per `class:client:path` key.
#[derive(Debug)]
pub struct RateLimiter {
    rules: BTreeMap<String, Rule>,
    endpoints: Vec<EndpointRule>,
    cleanup_interval: Duration,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    pub(crate) fn new_at(config: &RateLimitConfig, now: Instant) -> Self {
        let mut rules = config.rules.clone();
        if !rules.contains_key(GLOBAL_CLASS) {
            tracing::warn!(
                capacity = FALLBACK_GLOBAL_RULE.capacity,
                rate = FALLBACK_GLOBAL_RULE.rate,
                "No global rate limit rule configured, using built-in default"
            );
            rules.insert(GLOBAL_CLASS.to_string(), FALLBACK_GLOBAL_RULE);
        }

        Self {
            rules,
            endpoints: config.endpoints.clone(),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            buckets: RwLock::new(HashMap::new()),
            last_cleanup: Mutex::new(now),
        }
    }

    /// Decide whether `identity` may spend `cost` tokens on `path`.
    pub fn is_allowed(&self, identity: &str, path: &str, cost: f64) -> RateLimitDecision {
        self.is_allowed_at(identity, path, cost, Instant::now())
    }

    pub(crate) fn is_allowed_at(
        &self,
        identity: &str,
        path: &str,
        cost: f64,
        now: Instant,
    ) -> RateLimitDecision {
        self.cleanup_at(now);

        let rule_class = self.resolve_rule_class(path);
        let key = Self::bucket_key(rule_class, identity, path);
        let bucket = self.bucket_for(key, rule_class, now);

        if bucket.consume_at(cost, now) {
            RateLimitDecision {
                allowed: true,
                retry_after: Duration::ZERO,
                rule_class: rule_class.to_string(),
            }
        } else {
            RateLimitDecision {
                allowed: false,
                retry_after: bucket.retry_after_at(cost, now),
                rule_class: rule_class.to_string(),
            }
        }
    }

    /// Build the bucket key for a resolved class.
    pub fn bucket_key(rule_class: &str, identity: &str, path: &str) -> String {
        format!("{rule_class}:{identity}:{path}")
    }

    /// Pick the rule class for a path.
    ///
    /// The longest configured fragment contained in the path wins; equal
    /// lengths go to the entry configured first. Falls back to `global`.
    pub fn resolve_rule_class(&self, path: &str) -> &str {
        let mut best: Option<(&str, usize)> = None;

        for endpoint in &self.endpoints {
            if !self.rules.contains_key(&endpoint.class) {
                continue;
            }
            for fragment in &endpoint.paths {
                if fragment.is_empty() || !path.contains(fragment.as_str()) {
                    continue;
                }
                if best.map_or(true, |(_, len)| fragment.len() > len) {
                    best = Some((endpoint.class.as_str(), fragment.len()));
                }
            }
        }

        best.map_or(GLOBAL_CLASS, |(class, _)| class)
    }

    /// The rule applied to a class, `global` when the class is unknown.
    pub fn rule(&self, rule_class: &str) -> Rule {
        self.rules
            .get(rule_class)
            .or_else(|| self.rules.get(GLOBAL_CLASS))
            .copied()
            .unwrap_or(FALLBACK_GLOBAL_RULE)
    }

    fn bucket_for(&self, key: String, rule_class: &str, now: Instant) -> Arc<TokenBucket> {
        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(&key) {
                return bucket.clone();
            }
        }

        let rule = self.rule(rule_class);
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted the bucket between the two locks.
        buckets
            .entry(key)
            .or_insert_with(|| Arc::new(TokenBucket::new_at(rule.capacity, rule.rate, now)))
            .clone()
    }

    /// Evict idle buckets if the cleanup interval has elapsed.
    ///
    /// Returns the number of evicted buckets.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub(crate) fn cleanup_at(&self, now: Instant) -> usize {
        {
            let mut last = self.last_cleanup.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) < self.cleanup_interval {
                return 0;
            }
            *last = now;
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for(now) <= IDLE_BUCKET_TTL);
        let evicted = before - buckets.len();

        metrics::record_bucket_count(buckets.len());
        tracing::debug!(evicted, remaining = buckets.len(), "Cleaned up idle rate limit buckets");
        evicted
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Look up an existing bucket without creating one.
    pub fn bucket(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn rules(&self) -> &BTreeMap<String, Rule> {
        &self.rules
    }
}

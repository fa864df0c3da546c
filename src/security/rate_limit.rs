//! Per-rule token bucket rate limiting.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::routing::RuleId;

/// Rate limit attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Refill rate.
    pub requests_per_second: u32,

    /// Bucket capacity. Defaults to `requests_per_second`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Give every client address its own bucket instead of sharing one per rule.
    #[serde(default)]
    pub per_client: bool,
}

impl RateLimitPolicy {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
            burst: None,
            per_client: false,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn per_client(mut self) -> Self {
        self.per_client = true;
        self
    }

    pub fn capacity(&self) -> u32 {
        self.burst.unwrap_or(self.requests_per_second)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.requests_per_second == 0 {
            return Err("requests_per_second must be greater than zero".to_string());
        }
        if self.burst == Some(0) {
            return Err("burst must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A simple token bucket.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// Refill, then take one token. On failure returns the time until one
    /// token is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        if now > self.last_update {
            self.last_update = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / refill_rate))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    rule: RuleId,
    client: Option<IpAddr>,
}

/// Token buckets for every rate-limited rule.
///
/// Refill and consumption happen under the bucket's shard lock, so
/// concurrent requests never spend the same token.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<BucketKey, TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one token for `rule`, or return the time until the next one
    /// is available.
    pub fn check(
        &self,
        rule: &RuleId,
        client: IpAddr,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> Result<(), Duration> {
        let capacity = f64::from(policy.capacity());
        let rate = f64::from(policy.requests_per_second);
        if rate <= 0.0 {
            return Err(Duration::MAX);
        }

        let key = BucketKey {
            rule: rule.clone(),
            client: policy.per_client.then(|| client.to_canonical()),
        };

        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(capacity, now));
        bucket.try_acquire(capacity, rate, now)
    }

    /// Drop buckets of rules no longer in `live`.
    pub fn retain_rules(&self, live: &HashSet<RuleId>) {
        self.buckets.retain(|key, _| live.contains(&key.rule));
    }

    /// Drop buckets untouched for at least `idle`. Returns how many were removed.
    pub fn sweep_idle(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

//! Rate limiting for the SSE HTTP surface: a token-bucket limiter keyed by
//! client IP and, independently, by API key/principal, taking the more
//! severe of the two decisions for a given request.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Tokens added per second.
    pub refill_per_second: f64,
    /// Maximum tokens a bucket can hold (burst size).
    pub burst: f64,
    /// Bucket occupancy (as a fraction of `burst`) above which requests are
    /// still allowed but a `rate_limit.warning` should be emitted.
    pub warning_threshold: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            refill_per_second: 10.0,
            burst: 20.0,
            warning_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Warn,
    Exceeded,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(burst: f64) -> Self {
        Self { tokens: burst, last_refill: Instant::now() }
    }

    fn refill(&mut self, config: &RateLimiterConfig) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_second).min(config.burst);
        self.last_refill = now;
    }
}

/// Two independent token buckets per request: one for the client's network
/// address, one for its authenticated principal. A request is throttled if
/// either bucket is exhausted.
pub struct RateLimiter {
    config: RateLimiterConfig,
    by_ip: DashMap<String, Bucket>,
    by_principal: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            by_ip: DashMap::new(),
            by_principal: DashMap::new(),
        }
    }

    /// Attempts to take one token from both buckets. Returns the most
    /// severe of the two decisions.
    pub fn check(&self, client_ip: &str, principal: &str) -> RateLimitDecision {
        let ip_decision = self.take(&self.by_ip, client_ip);
        let principal_decision = self.take(&self.by_principal, principal);
        std::cmp::max_by_key(ip_decision, principal_decision, |d| severity(*d))
    }

    fn take(&self, buckets: &DashMap<String, Bucket>, key: &str) -> RateLimitDecision {
        let mut entry = buckets.entry(key.to_string()).or_insert_with(|| Bucket::new(self.config.burst));
        entry.refill(&self.config);

        if entry.tokens < 1.0 {
            return RateLimitDecision::Exceeded;
        }
        entry.tokens -= 1.0;
        if entry.tokens <= self.config.burst * (1.0 - self.config.warning_threshold) {
            RateLimitDecision::Warn
        } else {
            RateLimitDecision::Allowed
        }
    }

    /// Seconds until `key`'s IP bucket has at least one token, for a
    /// `Retry-After` header. Returns 0 if already available.
    pub fn retry_after_secs(&self, client_ip: &str) -> u64 {
        let Some(mut entry) = self.by_ip.get_mut(client_ip) else { return 0 };
        entry.refill(&self.config);
        if entry.tokens >= 1.0 {
            return 0;
        }
        let deficit = 1.0 - entry.tokens;
        (deficit / self.config.refill_per_second).ceil() as u64
    }

    /// Drops buckets untouched for longer than `max_idle`, bounding memory
    /// growth from one-off client IPs. Intended to run on the cleanup
    /// sweep alongside the Connection Manager's own housekeeping.
    pub fn sweep(&self, max_idle: Duration) {
        let now = Instant::now();
        self.by_ip.retain(|_, b| now.duration_since(b.last_refill) < max_idle);
        self.by_principal.retain(|_, b| now.duration_since(b.last_refill) < max_idle);
    }
}

fn severity(decision: RateLimitDecision) -> u8 {
    match decision {
        RateLimitDecision::Allowed => 0,
        RateLimitDecision::Warn => 1,
        RateLimitDecision::Exceeded => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_the_burst_exceeds() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            refill_per_second: 0.0,
            burst: 2.0,
            warning_threshold: 0.5,
        });
        assert_eq!(limiter.check("1.1.1.1", "svc-a"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("1.1.1.1", "svc-a"), RateLimitDecision::Warn);
        assert_eq!(limiter.check("1.1.1.1", "svc-a"), RateLimitDecision::Exceeded);
    }

    #[test]
    fn buckets_are_isolated_per_key() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            refill_per_second: 0.0,
            burst: 1.0,
            warning_threshold: 0.5,
        });
        assert_eq!(limiter.check("1.1.1.1", "svc-a"), RateLimitDecision::Allowed);
        // Different IP, same principal: IP bucket is fresh so the worse of
        // the two decisions is still driven by the now-exhausted principal
        // bucket on the next call, but a first call from a new IP is clean.
        assert_eq!(limiter.check("2.2.2.2", "svc-b"), RateLimitDecision::Allowed);
    }

    #[test]
    fn retry_after_is_zero_when_tokens_available() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        assert_eq!(limiter.retry_after_secs("1.1.1.1"), 0);
    }
}

use crate::store::WindowState;
use http::HeaderName;

/// Header carrying the window capacity
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the requests left after this one
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Header carrying the window reset time in epoch seconds
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate limit decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Total limit for the window
    pub total: u64,
    /// Requests left in the window after this one
    pub remaining: u64,
    /// When the window resets (epoch seconds)
    pub reset_epoch_secs: u64,
}

impl Decision {
    /// Derive a decision from the store's view of the window
    ///
    /// The store reports the slots available when the request arrived; the
    /// request is allowed if any were, and the reported remaining count
    /// excludes the slot it took.
    pub fn from_window(state: WindowState) -> Self {
        Self {
            allowed: state.remaining > 0,
            total: state.total,
            remaining: state.remaining.saturating_sub(1),
            reset_epoch_secs: state.reset_epoch_secs,
        }
    }

    /// Whole seconds until the window resets, never negative
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.millis_until_reset(now_ms) / 1000
    }

    /// Milliseconds until the window resets, never negative
    pub fn millis_until_reset(&self, now_ms: u64) -> u64 {
        self.reset_epoch_secs
            .saturating_mul(1000)
            .saturating_sub(now_ms)
    }
}

/// Result of evaluating a request against the rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No limiting applies; no headers are emitted
    Bypass,
    /// The request was counted
    Limited(Decision),
}

/// Counter key for an identity under a policy scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// Policy scope discriminator
    pub scope: String,
    /// The identifier (e.g., IP address, API key)
    pub identity: String,
}

impl RateLimitKey {
    /// Create a new rate limit key
    pub fn new(scope: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            identity: identity.into(),
        }
    }

    /// Convert to a store key under the given prefix
    pub fn to_store_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.scope, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_to_store_key() {
        let key = RateLimitKey::new("policy0", "192.168.1.1");
        assert_eq!(key.to_store_key("limit"), "limit:policy0:192.168.1.1");

        let key = RateLimitKey::new("users", "api-key-123");
        assert_eq!(key.to_store_key("app"), "app:users:api-key-123");
    }

    #[test]
    fn test_decision_from_fresh_window() {
        let decision = Decision::from_window(WindowState {
            total: 10,
            remaining: 10,
            reset_epoch_secs: 100,
        });
        assert!(decision.allowed);
        assert_eq!(decision.total, 10);
        assert_eq!(decision.remaining, 9);
    }

    #[test]
    fn test_decision_from_exhausted_window() {
        let decision = Decision::from_window(WindowState {
            total: 10,
            remaining: 0,
            reset_epoch_secs: 100,
        });
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_last_slot_is_allowed_with_zero_remaining() {
        let decision = Decision::from_window(WindowState {
            total: 1,
            remaining: 1,
            reset_epoch_secs: 100,
        });
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_retry_after_never_negative() {
        let decision = Decision {
            allowed: false,
            total: 1,
            remaining: 0,
            reset_epoch_secs: 100,
        };
        assert_eq!(decision.retry_after_secs(97_500), 2);
        assert_eq!(decision.millis_until_reset(97_500), 2_500);
        assert_eq!(decision.retry_after_secs(100_000), 0);
        assert_eq!(decision.retry_after_secs(250_000), 0);
    }

    #[test]
    fn test_far_reset_does_not_overflow() {
        let decision = Decision {
            allowed: false,
            total: 1,
            remaining: 0,
            reset_epoch_secs: u64::MAX,
        };
        assert_eq!(decision.millis_until_reset(1_000), u64::MAX - 1_000);
        assert_eq!(decision.retry_after_secs(0), u64::MAX / 1000);
    }
}

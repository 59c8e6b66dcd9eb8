use super::types::{Decision, Outcome, RateLimitKey};
use crate::error::{RateLimitError, Result};
use crate::metrics;
use crate::policy::{IdentitySource, Policy, PolicySet};
use crate::store::CounterStore;
use axum::extract::ConnectInfo;
use http::request::Parts;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default prefix for counter keys
pub const DEFAULT_KEY_PREFIX: &str = "limit";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Per-route rate limiter
///
/// Cheap to clone; all clones share the same policies and store.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    policies: PolicySet,
    store: Arc<dyn CounterStore>,
    key_prefix: String,
    trust_proxy: bool,
}

/// Builder for [`RateLimiter`]
#[derive(Default)]
pub struct RateLimiterBuilder {
    policies: Vec<Policy>,
    store: Option<Arc<dyn CounterStore>>,
    key_prefix: Option<String>,
    trust_proxy: bool,
}

impl RateLimiterBuilder {
    /// Append a policy; declaration order is matching order
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Append several policies
    pub fn policies(mut self, policies: impl IntoIterator<Item = Policy>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Counter store shared by every evaluation
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Prefix for counter keys (defaults to `limit`)
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Take the client IP from `X-Forwarded-For` when present
    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Validate the policies and build the limiter
    pub fn build(self) -> Result<RateLimiter> {
        let store = self.store.ok_or(RateLimitError::MissingStore)?;
        let policies = PolicySet::new(self.policies)?;

        if policies.is_empty() {
            warn!("Rate limiter built without policies; all requests pass through");
        }

        Ok(RateLimiter {
            inner: Arc::new(Inner {
                policies,
                store,
                key_prefix: self
                    .key_prefix
                    .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
                trust_proxy: self.trust_proxy,
            }),
        })
    }
}

impl RateLimiter {
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    pub fn policies(&self) -> &PolicySet {
        &self.inner.policies
    }

    /// Match the request path to a policy and evaluate it
    pub async fn check(&self, request: &Parts) -> Result<Outcome> {
        let path = request.uri.path();

        match self.inner.policies.match_path(path) {
            Some(policy) => self.evaluate(policy, request).await,
            None => {
                debug!("No rate limit policy for path {}", path);
                Ok(Outcome::Bypass)
            }
        }
    }

    /// Evaluate a request against a specific policy
    ///
    /// Issues exactly one store call. Store errors are returned as-is.
    pub async fn evaluate(&self, policy: &Policy, request: &Parts) -> Result<Outcome> {
        if policy.is_skipped() {
            metrics::record_bypass(policy.scope());
            return Ok(Outcome::Bypass);
        }

        let Some(identity) = self.identify(policy, request)? else {
            debug!("No identity for request under policy {}", policy.scope());
            metrics::record_bypass(policy.scope());
            return Ok(Outcome::Bypass);
        };

        let key = RateLimitKey::new(policy.scope(), identity);
        let state = self
            .inner
            .store
            .consume(
                &key.to_store_key(&self.inner.key_prefix),
                policy.limit(),
                policy.window(),
            )
            .await?;

        let decision = Decision::from_window(state);

        debug!(
            "remaining {}/{} {}",
            decision.remaining, decision.total, key.identity
        );
        if !decision.allowed {
            warn!(
                "Rate limit exceeded for policy {}, identity: {}",
                policy.scope(),
                key.identity
            );
        }
        metrics::record_decision(policy.scope(), decision.allowed);

        Ok(Outcome::Limited(decision))
    }

    /// Derive the request identity; empty identities count as none
    ///
    /// The client IP is always expected to be known, so a request without a
    /// peer address is an error rather than a bypass.
    fn identify(&self, policy: &Policy, request: &Parts) -> Result<Option<String>> {
        let identity = match policy.identity_source() {
            IdentitySource::ClientIp => {
                let ip = client_ip(request, self.inner.trust_proxy).ok_or_else(|| {
                    error!(
                        "No client address for request under policy {}; serve with connect info",
                        policy.scope()
                    );
                    RateLimitError::Internal(
                        "client address unavailable; serve with connect info".to_string(),
                    )
                })?;
                Some(ip)
            }
            IdentitySource::Header(name) => request
                .headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
            IdentitySource::Custom(f) => f(request),
        };

        Ok(identity.filter(|id| !id.is_empty()))
    }
}

/// Client IP from the proxy header (when trusted) or the peer address
fn client_ip(request: &Parts, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = request
            .headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    request
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

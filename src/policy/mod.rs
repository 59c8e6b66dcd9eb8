//! Route policies and the policy matcher
//!
//! A [`PolicySet`] holds the configured policies in declaration order and
//! picks the one governing a request path. Patterns are shell-style globs
//! (`*`, `?`, `[...]`) matched against the whole path; the bare pattern `*`
//! is a catch-all that only applies when no specific pattern matched.

use crate::error::{RateLimitError, Result};
use glob::Pattern;
use http::request::Parts;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Pattern that marks a policy as the catch-all
pub const CATCH_ALL: &str = "*";

/// Default window length (one hour)
pub const DEFAULT_DURATION_MS: u64 = 3_600_000;

/// Default number of requests allowed per window
pub const DEFAULT_MAX_REQUESTS: u64 = 2500;

/// Longest accepted window (one year)
pub const MAX_DURATION_MS: u64 = 365 * 24 * 3_600_000;

/// Custom identity extractor. Returning `None` disables limiting for the request.
pub type IdentityFn = Arc<dyn Fn(&Parts) -> Option<String> + Send + Sync>;

/// Where the identity of a request comes from
#[derive(Clone, Default)]
pub enum IdentitySource {
    /// Client IP address
    #[default]
    ClientIp,
    /// Value of a request header
    Header(String),
    /// Caller supplied function
    Custom(IdentityFn),
}

impl fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::ClientIp => f.write_str("ClientIp"),
            IdentitySource::Header(name) => f.debug_tuple("Header").field(name).finish(),
            IdentitySource::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
enum MatchPattern {
    CatchAll,
    Glob(Pattern),
}

impl MatchPattern {
    fn compile(raw: &str) -> Result<Self> {
        if raw == CATCH_ALL {
            return Ok(MatchPattern::CatchAll);
        }

        Pattern::new(raw)
            .map(MatchPattern::Glob)
            .map_err(|e| RateLimitError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.msg.to_string(),
            })
    }
}

/// A rate limit policy for a group of routes
#[derive(Debug, Clone)]
pub struct Policy {
    name: Option<String>,
    scope: String,
    patterns: Vec<MatchPattern>,
    duration: Duration,
    max_requests: u64,
    identity: IdentitySource,
    skip: bool,
}

impl Policy {
    /// Create a policy for the given match patterns with default limits
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| MatchPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: None,
            scope: String::new(),
            patterns,
            duration: Duration::from_millis(DEFAULT_DURATION_MS),
            max_requests: DEFAULT_MAX_REQUESTS,
            identity: IdentitySource::default(),
            skip: false,
        })
    }

    /// Create a catch-all policy with default limits
    pub fn catch_all() -> Self {
        Self {
            name: None,
            scope: String::new(),
            patterns: vec![MatchPattern::CatchAll],
            duration: Duration::from_millis(DEFAULT_DURATION_MS),
            max_requests: DEFAULT_MAX_REQUESTS,
            identity: IdentitySource::default(),
            skip: false,
        }
    }

    /// Name the policy. Policies sharing a name share counters.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the window length
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the maximum number of requests per window
    pub fn max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set how the request identity is derived
    pub fn identity(mut self, identity: IdentitySource) -> Self {
        self.identity = identity;
        self
    }

    /// Use a custom identity function
    pub fn identity_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
    {
        self.identity(IdentitySource::Custom(Arc::new(f)))
    }

    /// Let matching requests through without limiting them
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Counter namespace for this policy, assigned when the policy joins a set
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn window(&self) -> Duration {
        self.duration
    }

    pub fn limit(&self) -> u64 {
        self.max_requests
    }

    pub fn identity_source(&self) -> &IdentitySource {
        &self.identity
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn is_catch_all(&self) -> bool {
        self.patterns
            .iter()
            .any(|p| matches!(p, MatchPattern::CatchAll))
    }

    fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(RateLimitError::Config(format!(
                "Policy '{}' must allow at least one request",
                self.scope
            )));
        }
        if self.duration.is_zero() {
            return Err(RateLimitError::Config(format!(
                "Policy '{}' window must be > 0",
                self.scope
            )));
        }
        if self.duration > Duration::from_millis(MAX_DURATION_MS) {
            return Err(RateLimitError::Config(format!(
                "Policy '{}' window must be at most {} ms",
                self.scope, MAX_DURATION_MS
            )));
        }
        if self.patterns.is_empty() {
            return Err(RateLimitError::Config(format!(
                "Policy '{}' has no match patterns",
                self.scope
            )));
        }
        Ok(())
    }
}

/// Ordered set of policies
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// Build a policy set, assigning each unnamed policy a positional scope
    pub fn new(policies: Vec<Policy>) -> Result<Self> {
        let policies = policies
            .into_iter()
            .enumerate()
            .map(|(index, mut policy)| {
                policy.scope = match &policy.name {
                    Some(name) => name.clone(),
                    None => format!("policy{}", index),
                };
                policy.validate()?;
                Ok(policy)
            })
            .collect::<Result<Vec<_>>>()?;

        let catch_alls: Vec<&str> = policies
            .iter()
            .filter(|p| p.is_catch_all())
            .map(|p| p.scope())
            .collect();
        if catch_alls.len() > 1 {
            warn!(
                "Multiple catch-all policies configured ({}); the last one governs unmatched paths",
                catch_alls.join(", ")
            );
        }

        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Find the policy governing a request path
    ///
    /// Specific patterns are tried in declaration order and the first hit
    /// wins. The catch-all is only returned when nothing else matched; if
    /// several policies declare it, the last one wins.
    pub fn match_path(&self, path: &str) -> Option<&Policy> {
        let mut catch_all = None;

        for policy in &self.policies {
            for pattern in &policy.patterns {
                match pattern {
                    MatchPattern::CatchAll => catch_all = Some(policy),
                    MatchPattern::Glob(glob) => {
                        if glob.matches(path) {
                            debug!("Path {} matched policy {}", path, policy.scope);
                            return Some(policy);
                        }
                    }
                }
            }
        }

        catch_all
    }
}

use crate::error::{RateLimitError, Result};
use crate::policy::{
    IdentitySource, Policy, CATCH_ALL, DEFAULT_DURATION_MS, DEFAULT_MAX_REQUESTS, MAX_DURATION_MS,
};
use crate::rate_limit::DEFAULT_KEY_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Redis counter store; the in-memory store is used when absent
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Prefix for counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Take the client IP from `X-Forwarded-For`
    #[serde(default)]
    pub trust_proxy: bool,
    /// Policies in matching order
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Counter scope name; defaults to the policy's position
    #[serde(default)]
    pub name: Option<String>,
    /// Glob patterns matched against the request path
    #[serde(default = "default_match_patterns", alias = "test")]
    pub match_patterns: Vec<String>,
    /// Window length in milliseconds
    #[serde(default = "default_duration_ms", alias = "duration")]
    pub duration_ms: u64,
    /// Requests allowed per window
    #[serde(default = "default_max_requests", alias = "max")]
    pub max_requests: u64,
    /// Header holding the identity; the client IP is used when absent
    #[serde(default)]
    pub identity_header: Option<String>,
    /// Let matching requests through unlimited
    #[serde(default)]
    pub skip: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_match_patterns() -> Vec<String> {
    vec![CATCH_ALL.to_string()]
}

fn default_duration_ms() -> u64 {
    DEFAULT_DURATION_MS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: None,
            match_patterns: default_match_patterns(),
            duration_ms: default_duration_ms(),
            max_requests: default_max_requests(),
            identity_header: None,
            skip: false,
        }
    }
}

impl PolicyConfig {
    /// Build the runtime policy
    pub fn to_policy(&self) -> Result<Policy> {
        let mut policy = Policy::new(&self.match_patterns)?
            .duration(Duration::from_millis(self.duration_ms))
            .max_requests(self.max_requests)
            .skip(self.skip);

        if let Some(name) = &self.name {
            policy = policy.named(name.clone());
        }
        if let Some(header) = &self.identity_header {
            policy = policy.identity(IdentitySource::Header(header.to_lowercase()));
        }

        Ok(policy)
    }
}

impl RateLimiterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RateLimitError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateLimitError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (index, policy) in self.policies.iter().enumerate() {
            let label = policy
                .name
                .clone()
                .unwrap_or_else(|| format!("#{}", index));

            if policy.max_requests == 0 {
                return Err(RateLimitError::Config(format!(
                    "Rate limit max_requests must be > 0 for policy: {}",
                    label
                )));
            }
            if policy.duration_ms == 0 {
                return Err(RateLimitError::Config(format!(
                    "Rate limit duration_ms must be > 0 for policy: {}",
                    label
                )));
            }
            if policy.duration_ms > MAX_DURATION_MS {
                return Err(RateLimitError::Config(format!(
                    "Rate limit duration_ms must be <= {} for policy: {}",
                    MAX_DURATION_MS, label
                )));
            }
            if policy.match_patterns.is_empty() {
                return Err(RateLimitError::Config(format!(
                    "match_patterns cannot be empty for policy: {}",
                    label
                )));
            }
            if matches!(&policy.identity_header, Some(h) if h.trim().is_empty()) {
                return Err(RateLimitError::Config(format!(
                    "identity_header cannot be empty for policy: {}",
                    label
                )));
            }
        }

        if self.key_prefix.is_empty() {
            return Err(RateLimitError::Config(
                "key_prefix cannot be empty".to_string(),
            ));
        }

        if let Some(redis) = &self.redis {
            if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                return Err(RateLimitError::Config(format!(
                    "Redis URL must start with redis:// or rediss://: {}",
                    redis.url
                )));
            }
        }

        Ok(())
    }

    /// Build the runtime policies in declaration order
    pub fn to_policies(&self) -> Result<Vec<Policy>> {
        self.policies.iter().map(PolicyConfig::to_policy).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 3000

redis:
  url: "redis://localhost:6379"

trust_proxy: true

policies:
  - match_patterns: ["*"]
    duration_ms: 1000
    max_requests: 1000
  - name: users
    test: ["/users", "/user"]
    max: 10
  - match_patterns: ["/skip/*"]
    skip: true
  - match_patterns: ["/api/*"]
    identity_header: X-API-Key
"#;

        let config = RateLimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.trust_proxy);
        assert_eq!(config.policies.len(), 4);
        assert_eq!(config.policies[1].name.as_deref(), Some("users"));
        assert_eq!(config.policies[1].match_patterns, vec!["/users", "/user"]);
        assert_eq!(config.policies[1].max_requests, 10);
        assert!(config.policies[2].skip);
        assert!(config.validate().is_ok());

        let policies = config.to_policies().unwrap();
        assert!(policies[0].is_catch_all());
        assert_eq!(policies[0].window(), Duration::from_millis(1000));
        assert!(matches!(
            policies[3].identity_source(),
            IdentitySource::Header(h) if h == "x-api-key"
        ));
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
policies:
  - {}
"#;

        let config = RateLimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.key_prefix, "limit");
        assert!(!config.trust_proxy);
        assert!(config.redis.is_none());

        let policy = &config.policies[0];
        assert_eq!(policy.match_patterns, vec!["*"]);
        assert_eq!(policy.duration_ms, 3_600_000);
        assert_eq!(policy.max_requests, 2500);
        assert!(!policy.skip);
        assert!(policy.identity_header.is_none());
    }

    #[test]
    fn test_validate_zero_max() {
        let config = RateLimiterConfig::from_yaml("policies:\n  - max_requests: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_duration() {
        let config = RateLimiterConfig::from_yaml("policies:\n  - duration_ms: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_oversized_duration() {
        let config = RateLimiterConfig::from_yaml(
            "policies:\n  - duration_ms: 18446744073709551615\n",
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config =
            RateLimiterConfig::from_yaml("policies:\n  - duration_ms: 31536000000\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_match_patterns() {
        let config =
            RateLimiterConfig::from_yaml("policies:\n  - match_patterns: []\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_redis_url() {
        let yaml = r#"
redis:
  url: "http://localhost:6379"
"#;
        let config = RateLimiterConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pattern_fails_policy_build() {
        let config = RateLimiterConfig {
            policies: vec![PolicyConfig {
                match_patterns: vec!["/api/[".to_string()],
                ..PolicyConfig::default()
            }],
            ..RateLimiterConfig::from_yaml("{}").unwrap()
        };

        assert!(config.validate().is_ok());
        assert!(matches!(
            config.to_policies(),
            Err(RateLimitError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratelimit.yaml");
        std::fs::write(&path, "policies:\n  - max_requests: 5\n").unwrap();

        let config = RateLimiterConfig::from_file(&path).unwrap();
        assert_eq!(config.policies[0].max_requests, 5);

        assert!(RateLimiterConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}

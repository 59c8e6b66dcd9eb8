//! Rate limiting module
//!
//! Per-route fixed window rate limiting for axum. Each request is matched to
//! a [`Policy`](crate::policy::Policy), its identity (client IP, a header, or
//! a custom function) is derived, and one slot is taken from the window kept
//! in a [`CounterStore`](crate::store::CounterStore).
//!
//! # Features
//!
//! - Glob route patterns with a catch-all fallback
//! - Counters scoped per policy, so routes never share quota
//! - Rate limit headers in responses (`X-RateLimit-*`, `Retry-After`)
//! - Redis or in-memory counter stores
//!
//! # Example
//!
//! ```rust,no_run
//! use route_ratelimit::policy::Policy;
//! use route_ratelimit::rate_limit::{rate_limit_middleware, RateLimiter};
//! use route_ratelimit::store::MemoryCounterStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> route_ratelimit::error::Result<()> {
//! let limiter = RateLimiter::builder()
//!     .policy(Policy::catch_all().max_requests(1000))
//!     .policy(
//!         Policy::new(["/users", "/user"])?
//!             .max_requests(10)
//!             .duration(Duration::from_secs(60)),
//!     )
//!     .store(Arc::new(MemoryCounterStore::new()))
//!     .build()?;
//!
//! let app: axum::Router = axum::Router::new()
//!     .route("/users", axum::routing::get(|| async { "users" }))
//!     .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod middleware;
pub mod types;

// Re-export commonly used types
pub use engine::{RateLimiter, RateLimiterBuilder, DEFAULT_KEY_PREFIX};
pub use middleware::{add_rate_limit_headers, format_duration_long, rate_limit_middleware};
pub use types::{Decision, Outcome, RateLimitKey};

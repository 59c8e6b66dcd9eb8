//! Fixed-window counter stores
//!
//! A [`CounterStore`] owns the per-key windows. Its single operation,
//! [`CounterStore::consume`], must be atomic: looking up the window,
//! creating it when missing or expired, and taking one slot happen as one
//! step in the store so concurrent requests for the same key never race.
//!
//! - [`RedisCounterStore`]: distributed store, one Lua script per request
//! - [`MemoryCounterStore`]: in-process store for tests and single-node use

pub mod lua_scripts;
pub mod memory;
pub mod redis;

pub use self::memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// Window state returned by a store for one consume call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Capacity of the window
    pub total: u64,
    /// Slots that were available when the request arrived
    pub remaining: u64,
    /// When the window resets, in epoch seconds
    pub reset_epoch_secs: u64,
}

/// Atomic fixed-window counter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Take one slot from the window at `key`
    ///
    /// Creates a fresh window of `max_requests` slots lasting `window` when
    /// none exists or the previous one expired. Never takes a slot from an
    /// exhausted window.
    async fn consume(&self, key: &str, max_requests: u64, window: Duration) -> Result<WindowState>;
}

/// Current wall-clock time in milliseconds since the epoch
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Window length in milliseconds, saturating at `u64::MAX`
pub(crate) fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

/// Reset time, in epoch seconds, of a window opened at `now_ms`
pub(crate) fn reset_epoch_secs(now_ms: u64, window: Duration) -> u64 {
    now_ms.saturating_add(window_millis(window)) / 1000
}

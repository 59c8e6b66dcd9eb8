use super::{epoch_millis, reset_epoch_secs, CounterStore, WindowState};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct Window {
    total: u64,
    remaining: u64,
    reset_epoch_secs: u64,
    /// `None` when the window outlasts what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Window {
    fn open(max_requests: u64, window: Duration, now: Instant) -> Self {
        Self {
            total: max_requests,
            remaining: max_requests,
            reset_epoch_secs: reset_epoch_secs(epoch_millis(), window),
            expires_at: now.checked_add(window),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process fixed window store
///
/// The map's per-entry lock is held across lookup, creation and decrement,
/// which gives the same atomicity the Redis script provides.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, Window>,
}

impl MemoryCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked windows, expired ones included until purged
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop windows whose time has elapsed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        let purged = before.saturating_sub(self.windows.len());
        if purged > 0 {
            debug!("Purged {} expired rate limit windows", purged);
        }
        purged
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn consume(&self, key: &str, max_requests: u64, window: Duration) -> Result<WindowState> {
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Opening rate limit window for key: {}", key);
                Window::open(max_requests, window, now)
            });

        if entry.is_expired(now) {
            debug!("Rate limit window expired for key: {}", key);
            *entry = Window::open(max_requests, window, now);
        }

        let available = entry.remaining;
        if available > 0 {
            entry.remaining -= 1;
        }

        Ok(WindowState {
            total: entry.total,
            remaining: available,
            reset_epoch_secs: entry.reset_epoch_secs,
        })
    }
}

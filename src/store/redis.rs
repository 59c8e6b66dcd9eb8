use super::lua_scripts::FIXED_WINDOW_SCRIPT;
use super::{epoch_millis, window_millis, CounterStore, WindowState};
use crate::error::{RateLimitError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{debug, error};

/// Redis-backed distributed fixed window store
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Redis connection manager
    connection: ConnectionManager,
    /// Window consumption script
    script: Script,
}

impl RedisCounterStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        })
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut connection)
            .await
            .map_err(RateLimitError::from)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn consume(&self, key: &str, max_requests: u64, window: Duration) -> Result<WindowState> {
        let mut connection = self.connection.clone();

        let result = self
            .script
            .key(key)
            .arg(max_requests)
            .arg(window_millis(window))
            .arg(epoch_millis())
            .invoke_async::<_, Vec<i64>>(&mut connection)
            .await
            .map_err(|e| {
                error!("Redis error during rate limit check for key {}: {}", key, e);
                RateLimitError::from(e)
            })?;

        let (total, remaining, reset) = match result.as_slice() {
            &[total, remaining, reset] => (total, remaining, reset),
            _ => {
                return Err(RateLimitError::Store(format!(
                    "Unexpected reply from window script: {:?}",
                    result
                )))
            }
        };

        debug!(
            "Fixed window check for key {}: total={}, remaining={}, reset={}",
            key, total, remaining, reset
        );

        Ok(WindowState {
            total: total.max(0) as u64,
            remaining: remaining.max(0) as u64,
            reset_epoch_secs: reset.max(0) as u64,
        })
    }
}

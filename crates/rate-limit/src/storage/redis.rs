//! Shared fixed-window counters in Redis.

use std::{future::Future, time::Duration};

use config::RedisConfig;

use super::{
    CounterState, CounterStore, StorageError,
    redis_pool::{self, Pool},
};

/// Increments the counter and arms its expiry on the first hit of a window, so the window is
/// anchored at the first request. Returns the new count and the remaining lifetime in
/// milliseconds.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return { count, ttl }
"#;

/// Redis-backed counter store, shared between every instance pointing at the same server.
pub struct RedisStorage {
    pool: Pool,
    script: redis::Script,
    key_prefix: String,
    response_timeout: Option<Duration>,
}

impl RedisStorage {
    /// Creates the connection pool and verifies the server answers a PING.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = redis_pool::create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let ping = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

            Ok(())
        };

        with_timeout(config.connection_timeout, ping).await?;

        Ok(Self {
            pool,
            script: redis::Script::new(INCREMENT_SCRIPT),
            key_prefix: config.key_prefix.clone(),
            response_timeout: config.response_timeout,
        })
    }

    /// Closes the pool. Pending and future checkouts fail.
    pub fn close(&self) {
        self.pool.close();
    }
}

impl CounterStore for RedisStorage {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterState, StorageError> {
        let key = format!("{}{key}", self.key_prefix);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);

        let call = async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

            let (count, ttl_ms): (u64, i64) = self
                .script
                .key(&key)
                .arg(window_ms)
                .invoke_async(&mut *conn)
                .await
                .map_err(|e| StorageError::Query(format!("Failed to increment counter: {e}")))?;

            Ok(CounterState {
                count,
                resets_in: Duration::from_millis(ttl_ms.max(0).unsigned_abs()),
            })
        };

        with_timeout(self.response_timeout, call).await
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| StorageError::Timeout(duration))?,
        None => future.await,
    }
}

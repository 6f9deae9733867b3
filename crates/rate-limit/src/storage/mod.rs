//! Counter stores backing the fixed-window guards.

use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use config::StorageConfig;

mod fallback;
pub mod memory;
pub mod redis;
mod redis_pool;

pub use fallback::FallbackStorage;
pub use memory::InMemoryStorage;

use self::redis::RedisStorage;

/// Counter value right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Number of requests counted in the current window, this one included.
    pub count: u64,
    /// Time left until the window closes and the counter starts over.
    pub resets_in: Duration,
}

/// Atomic increment-with-expiry contract shared by every backend.
pub trait CounterStore: Send + Sync {
    /// Increments the counter for `key`, opening a new window of length `window` when the
    /// previous one has elapsed. Concurrent increments of the same key are never lost.
    fn increment(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<CounterState, StorageError>> + Send;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No connection to the backend could be obtained.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The backend rejected or failed the command.
    #[error("Query error: {0}")]
    Query(String),
    /// The backend did not answer in time.
    #[error("Storage did not respond within {0:?}")]
    Timeout(Duration),
    /// Internal storage error.
    #[error("Storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Short, stable name of the error class, used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Connection(_) => "connection",
            StorageError::Query(_) => "query",
            StorageError::Timeout(_) => "timeout",
            StorageError::Internal(_) => "internal",
        }
    }
}

/// The counter store selected at startup.
pub struct Storage {
    backend: Backend,
    closed: AtomicBool,
}

enum Backend {
    /// Process-local counters.
    Memory(InMemoryStorage),
    /// Shared Redis counters, degrading to local counters during outages.
    Redis(FallbackStorage<RedisStorage>),
}

impl Storage {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            closed: AtomicBool::new(false),
        }
    }

    /// In-memory storage with default capacity.
    pub fn memory() -> Self {
        Self::new(Backend::Memory(InMemoryStorage::new()))
    }

    /// Connects the configured backend.
    ///
    /// Never fails: when Redis is not reachable the process continues with in-memory
    /// counters and logs the degradation.
    pub async fn connect(config: &StorageConfig) -> Self {
        let redis_config = match config {
            StorageConfig::Memory => {
                log::debug!("Using in-memory admission counters");
                return Self::memory();
            }
            StorageConfig::Redis(redis_config) => redis_config,
        };

        match RedisStorage::connect(redis_config).await {
            Ok(redis) => {
                log::info!("Using Redis admission counters");
                Self::new(Backend::Redis(FallbackStorage::new(redis)))
            }
            Err(e) => {
                log::warn!("Redis admission counters unavailable, falling back to in-memory counters: {e}");
                Self::memory()
            }
        }
    }

    /// Name of the active backend.
    pub fn backend(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    /// Releases the backend connections. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Backend::Redis(store) = &self.backend {
            store.primary().close();
            log::info!("Redis admission counter connections closed");
        }
    }

    /// Whether [`Storage::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl CounterStore for Storage {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterState, StorageError> {
        match &self.backend {
            Backend::Memory(storage) => storage.increment(key, window).await,
            Backend::Redis(store) => store.increment(key, window).await,
        }
    }
}

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use super::{CounterState, CounterStore, InMemoryStorage, StorageError};

/// Serves increments from a primary store, degrading to process-local counters while the
/// primary fails. Admission keeps working during an outage, with per-instance accuracy.
pub struct FallbackStorage<P> {
    primary: P,
    local: InMemoryStorage,
    degraded: AtomicBool,
}

impl<P> FallbackStorage<P> {
    /// Wraps `primary` with an empty local store.
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            local: InMemoryStorage::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// The wrapped primary store.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// Whether the last increment was served locally.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }
}

impl<P: CounterStore> CounterStore for FallbackStorage<P> {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterState, StorageError> {
        match self.primary.increment(key, window).await {
            Ok(state) => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    log::info!("Shared admission counters are reachable again");
                }

                Ok(state)
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    log::warn!("Shared admission counters unavailable, counting locally: {e}");
                } else {
                    log::debug!("Shared admission counters still unavailable: {e}");
                }

                telemetry::metrics::record_storage_fallback(e.kind());
                self.local.increment(key, window).await
            }
        }
    }
}

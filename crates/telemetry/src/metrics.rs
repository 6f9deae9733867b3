//! Metric instruments shared by the workspace crates.

mod names;

pub use names::*;

use std::sync::OnceLock;

use opentelemetry::{KeyValue, metrics::Counter};

/// Name of the meter every instrument is registered on.
pub const METER_NAME: &str = "turnstile";

/// Get the global meter for recording metrics
pub fn meter() -> opentelemetry::metrics::Meter {
    opentelemetry::global::meter(METER_NAME)
}

/// Counters shared by every recording call.
///
/// Built on first use from the global meter, so [`crate::init`] has to run before the first
/// request is recorded.
struct Instruments {
    admission_decisions: Counter<u64>,
    storage_fallbacks: Counter<u64>,
    client_attempts: Counter<u64>,
}

static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

fn instruments() -> &'static Instruments {
    INSTRUMENTS.get_or_init(|| {
        let meter = meter();

        Instruments {
            admission_decisions: meter.u64_counter(ADMISSION_DECISIONS).build(),
            storage_fallbacks: meter.u64_counter(STORAGE_FALLBACKS).build(),
            client_attempts: meter.u64_counter(CLIENT_ATTEMPTS).build(),
        }
    })
}

/// Records one admission decision.
///
/// `outcome` is one of `admitted`, `rejected`, `exempt` or `unmetered`; `guard` names the
/// guard that decided (`tier`, `burst` or `none`).
pub fn record_admission(outcome: &'static str, guard: &'static str, tier: &str) {
    let attributes = [
        KeyValue::new("outcome", outcome),
        KeyValue::new("guard", guard),
        KeyValue::new("tier", tier.to_string()),
    ];

    instruments().admission_decisions.add(1, &attributes);
}

/// Records a counter store call served by the local fallback.
pub fn record_storage_fallback(reason: &'static str) {
    instruments()
        .storage_fallbacks
        .add(1, &[KeyValue::new("reason", reason)]);
}

/// Records one outbound attempt of the client pipeline.
pub fn record_client_attempt(outcome: &'static str) {
    instruments()
        .client_attempts
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

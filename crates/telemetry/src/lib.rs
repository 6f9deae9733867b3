//! Telemetry library for Turnstile
//!
//! Provides OpenTelemetry counters for admission decisions, storage degradation and
//! outbound client attempts.

pub mod metrics;

use opentelemetry_sdk::metrics::SdkMeterProvider;

/// Guard that ensures proper cleanup of telemetry resources
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            log::error!("Failed to shutdown meter provider: {e}");
        }
    }
}

/// Install the global meter provider.
///
/// Returns a guard that should be kept alive for the duration of the application.
/// Metrics are recorded in-process; exporters are attached by the embedding application.
pub fn init() -> TelemetryGuard {
    let meter_provider = SdkMeterProvider::builder().build();
    opentelemetry::global::set_meter_provider(meter_provider.clone());

    log::debug!("Telemetry meter provider installed for '{}'", metrics::METER_NAME);

    TelemetryGuard { meter_provider }
}

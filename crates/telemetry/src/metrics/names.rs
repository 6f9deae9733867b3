//! Metric names.

/// Admission decisions, by outcome, guard and tier.
pub const ADMISSION_DECISIONS: &str = "turnstile.admission.decisions";

/// Counter store increments served locally because the distributed backend failed.
pub const STORAGE_FALLBACKS: &str = "turnstile.storage.fallbacks";

/// Outbound client attempts, by outcome.
pub const CLIENT_ATTEMPTS: &str = "turnstile.client.attempts";

//! Admission control for turnstile.
//!
//! Requests are counted in fixed windows per caller and tier, with an independent burst
//! guard keyed by network identity. Counters live in a [`CounterStore`]: Redis when it is
//! configured and reachable, process memory otherwise.

#![deny(missing_docs)]

mod context;
mod error;
mod exemption;
mod manager;
mod policy;
pub mod storage;
mod tier;

pub use context::{ANONYMOUS, CallerContext, CallerContextBuilder};
pub use error::RateLimitError;
pub use exemption::ExemptionRules;
pub use manager::{AdmissionManager, AdmissionOutcome, GuardKind, Quota, Rejection};
pub use policy::{BURST_TIER, WindowPolicy};
pub use storage::{CounterState, CounterStore, FallbackStorage, InMemoryStorage, Storage, StorageError};
pub use tier::TierResolver;

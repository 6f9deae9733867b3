//! Admission decisions: the tier guard composed with the burst guard.

use std::{sync::Arc, time::Duration};

use config::AdmissionConfig;
use sha2::{Digest, Sha256};

use crate::{
    CallerContext, RateLimitError, TierResolver, WindowPolicy,
    storage::{CounterStore, Storage},
};

/// Which fixed-window guard produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    /// Short window keyed by network identity.
    Burst,
    /// Tier window keyed by tier and caller identity.
    Tier,
}

impl GuardKind {
    /// Name used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            GuardKind::Burst => "burst",
            GuardKind::Tier => "tier",
        }
    }
}

/// Counter state of one guard after a request was counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// The guard this quota belongs to.
    pub guard: GuardKind,
    /// Tier id of the applied policy.
    pub tier: String,
    /// Human readable tier name.
    pub label: String,
    /// Requests admitted per window.
    pub limit: u32,
    /// Length of the window.
    pub window: Duration,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the window resets.
    pub resets_in: Duration,
}

impl Quota {
    /// Whole seconds until the window resets, rounded up.
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.resets_in.as_secs();

        if self.resets_in.subsec_nanos() > 0 { secs + 1 } else { secs }
    }
}

/// A request that exceeded a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Quota of the guard that rejected the request.
    pub quota: Quota,
}

impl Rejection {
    /// Seconds the caller must wait before retrying. Never zero.
    pub fn retry_after_secs(&self) -> u64 {
        self.quota.reset_after_secs().max(1)
    }

    /// Human readable explanation for the caller.
    pub fn message(&self) -> String {
        let secs = self.retry_after_secs();

        match self.quota.guard {
            GuardKind::Burst => {
                format!("Too many requests in a short period. Please slow down and retry in {secs} seconds.")
            }
            GuardKind::Tier => format!(
                "Rate limit exceeded for the {} tier ({} requests per {} seconds). Please retry in {secs} seconds.",
                self.quota.label,
                self.quota.limit,
                self.quota.window.as_secs(),
            ),
        }
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The request bypasses admission. Nothing was counted.
    Exempt,
    /// The request is within its ceilings.
    Admitted(Quota),
    /// The counter store failed; the request is admitted without being metered.
    Unmetered,
    /// The request exceeded a ceiling.
    Rejected(Rejection),
}

enum Verdict {
    Within(Quota),
    Exceeded(Quota),
    Unmetered,
}

/// Evaluates requests against the burst guard and their tier's window policy.
pub struct AdmissionManager<S = Storage> {
    resolver: TierResolver,
    burst: Option<WindowPolicy>,
    storage: Arc<S>,
}

impl AdmissionManager<Storage> {
    /// Builds the manager from configuration on top of an already connected store.
    pub fn from_config(config: &AdmissionConfig, storage: Arc<Storage>) -> Result<Self, RateLimitError> {
        let resolver = TierResolver::from_config(config)?;
        let burst = WindowPolicy::from_burst(&config.burst)?;

        Ok(Self::new(resolver, burst, storage))
    }
}

impl<S: CounterStore> AdmissionManager<S> {
    /// Creates a manager over an injected counter store.
    pub fn new(resolver: TierResolver, burst: Option<WindowPolicy>, storage: Arc<S>) -> Self {
        Self {
            resolver,
            burst,
            storage,
        }
    }

    /// The counter store.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// The tier resolver.
    pub fn resolver(&self) -> &TierResolver {
        &self.resolver
    }

    /// Counts the request and decides whether it is admitted.
    ///
    /// Exempt callers never touch the store. Both guards count every metered request;
    /// when both reject, the one that resets first is reported.
    pub async fn check(&self, context: &CallerContext) -> AdmissionOutcome {
        let Some(policy) = self.resolver.resolve(context) else {
            telemetry::metrics::record_admission("exempt", "none", "none");
            return AdmissionOutcome::Exempt;
        };

        let burst = match &self.burst {
            Some(burst) => {
                let key = format!("burst:{}", digest(&context.network_identity));
                Some(self.count(GuardKind::Burst, &key, burst).await)
            }
            None => None,
        };

        let key = format!("tier:{}:{}", policy.tier(), digest(&context.identity));
        let tier = self.count(GuardKind::Tier, &key, policy).await;

        let outcome = compose(burst, tier);

        match &outcome {
            AdmissionOutcome::Rejected(rejection) => {
                log::debug!(
                    "Rejected request from '{}' by the {} guard, retry in {}s",
                    context.identity,
                    rejection.quota.guard.as_str(),
                    rejection.retry_after_secs()
                );

                telemetry::metrics::record_admission("rejected", rejection.quota.guard.as_str(), policy.tier());
            }
            AdmissionOutcome::Admitted(quota) => {
                log::debug!(
                    "Admitted request from '{}' on tier '{}', {} remaining",
                    context.identity,
                    quota.tier,
                    quota.remaining
                );

                telemetry::metrics::record_admission("admitted", "tier", policy.tier());
            }
            AdmissionOutcome::Unmetered => {
                telemetry::metrics::record_admission("unmetered", "none", policy.tier());
            }
            AdmissionOutcome::Exempt => (),
        }

        outcome
    }

    async fn count(&self, guard: GuardKind, key: &str, policy: &WindowPolicy) -> Verdict {
        let state = match self.storage.increment(key, policy.window()).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Admission counter unavailable, admitting request unmetered: {e}");
                return Verdict::Unmetered;
            }
        };

        let limit = u64::from(policy.limit());
        let remaining = u32::try_from(limit.saturating_sub(state.count)).unwrap_or(0);

        let quota = Quota {
            guard,
            tier: policy.tier().to_string(),
            label: policy.label().to_string(),
            limit: policy.limit(),
            window: policy.window(),
            remaining,
            resets_in: state.resets_in,
        };

        if state.count <= limit {
            Verdict::Within(quota)
        } else {
            Verdict::Exceeded(quota)
        }
    }
}

fn compose(burst: Option<Verdict>, tier: Verdict) -> AdmissionOutcome {
    let burst_rejection = match burst {
        Some(Verdict::Exceeded(quota)) => Some(quota),
        _ => None,
    };

    match (burst_rejection, tier) {
        (Some(burst), Verdict::Exceeded(tier)) => {
            let quota = if tier.resets_in < burst.resets_in { tier } else { burst };
            AdmissionOutcome::Rejected(Rejection { quota })
        }
        (Some(quota), _) | (None, Verdict::Exceeded(quota)) => AdmissionOutcome::Rejected(Rejection { quota }),
        (None, Verdict::Within(quota)) => AdmissionOutcome::Admitted(quota),
        (None, Verdict::Unmetered) => AdmissionOutcome::Unmetered,
    }
}

fn digest(identity: &str) -> String {
    format!("{:x}", Sha256::digest(identity.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::storage::{CounterState, InMemoryStorage, StorageError};

    use super::*;

    fn policy(tier: &str, window: u64, limit: u32) -> WindowPolicy {
        WindowPolicy::new(tier, Duration::from_secs(window), limit, tier.to_uppercase()).unwrap()
    }

    fn manager(tier: WindowPolicy, burst: Option<WindowPolicy>) -> AdmissionManager<InMemoryStorage> {
        let resolver = TierResolver::new([tier.clone()], tier.tier()).unwrap();
        AdmissionManager::new(resolver, burst, Arc::new(InMemoryStorage::new()))
    }

    fn caller(identity: &str) -> CallerContext {
        CallerContext::builder()
            .identity(identity)
            .network_identity("10.0.0.1")
            .build()
    }

    fn remaining(outcome: AdmissionOutcome) -> u32 {
        match outcome {
            AdmissionOutcome::Admitted(quota) => quota.remaining,
            other => unreachable!("expected admission, got {other:?}"),
        }
    }

    fn rejection(outcome: AdmissionOutcome) -> Rejection {
        match outcome {
            AdmissionOutcome::Rejected(rejection) => rejection,
            other => unreachable!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_admits_exactly_limit_requests() {
        let manager = manager(policy("free", 900, 5), None);
        let caller = caller("alice");

        for _ in 0..5 {
            assert!(matches!(manager.check(&caller).await, AdmissionOutcome::Admitted(_)));
        }

        let rejection = rejection(manager.check(&caller).await);

        assert_eq!(rejection.quota.remaining, 0);
        assert_eq!(rejection.quota.limit, 5);
        assert_eq!(rejection.quota.guard, GuardKind::Tier);
    }

    #[tokio::test(start_paused = true)]
    async fn window_reset_restarts_the_count() {
        let manager = manager(policy("free", 60, 2), None);
        let caller = caller("alice");

        manager.check(&caller).await;
        manager.check(&caller).await;
        rejection(manager.check(&caller).await);

        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(remaining(manager.check(&caller).await), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callers_do_not_share_counters() {
        let manager = manager(policy("free", 60, 1), None);

        manager.check(&caller("alice")).await;
        rejection(manager.check(&caller("alice")).await);

        assert_eq!(remaining(manager.check(&caller("bob")).await), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_guard_rejects_before_tier_is_exhausted() {
        let manager = manager(policy("premium", 900, 1000), Some(policy("burst", 10, 10)));

        for i in 0..10 {
            let context = caller("alice");
            assert_eq!(remaining(manager.check(&context).await), 999 - i);
            tokio::time::advance(Duration::from_millis(500)).await;
        }

        let rejection = rejection(manager.check(&caller("alice")).await);

        assert_eq!(rejection.quota.guard, GuardKind::Burst);
        assert_eq!(rejection.retry_after_secs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_guard_ignores_claimed_identity_and_tier() {
        let manager = manager(policy("free", 900, 100), Some(policy("burst", 10, 2)));

        let first = CallerContext::builder().identity("a").network_identity("10.0.0.9").build();
        let second = CallerContext::builder().identity("b").network_identity("10.0.0.9").tier("premium").build();
        let third = CallerContext::builder().identity("c").network_identity("10.0.0.9").build();

        manager.check(&first).await;
        manager.check(&second).await;

        assert_eq!(rejection(manager.check(&third).await).quota.guard, GuardKind::Burst);
    }

    #[tokio::test(start_paused = true)]
    async fn shortest_retry_after_wins_when_both_guards_reject() {
        let manager = manager(policy("free", 60, 1), Some(policy("burst", 10, 1)));
        let caller = caller("alice");

        manager.check(&caller).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        let rejection = rejection(manager.check(&caller).await);

        assert_eq!(rejection.quota.guard, GuardKind::Burst);
        assert_eq!(rejection.retry_after_secs(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn tier_rejection_wins_when_it_resets_first() {
        let manager = manager(policy("free", 60, 1), Some(policy("burst", 10, 1)));
        let caller = caller("alice");

        manager.check(&caller).await;
        tokio::time::advance(Duration::from_secs(55)).await;

        // Burst window reopened at 55s: admitted by burst, rejected by tier.
        let rejection = rejection(manager.check(&caller).await);
        assert_eq!(rejection.quota.guard, GuardKind::Tier);
        assert_eq!(rejection.retry_after_secs(), 5);

        let rejection = self::rejection(manager.check(&caller).await);
        assert_eq!(rejection.quota.guard, GuardKind::Tier);
    }

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStorage,
        writes: AtomicU64,
    }

    impl CounterStore for CountingStore {
        async fn increment(&self, key: &str, window: Duration) -> Result<CounterState, StorageError> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.inner.increment(key, window).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exempt_callers_never_touch_the_store() {
        let tier = policy("free", 60, 1);
        let resolver = TierResolver::new([tier], "free").unwrap();
        let manager = AdmissionManager::new(resolver, Some(policy("burst", 10, 1)), Arc::new(CountingStore::default()));

        let admin = CallerContext::builder().identity("root").role("admin").exempt(true).build();

        for _ in 0..50 {
            assert_eq!(manager.check(&admin).await, AdmissionOutcome::Exempt);
        }

        assert_eq!(manager.storage().writes.load(Ordering::Relaxed), 0);
    }

    struct BrokenStore;

    impl CounterStore for BrokenStore {
        async fn increment(&self, _: &str, _: Duration) -> Result<CounterState, StorageError> {
            Err(StorageError::Internal("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let tier = policy("free", 60, 1);
        let resolver = TierResolver::new([tier], "free").unwrap();
        let manager = AdmissionManager::new(resolver, Some(policy("burst", 10, 1)), Arc::new(BrokenStore));

        for _ in 0..3 {
            assert_eq!(manager.check(&caller("alice")).await, AdmissionOutcome::Unmetered);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sixty_second_window_scenario() {
        let manager = manager(policy("free", 60, 3), None);
        let caller = caller("alice");

        let remaining: Vec<_> = [
            manager.check(&caller).await,
            manager.check(&caller).await,
            manager.check(&caller).await,
        ]
        .into_iter()
        .map(self::remaining)
        .collect();

        assert_eq!(remaining, [2, 1, 0]);

        tokio::time::advance(Duration::from_secs(10)).await;

        let rejection = rejection(manager.check(&caller).await);
        assert_eq!(rejection.retry_after_secs(), 50);
        assert_eq!(rejection.quota.remaining, 0);
        assert_eq!(rejection.quota.limit, 3);

        tokio::time::advance(Duration::from_secs(51)).await;

        assert_eq!(self::remaining(manager.check(&caller).await), 2);
    }

    #[test]
    fn tier_message_names_the_tier() {
        let rejection = Rejection {
            quota: Quota {
                guard: GuardKind::Tier,
                tier: "free".to_string(),
                label: "Free".to_string(),
                limit: 100,
                window: Duration::from_secs(900),
                remaining: 0,
                resets_in: Duration::from_millis(41_200),
            },
        };

        assert_eq!(rejection.retry_after_secs(), 42);
        assert_eq!(
            rejection.message(),
            "Rate limit exceeded for the Free tier (100 requests per 900 seconds). Please retry in 42 seconds."
        );
    }
}

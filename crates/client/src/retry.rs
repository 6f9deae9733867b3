use std::time::Duration;

use config::RetryConfig;

/// Linear backoff: the retry after the n-th failed attempt (counting from zero) waits
/// `base_delay * (n + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Builds the policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay)
    }

    /// Total attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retrying after the failed attempt with index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Attempt bookkeeping of one logical call.
#[derive(Debug)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Attempts sent so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    pub fn next_delay(&self) -> Option<Duration> {
        (self.attempts < self.policy.max_attempts).then(|| self.policy.delay(self.attempts - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..4).map(|attempt| policy.delay(attempt).as_millis()).collect();

        assert_eq!(delays, [1000, 2000, 3000, 4000]);
    }

    #[test]
    fn budget_counts_the_first_attempt() {
        let mut state = RetryState::new(RetryPolicy::new(3, Duration::from_millis(100)));
        let mut delays = Vec::new();

        loop {
            state.record_attempt();

            match state.next_delay() {
                Some(delay) => delays.push(delay),
                None => break,
            }
        }

        assert_eq!(state.attempts(), 3);
        assert_eq!(delays, [Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[test]
    fn zero_attempts_still_sends_once() {
        let mut state = RetryState::new(RetryPolicy::new(0, Duration::from_secs(1)));
        state.record_attempt();

        assert_eq!(state.next_delay(), None);
    }
}

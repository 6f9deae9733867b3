use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use config::ThrottleConfig;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct WindowState {
    window_start: Option<Instant>,
    count: u32,
}

/// Client side fixed window, shared by every call made through one client.
#[derive(Debug)]
pub struct ClientThrottleWindow {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl ClientThrottleWindow {
    /// Creates a window admitting `limit` sends per `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Builds the window from configuration.
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.limit, config.window)
    }

    /// Sends allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reserves a send. On refusal returns the time until the window resets.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let window_start = match state.window_start {
            Some(start) if now.duration_since(start) <= self.window => start,
            _ => {
                state.window_start = Some(now);
                state.count = 0;
                now
            }
        };

        if state.count >= self.limit {
            return Err((window_start + self.window).saturating_duration_since(now));
        }

        state.count += 1;

        Ok(())
    }
}

//! Request throttling for sync runs.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct WindowState {
    remaining: u32,
    window_start: Instant,
}

/// Fixed-window request budget.
///
/// Grants up to `capacity` permits per window; when the window is
/// spent, `acquire` sleeps until the next window opens. Suspension
/// happens only at the acquire point, matching the engine's
/// cooperative scheduling model.
pub struct RequestBudget {
    capacity: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RequestBudget {
    /// Create a budget of `capacity` requests per `window`.
    /// A zero capacity is treated as one request per window.
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            state: Mutex::new(WindowState {
                remaining: capacity,
                window_start: Instant::now(),
            }),
        }
    }

    /// Create a budget of N requests per minute.
    #[must_use]
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Take one permit, waiting for the next window if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.window_start.elapsed();
                if elapsed >= self.window {
                    state.remaining = self.capacity;
                    state.window_start = Instant::now();
                }
                if state.remaining > 0 {
                    state.remaining -= 1;
                    return;
                }
                self.window - elapsed
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one permit without waiting. Returns false when the current
    /// window is spent.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.window_start.elapsed() >= self.window {
            state.remaining = self.capacity;
            state.window_start = Instant::now();
        }
        if state.remaining > 0 {
            state.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Permits left in the current window.
    pub async fn remaining(&self) -> u32 {
        self.state.lock().await.remaining
    }
}

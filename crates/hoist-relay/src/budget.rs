//! Sliding-window restart budget.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hoist_config::RestartPolicy;

/// Allows at most `max_restarts` restarts inside any `window`.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    max_restarts: u32,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RestartBudget {
    /// Creates an empty budget.
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
            history: VecDeque::new(),
        }
    }

    /// Records a restart at `now` if the budget allows one.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.expire(now);
        if self.history.len() >= self.max_restarts as usize {
            return false;
        }
        self.history.push_back(now);
        true
    }

    /// Restarts still available at `now`.
    pub fn remaining(&mut self, now: Instant) -> u32 {
        self.expire(now);
        let used = u32::try_from(self.history.len()).unwrap_or(u32::MAX);
        self.max_restarts.saturating_sub(used)
    }

    fn expire(&mut self, now: Instant) {
        while self
            .history
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= self.window)
        {
            self.history.pop_front();
        }
    }
}

impl From<RestartPolicy> for RestartBudget {
    fn from(policy: RestartPolicy) -> Self {
        Self::new(policy.max_restarts, policy.window)
    }
}

//! Bounded discovery retry after the host opens a detail view.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    /// Not armed.
    #[default]
    Idle,
    /// Waiting for the next attempt.
    Pending { attempts: u32 },
    /// Attempt budget spent; waits for the next trigger.
    Exhausted,
}

/// What the caller should do after a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Try again after [`RetryLoop::interval`].
    Again,
    GiveUp,
}

/// Fixed-interval, capped-attempt retry state machine.
#[derive(Debug, Clone)]
pub struct RetryLoop {
    interval: Duration,
    max_attempts: u32,
    state: RetryState,
}

impl RetryLoop {
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            state: RetryState::Idle,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Whether another attempt is due.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, RetryState::Pending { .. })
    }

    /// Start a fresh attempt budget.
    pub fn arm(&mut self) {
        self.state = if self.max_attempts == 0 {
            RetryState::Exhausted
        } else {
            RetryState::Pending { attempts: 0 }
        };
    }

    /// Count a failed attempt.
    pub fn record_miss(&mut self) -> RetryStep {
        match self.state {
            RetryState::Pending { attempts } if attempts + 1 < self.max_attempts => {
                self.state = RetryState::Pending {
                    attempts: attempts + 1,
                };
                RetryStep::Again
            }
            RetryState::Pending { .. } => {
                self.state = RetryState::Exhausted;
                RetryStep::GiveUp
            }
            RetryState::Idle | RetryState::Exhausted => RetryStep::GiveUp,
        }
    }

    /// A successful attempt ends the loop.
    pub fn finish(&mut self) {
        self.state = RetryState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_max_attempts() {
        let mut retry = RetryLoop::new(Duration::from_millis(150), 3);
        retry.arm();
        assert_eq!(retry.record_miss(), RetryStep::Again);
        assert_eq!(retry.record_miss(), RetryStep::Again);
        assert_eq!(retry.record_miss(), RetryStep::GiveUp);
        assert_eq!(retry.state(), RetryState::Exhausted);
        assert!(!retry.is_pending());
    }

    #[test]
    fn rearming_resets_budget() {
        let mut retry = RetryLoop::new(Duration::from_millis(150), 2);
        retry.arm();
        retry.record_miss();
        retry.arm();
        assert_eq!(retry.state(), RetryState::Pending { attempts: 0 });
        retry.finish();
        assert_eq!(retry.state(), RetryState::Idle);
    }

    #[test]
    fn zero_budget_never_pends() {
        let mut retry = RetryLoop::new(Duration::from_millis(150), 0);
        retry.arm();
        assert!(!retry.is_pending());
    }
}

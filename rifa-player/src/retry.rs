//! Retry budget: bounded reconnect attempts plus an unbounded, two-tier
//! waiting schedule.
//!
//! Each playback session owns exactly one budget; there is no cross-session
//! state. Both counters reset together, exactly on the transition into
//! Playing.

use std::time::Duration;

use crate::config::RetryConfig;

/// Per-session attempt counters and delay schedule
#[derive(Debug, Clone)]
pub struct RetryBudget {
    config: RetryConfig,
    reconnect_attempts: u32,
    waiting_attempts: u32,
}

impl RetryBudget {
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            reconnect_attempts: 0,
            waiting_attempts: 0,
        }
    }

    /// True while another reconnect attempt is allowed. Exhaustion is
    /// terminal; only a manual retry (which recreates the budget) continues.
    #[must_use]
    pub const fn should_retry_reconnect(&self) -> bool {
        self.reconnect_attempts < self.config.max_reconnect_attempts
    }

    /// Record a reconnect attempt and return the new count.
    pub const fn record_reconnect_attempt(&mut self) -> u32 {
        self.reconnect_attempts += 1;
        self.reconnect_attempts
    }

    /// Record a waiting-for-source attempt and return the new count.
    /// Waiting is never terminal.
    pub const fn record_waiting_attempt(&mut self) -> u32 {
        self.waiting_attempts += 1;
        self.waiting_attempts
    }

    /// True once waiting attempts have passed the threshold; the user-facing
    /// message changes and the delay switches to the long tier.
    #[must_use]
    pub const fn waiting_exceeded(&self) -> bool {
        self.waiting_attempts > self.config.max_waiting_attempts
    }

    /// Delay before the next waiting-for-source reload: short tier while the
    /// threshold has not been exceeded, long tier after, indefinitely.
    #[must_use]
    pub const fn waiting_delay(&self) -> Duration {
        if self.waiting_exceeded() {
            self.config.waiting_delay_long()
        } else {
            self.config.waiting_delay_short()
        }
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        self.config.reconnect_delay()
    }

    #[must_use]
    pub const fn rebind_delay(&self) -> Duration {
        self.config.rebind_delay()
    }

    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    #[must_use]
    pub const fn waiting_attempts(&self) -> u32 {
        self.waiting_attempts
    }

    #[must_use]
    pub const fn max_reconnect_attempts(&self) -> u32 {
        self.config.max_reconnect_attempts
    }

    /// Reset both counters. Called exactly on entering Playing from any
    /// non-Playing state.
    pub const fn reset(&mut self) {
        self.reconnect_attempts = 0;
        self.waiting_attempts = 0;
    }
}

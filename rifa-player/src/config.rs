//! Playback retry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and delay policy for a playback session.
///
/// Reconnection after an established session is bounded and terminal on
/// exhaustion; waiting for a broadcast that has not started is unbounded with
/// a two-tier delay schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum reconnect attempts after a confirmed network error
    pub max_reconnect_attempts: u32,

    /// Delay before each reconnect attempt (milliseconds)
    pub reconnect_delay_ms: u64,

    /// Waiting attempts before the delay escalates to the long tier
    pub max_waiting_attempts: u32,

    /// Waiting-for-source delay while under the threshold (milliseconds)
    pub waiting_delay_short_ms: u64,

    /// Waiting-for-source delay once the threshold is exceeded (milliseconds)
    pub waiting_delay_long_ms: u64,

    /// Delay before re-binding a video track after a decode exception
    /// (milliseconds, real-time transport only)
    pub rebind_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 3000,
            max_waiting_attempts: 10,
            waiting_delay_short_ms: 5000,
            waiting_delay_long_ms: 10_000,
            rebind_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn waiting_delay_short(&self) -> Duration {
        Duration::from_millis(self.waiting_delay_short_ms)
    }

    #[must_use]
    pub const fn waiting_delay_long(&self) -> Duration {
        Duration::from_millis(self.waiting_delay_long_ms)
    }

    #[must_use]
    pub const fn rebind_delay(&self) -> Duration {
        Duration::from_millis(self.rebind_delay_ms)
    }
}

//! Session timing configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ActivityKind;

/// Upper bound for every configured duration. Larger values would overflow
/// `Instant` arithmetic.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing and activity settings for the coordinator.
///
/// Every duration is configuration rather than a constant: deployments
/// tune them to the backend's token lifetime. The defaults assume a
/// 30-minute token: 25 minutes of inactivity plus a 60-second warning
/// keeps the forced logout ahead of the backend's own expiry, and a
/// 10-minute refresh keeps active users comfortably inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time before the warning countdown starts.
    pub inactivity_timeout: Duration,

    /// Length of the warning countdown. Whole seconds only; any fraction
    /// is dropped by [`validated`](Self::validated).
    pub warning_duration: Duration,

    /// Period of the background credential refresh. Zero disables it.
    pub refresh_interval: Duration,

    /// Period of the backend status check. Zero disables it.
    pub status_poll_interval: Duration,

    /// Interaction signals that count as activity.
    pub activity_signals: BTreeSet<ActivityKind>,

    /// Max random delay added to the first refresh and status tick.
    pub timer_jitter: Duration,

    /// Capacity of the command channel into the coordinator task.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(25 * 60),
            warning_duration: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(10 * 60),
            status_poll_interval: Duration::from_secs(60),
            activity_signals: ActivityKind::DEFAULT_SET.into_iter().collect(),
            timer_jitter: Duration::from_millis(500),
            command_buffer: 32,
        }
    }
}

impl SessionConfig {
    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`spawn`](crate::spawn). Rules:
    /// - `inactivity_timeout` is at least one second.
    /// - `warning_duration` is truncated to whole seconds.
    /// - every duration is at most [`MAX_DURATION`].
    /// - `command_buffer` is at least one.
    pub fn validated(mut self) -> Self {
        for (name, value) in [
            ("inactivity_timeout", &mut self.inactivity_timeout),
            ("warning_duration", &mut self.warning_duration),
            ("refresh_interval", &mut self.refresh_interval),
            ("status_poll_interval", &mut self.status_poll_interval),
            ("timer_jitter", &mut self.timer_jitter),
        ] {
            if *value > MAX_DURATION {
                warn!(
                    field = name,
                    max_secs = MAX_DURATION.as_secs(),
                    "duration above the maximum; clamping"
                );
                *value = MAX_DURATION;
            }
        }
        if self.inactivity_timeout < Duration::from_secs(1) {
            warn!(
                inactivity_timeout_ms = self.inactivity_timeout.as_millis() as u64,
                "inactivity_timeout below one second; clamping"
            );
            self.inactivity_timeout = Duration::from_secs(1);
        }
        if self.warning_duration.subsec_nanos() != 0 {
            warn!(
                warning_duration_ms = self.warning_duration.as_millis() as u64,
                "warning_duration is not whole seconds; truncating"
            );
            self.warning_duration = Duration::from_secs(self.warning_duration.as_secs());
        }
        if self.command_buffer == 0 {
            self.command_buffer = 1;
        }
        if self.activity_signals.is_empty() {
            warn!("no activity signals observed; only explicit on_activity() resets the timer");
        }
        self
    }

    /// Countdown start value shown in the warning notice.
    pub fn warning_seconds(&self) -> u32 {
        u32::try_from(self.warning_duration.as_secs()).unwrap_or(u32::MAX)
    }
}

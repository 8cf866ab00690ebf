//! The timer set owned by one authenticated epoch.
//!
//! Four timers, one owner:
//!
//! | timer          | kind               | runs while                       |
//! |----------------|--------------------|----------------------------------|
//! | inactivity     | one-shot deadline  | counting inactivity              |
//! | warning        | 1 s countdown      | warning phase                    |
//! | refresh        | periodic           | authenticated, not in warning    |
//! | status poll    | periodic           | authenticated                    |
//!
//! Every timer is a plain value inside [`TimerSet`]. Cancelling means
//! overwriting the value, so a timer can never be "scheduled twice", and
//! dropping the set cancels everything at once. The warning notice is
//! held by a [`NoticeGuard`] that dismisses it on drop, so no exit path
//! can leave a toast behind.

use std::sync::Arc;
use std::time::Duration;

use memegen_tick::{PeriodicTimer, TimerConfig};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{NoticeHandle, Notifier, SessionConfig};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// InactivityPhase
// ---------------------------------------------------------------------------

/// State of the inactivity sub-machine.
///
/// ```text
/// Idle ──(login)──→ CountingInactivity ──(timeout)──→ Warning ──(0 s)──→ Expired
///                          ↑                             │
///                          └─────────(activity)──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InactivityPhase {
    /// No session; no timers.
    Idle,
    /// Waiting for the inactivity deadline.
    CountingInactivity,
    /// Countdown notice is showing.
    Warning,
    /// Countdown ran out; logout is under way.
    Expired,
}

// ---------------------------------------------------------------------------
// NoticeGuard
// ---------------------------------------------------------------------------

/// Owns a live notice. Dismisses it exactly once: explicitly through
/// [`dismiss`](Self::dismiss) or implicitly on drop.
pub(crate) struct NoticeGuard<N: Notifier> {
    notifier: Arc<N>,
    handle: Option<NoticeHandle>,
}

impl<N: Notifier> NoticeGuard<N> {
    fn show(notifier: &Arc<N>, seconds: u32) -> Self {
        let handle = notifier.warn(seconds);
        Self {
            notifier: Arc::clone(notifier),
            handle: Some(handle),
        }
    }

    fn update(&self, seconds: u32) {
        if let Some(handle) = self.handle {
            self.notifier.update(handle, seconds);
        }
    }

    fn handle(&self) -> Option<NoticeHandle> {
        self.handle
    }

    fn dismiss(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.notifier.dismiss(handle);
        }
    }
}

impl<N: Notifier> Drop for NoticeGuard<N> {
    fn drop(&mut self) {
        self.release();
    }
}

struct WarningCountdown<N: Notifier> {
    remaining: u32,
    next_tick: Instant,
    notice: NoticeGuard<N>,
}

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// What happened when the inactivity deadline was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WarningStart {
    /// Countdown started with this notice.
    Started(NoticeHandle),
    /// Zero-length warning: log out now.
    Expired,
}

/// What a countdown tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CountdownStep {
    /// Still counting; the notice now shows this many seconds.
    Continue(u32),
    /// Reached zero; the notice was dismissed.
    Finished,
    /// No countdown was running (cancelled before the tick was handled).
    Stale,
}

// ---------------------------------------------------------------------------
// TimerStatus
// ---------------------------------------------------------------------------

/// Diagnostic snapshot of the coordinator's timers and latches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerStatus {
    pub epoch: u64,
    pub phase: InactivityPhase,
    /// Seconds left on the warning notice, if one is showing.
    pub warning_remaining: Option<u32>,
    /// Whether an inactivity deadline is armed.
    pub inactivity_armed: bool,
    pub refresh_paused: bool,
    pub refresh_in_flight: bool,
    pub status_in_flight: bool,
}

// ---------------------------------------------------------------------------
// TimerSet
// ---------------------------------------------------------------------------

/// All timers of one authenticated epoch, plus the refresh and status
/// latches.
pub(crate) struct TimerSet<N: Notifier> {
    epoch: u64,
    phase: InactivityPhase,
    inactivity_timeout: Duration,
    inactivity: Option<Instant>,
    warning: Option<WarningCountdown<N>>,
    pub(crate) refresh: PeriodicTimer,
    pub(crate) status_poll: PeriodicTimer,
    /// Start of the current refresh cycle. Activity before this instant
    /// does not justify a refresh.
    refresh_window_start: Instant,
    refresh_in_flight: bool,
    status_in_flight: bool,
}

impl<N: Notifier> TimerSet<N> {
    /// A set with nothing scheduled. Used while no session is active.
    pub(crate) fn idle(epoch: u64) -> Self {
        Self {
            epoch,
            phase: InactivityPhase::Idle,
            inactivity_timeout: Duration::ZERO,
            inactivity: None,
            warning: None,
            refresh: PeriodicTimer::disabled("refresh"),
            status_poll: PeriodicTimer::disabled("status-poll"),
            refresh_window_start: Instant::now(),
            refresh_in_flight: false,
            status_in_flight: false,
        }
    }

    /// Starts counting inactivity and both periodic timers.
    pub(crate) fn start(epoch: u64, config: &SessionConfig) -> Self {
        let now = Instant::now();
        debug!(
            epoch,
            inactivity_s = config.inactivity_timeout.as_secs(),
            "timer set started"
        );
        Self {
            epoch,
            phase: InactivityPhase::CountingInactivity,
            inactivity_timeout: config.inactivity_timeout,
            inactivity: now.checked_add(config.inactivity_timeout),
            warning: None,
            refresh: PeriodicTimer::new(
                TimerConfig::new("refresh", config.refresh_interval)
                    .with_jitter(config.timer_jitter),
            ),
            status_poll: PeriodicTimer::new(
                TimerConfig::new("status-poll", config.status_poll_interval)
                    .with_jitter(config.timer_jitter),
            ),
            refresh_window_start: now,
            refresh_in_flight: false,
            status_in_flight: false,
        }
    }

    pub(crate) fn phase(&self) -> InactivityPhase {
        self.phase
    }

    pub(crate) fn inactivity_deadline(&self) -> Option<Instant> {
        self.inactivity
    }

    pub(crate) fn warning_deadline(&self) -> Option<Instant> {
        self.warning.as_ref().map(|w| w.next_tick)
    }

    /// Resets the inactivity cycle.
    ///
    /// Replaces the deadline (never adds one), drops any countdown, which
    /// dismisses its notice, and resumes refresh. Returns `true` if a
    /// warning was cancelled. A no-op unless a session is counting or
    /// warning.
    pub(crate) fn on_activity(&mut self) -> bool {
        if !matches!(
            self.phase,
            InactivityPhase::CountingInactivity | InactivityPhase::Warning
        ) {
            return false;
        }

        self.inactivity = Instant::now().checked_add(self.inactivity_timeout);
        let cancelled = match self.warning.take() {
            Some(countdown) => {
                countdown.notice.dismiss();
                true
            }
            None => false,
        };
        self.refresh.resume();
        self.phase = InactivityPhase::CountingInactivity;

        if cancelled {
            info!(epoch = self.epoch, "activity during warning; countdown cancelled");
        }
        cancelled
    }

    /// The inactivity deadline was reached: show the notice and start
    /// the countdown. Refresh is paused for the duration.
    pub(crate) fn enter_warning(&mut self, seconds: u32, notifier: &Arc<N>) -> WarningStart {
        self.inactivity = None;
        self.refresh.pause();

        if seconds == 0 {
            self.phase = InactivityPhase::Expired;
            return WarningStart::Expired;
        }

        // A previous countdown cannot exist here, but replacing it would
        // still dismiss its notice through the guard.
        let notice = NoticeGuard::show(notifier, seconds);
        let handle = notice.handle();
        self.warning = Some(WarningCountdown {
            remaining: seconds,
            next_tick: Instant::now() + COUNTDOWN_STEP,
            notice,
        });
        self.phase = InactivityPhase::Warning;

        match handle {
            Some(handle) => WarningStart::Started(handle),
            None => WarningStart::Expired,
        }
    }

    /// Advances the countdown by one second.
    pub(crate) fn warning_tick(&mut self) -> CountdownStep {
        let Some(countdown) = self.warning.as_mut() else {
            return CountdownStep::Stale;
        };

        countdown.remaining = countdown.remaining.saturating_sub(1);
        if countdown.remaining > 0 {
            countdown.notice.update(countdown.remaining);
            countdown.next_tick += COUNTDOWN_STEP;
            return CountdownStep::Continue(countdown.remaining);
        }

        if let Some(countdown) = self.warning.take() {
            countdown.notice.dismiss();
        }
        self.phase = InactivityPhase::Expired;
        CountdownStep::Finished
    }

    /// Closes the current refresh cycle and returns when it began.
    pub(crate) fn take_refresh_window(&mut self) -> Instant {
        std::mem::replace(&mut self.refresh_window_start, Instant::now())
    }

    /// Sets the refresh latch. Returns `false` if it was already set.
    pub(crate) fn try_begin_refresh(&mut self) -> bool {
        !std::mem::replace(&mut self.refresh_in_flight, true)
    }

    pub(crate) fn end_refresh(&mut self) {
        self.refresh_in_flight = false;
    }

    /// Sets the status latch. Returns `false` if it was already set.
    pub(crate) fn try_begin_status(&mut self) -> bool {
        !std::mem::replace(&mut self.status_in_flight, true)
    }

    pub(crate) fn end_status(&mut self) {
        self.status_in_flight = false;
    }

    pub(crate) fn status(&self) -> TimerStatus {
        TimerStatus {
            epoch: self.epoch,
            phase: self.phase,
            warning_remaining: self.warning.as_ref().map(|w| w.remaining),
            inactivity_armed: self.inactivity.is_some(),
            refresh_paused: self.refresh.is_paused(),
            refresh_in_flight: self.refresh_in_flight,
            status_in_flight: self.status_in_flight,
        }
    }
}

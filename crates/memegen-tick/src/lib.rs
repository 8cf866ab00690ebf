//! Timer primitives for the memegen session core.
//!
//! Two building blocks, both meant to live inside an actor's
//! `tokio::select!` loop:
//!
//! - [`PeriodicTimer`]: a repeating timer that can be paused, resumed
//!   and restarted. A zero period disables it: [`PeriodicTimer::wait_for_tick`]
//!   then pends forever and `select!` simply never picks that branch.
//! - [`wait_until`]: sleeps until an optional deadline. `None` pends
//!   forever, which is how a cancelled one-shot timer looks to `select!`.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     let inactivity = timers.inactivity_deadline();
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = memegen_tick::wait_until(inactivity) => { /* deadline hit */ }
//!         tick = refresh.wait_for_tick() => { /* periodic work */ }
//!     }
//! }
//! ```
//!
//! Because the loop re-reads deadlines on every iteration, cancelling a
//! timer is just clearing its `Option`. A cancelled timer cannot fire late.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Sleeps until `deadline`, or forever if there is none.
///
/// Use it for one-shot timers held as `Option<Instant>`.
pub async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`PeriodicTimer`].
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Name used in log lines (`"refresh"`, `"status-poll"`).
    pub label: &'static str,
    /// Time between ticks. `Duration::ZERO` disables the timer.
    pub period: Duration,
    /// Random delay (0–max) added to the *first* tick only, so that
    /// several clients started together do not hit the backend in lockstep.
    pub initial_jitter: Duration,
}

impl TimerConfig {
    /// A timer with the given label and period and no jitter.
    pub fn new(label: &'static str, period: Duration) -> Self {
        Self {
            label,
            period,
            initial_jitter: Duration::ZERO,
        }
    }

    /// Sets the first-tick jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// `true` when the period is zero and the timer never fires.
    pub fn is_disabled(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`PeriodicTimer::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// How late the tick fired relative to its deadline.
    pub late_by: Duration,
    /// Whole periods that elapsed unobserved, e.g. while the host was
    /// suspended. Missed periods are collapsed into this one tick.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A repeating timer driven by `tokio::time`.
///
/// Missed ticks are never replayed: after a late wake-up the next tick
/// is scheduled one period from *now*.
#[derive(Debug)]
pub struct PeriodicTimer {
    config: TimerConfig,
    tick_count: u64,
    /// When the next tick is due. `None` while disabled.
    next_tick: Option<Instant>,
    paused: bool,
}

impl PeriodicTimer {
    /// Creates and starts a timer. The first tick is due after one period
    /// plus the configured jitter.
    pub fn new(config: TimerConfig) -> Self {
        let next_tick = first_deadline(&config);

        if config.is_disabled() {
            debug!(timer = config.label, "periodic timer disabled (zero period)");
        } else {
            debug!(
                timer = config.label,
                period_ms = config.period.as_millis() as u64,
                "periodic timer started"
            );
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            paused: false,
        }
    }

    /// Creates a timer that can never fire. Placeholder for "no session".
    pub fn disabled(label: &'static str) -> Self {
        Self::new(TimerConfig::new(label, Duration::ZERO))
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever while paused or disabled; `select!` keeps serving
    /// its other branches.
    pub async fn wait_for_tick(&mut self) -> Tick {
        let next = match self.next_tick {
            Some(next) if !self.paused => next,
            _ => return std::future::pending::<Tick>().await,
        };
        let period = self.config.period;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = if late_by > period / 10 {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                timer = self.config.label,
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "timer fired late; collapsing missed ticks"
            );
        }

        self.next_tick = now.checked_add(period);

        trace!(timer = self.config.label, tick = self.tick_count, "tick fired");

        Tick {
            tick: self.tick_count,
            late_by,
            ticks_skipped,
        }
    }

    /// Stops ticks until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(timer = self.config.label, tick = self.tick_count, "timer paused");
        }
    }

    /// Resumes after [`pause`](Self::pause). The next tick is one full
    /// period from now, so a long pause does not produce a burst.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.restart();
            debug!(timer = self.config.label, tick = self.tick_count, "timer resumed");
        }
    }

    /// Pushes the next deadline to one period from now without changing
    /// the paused flag.
    pub fn restart(&mut self) {
        if !self.config.is_disabled() {
            self.next_tick = Instant::now().checked_add(self.config.period);
        }
    }

    /// Whether the timer is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the timer has a zero period.
    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// When the next tick is due, or `None` if paused or disabled.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.paused { None } else { self.next_tick }
    }
}

fn first_deadline(config: &TimerConfig) -> Option<Instant> {
    if config.is_disabled() {
        return None;
    }
    let max_us = config.initial_jitter.as_micros() as u64;
    let jitter = if max_us > 0 {
        Duration::from_micros(rand::rng().random_range(0..max_us))
    } else {
        Duration::ZERO
    };
    let deadline = Instant::now()
        .checked_add(config.period)
        .and_then(|at| at.checked_add(jitter));
    if deadline.is_none() {
        warn!(timer = config.label, "period out of range; timer will never fire");
    }
    deadline
}

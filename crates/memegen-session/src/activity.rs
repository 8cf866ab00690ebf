//! Activity monitor: turns raw interaction signals into inactivity resets.
//!
//! The presentation layer forwards every pointer/key/touch signal it sees
//! to [`ActivityMonitor::signal`]. The monitor filters by the configured
//! signal set, stores the instant synchronously, and wakes the
//! coordinator through a `watch` channel. A burst of a thousand mouse
//! moves between two coordinator wake-ups therefore costs one reset,
//! not a thousand.
//!
//! The monitor is *armed* only while a session is authenticated. A
//! disarmed monitor drops signals, so nothing reaches the coordinator
//! after logout.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

/// Interaction signal types the monitor can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    PointerMove,
    Click,
    KeyPress,
    Touch,
    Scroll,
}

impl ActivityKind {
    /// Every signal kind.
    pub const ALL: [Self; 5] = [
        Self::PointerMove,
        Self::Click,
        Self::KeyPress,
        Self::Touch,
        Self::Scroll,
    ];

    /// The default observed set. Pointer movement is left out: it fires
    /// at frame rate and a click or key press is a better sign of a
    /// present user.
    pub const DEFAULT_SET: [Self; 4] = [Self::Click, Self::KeyPress, Self::Touch, Self::Scroll];
}

/// Cheap-to-clone handle that records user activity.
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    observed: BTreeSet<ActivityKind>,
    armed: AtomicBool,
    last: watch::Sender<Instant>,
}

impl ActivityMonitor {
    /// Creates a disarmed monitor observing `observed`.
    pub fn new(observed: BTreeSet<ActivityKind>) -> Self {
        let (last, _) = watch::channel(Instant::now());
        Self {
            inner: Arc::new(Inner {
                observed,
                armed: AtomicBool::new(false),
                last,
            }),
        }
    }

    /// Records an interaction signal.
    ///
    /// Returns `true` if it counted as activity: the kind is observed and
    /// a session is active.
    pub fn signal(&self, kind: ActivityKind) -> bool {
        if !self.inner.observed.contains(&kind) {
            trace!(?kind, "activity signal not observed");
            return false;
        }
        self.touch()
    }

    /// Records activity regardless of kind. Used for explicit
    /// `on_activity()` calls ("stay signed in" buttons and the like).
    pub fn touch(&self) -> bool {
        if !self.inner.armed.load(Ordering::Acquire) {
            return false;
        }
        self.inner.last.send_replace(Instant::now());
        true
    }

    /// When activity was last recorded.
    pub fn last_activity(&self) -> Instant {
        *self.inner.last.borrow()
    }

    /// Whether `kind` is in the observed set.
    pub fn observes(&self, kind: ActivityKind) -> bool {
        self.inner.observed.contains(&kind)
    }

    /// Whether signals are currently being recorded.
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    /// Starts recording. Entering a session counts as activity.
    pub(crate) fn arm(&self) {
        self.inner.last.send_replace(Instant::now());
        self.inner.armed.store(true, Ordering::Release);
    }

    /// Stops recording. Idempotent.
    pub(crate) fn disarm(&self) {
        self.inner.armed.store(false, Ordering::Release);
    }

    /// A receiver that wakes whenever activity is recorded.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Instant> {
        self.inner.last.subscribe()
    }
}

impl std::fmt::Debug for ActivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityMonitor")
            .field("observed", &self.inner.observed)
            .field("armed", &self.is_armed())
            .finish()
    }
}

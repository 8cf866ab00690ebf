//! External expiry signal: "the backend just rejected us".
//!
//! The HTTP layer raises the signal whenever an authenticated request
//! comes back 401. The coordinator owns the only [`ExpiryListener`] and
//! selects on it next to its timers, so a 401 ends the session without
//! waiting for any local timer.
//!
//! The channel holds one pending signal. Ten requests failing at once
//! queue one signal; the rest are dropped, which is fine because logout
//! is idempotent.

use tokio::sync::mpsc;
use tracing::trace;

/// Creates the signal/listener pair.
///
/// Only one listener exists per pair. Handing it to
/// [`spawn`](crate::spawn) moves it into the coordinator.
pub fn expiry_channel() -> (ExpirySignal, ExpiryListener) {
    let (tx, rx) = mpsc::channel(1);
    (ExpirySignal { tx }, ExpiryListener { rx })
}

/// Sending half, cloned into every HTTP client that needs it.
#[derive(Debug, Clone)]
pub struct ExpirySignal {
    tx: mpsc::Sender<()>,
}

impl ExpirySignal {
    /// Raises the signal. Never blocks; a signal already pending absorbs
    /// this one.
    pub fn raise(&self) {
        if self.tx.try_send(()).is_err() {
            trace!("expiry signal already pending or listener gone");
        }
    }
}

/// Receiving half, consumed by the coordinator.
#[derive(Debug)]
pub struct ExpiryListener {
    rx: mpsc::Receiver<()>,
}

impl ExpiryListener {
    /// Waits for the next signal. Returns `None` once every
    /// [`ExpirySignal`] has been dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

//! The session coordinator: one Tokio task that owns the session.
//!
//! Everything that can change the session funnels into a single
//! `select!` loop:
//!
//! ```text
//!   ActivityMonitor ──watch──┐
//!   ExpirySignal ───mpsc(1)──┤
//!   SessionHandle ───mpsc────┼──→ SessionActor ──→ Notifier
//!   spawned port calls ──────┤        │
//!   TimerSet deadlines ──────┘        └──→ CredentialPort (spawned)
//! ```
//!
//! The actor never awaits the network itself. Port calls run in their own
//! tasks and report back as [`Completion`]s tagged with the epoch they
//! started in; a completion from an epoch that has since ended is
//! discarded. That is what keeps a refresh response arriving after logout
//! from resurrecting anything.
//!
//! The loop is `biased`: pending activity is handled before anything else
//! in the same wake-up, so a warning tick that became due at the same
//! moment as a click sees the reset, not the countdown.

use std::future::Future;
use std::sync::Arc;

use memegen_tick::wait_until;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::timers::{CountdownStep, InactivityPhase, TimerSet, WarningStart};
use crate::{
    ActivityMonitor, CredentialError, CredentialPort, Credentials, ExpiryListener, LogoutReason,
    Notifier, SessionConfig, SessionError, SessionEvent, SessionSnapshot, SessionState,
    SessionStatus, TimerStatus, User,
};

const EVENT_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Requests from the presentation layer.
pub(crate) enum Command {
    Initialize {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Login {
        credentials: Credentials,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    Logout {
        reason: LogoutReason,
        reply: oneshot::Sender<()>,
    },
    Revalidate {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Inspect {
        reply: oneshot::Sender<TimerStatus>,
    },
    Shutdown,
}

/// Results of spawned port calls.
enum Completion {
    Initialized {
        outcome: Result<Option<User>, CredentialError>,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    LoggedIn {
        epoch: u64,
        outcome: Result<Option<User>, CredentialError>,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    Revalidated {
        epoch: u64,
        outcome: Result<Option<User>, CredentialError>,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Refreshed {
        epoch: u64,
        outcome: Result<(), CredentialError>,
    },
    StatusPolled {
        epoch: u64,
        outcome: Result<Option<SessionStatus>, CredentialError>,
    },
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running coordinator.
///
/// Cheap to clone. When the last clone is dropped the coordinator tears
/// down its timers and stops, exactly as after [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    activity: ActivityMonitor,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Runs the initial validation and returns the resulting snapshot.
    ///
    /// Only the first call validates. Later calls return the current
    /// snapshot straight away, even while the first is still pending.
    pub async fn initialize(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Initialize { reply }).await
    }

    /// Logs in and starts a session.
    ///
    /// # Errors
    /// - [`SessionError::StillValidating`] before `initialize` resolved
    /// - [`SessionError::AlreadyAuthenticated`] while a session is active
    /// - [`SessionError::LoginInProgress`] while another login runs
    /// - [`SessionError::LoginFailed`] / [`SessionError::NoSession`] when
    ///   the backend says no
    pub async fn login(&self, credentials: Credentials) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Login { credentials, reply })
            .await?
    }

    /// Ends the session. Safe to call any number of times; only the first
    /// call in a session does anything. Returns once the backend revoke
    /// attempt has finished. Never fails.
    pub async fn logout(&self, reason: LogoutReason) {
        if let Err(e) = self.request(|reply| Command::Logout { reason, reply }).await {
            debug!(error = %e, %reason, "logout after coordinator stopped");
        }
    }

    /// Re-reads the user from the backend without touching timers.
    pub async fn revalidate(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Revalidate { reply }).await
    }

    /// Records explicit activity. Returns `false` when no session is
    /// active.
    pub fn on_activity(&self) -> bool {
        self.activity.touch()
    }

    /// The activity monitor to feed raw interaction signals into.
    pub fn activity(&self) -> &ActivityMonitor {
        &self.activity
    }

    /// The current session snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that wakes on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Login/logout notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Timer and latch diagnostics.
    pub async fn inspect(&self) -> Result<TimerStatus, SessionError> {
        self.request(|reply| Command::Inspect { reply }).await
    }

    /// Stops the coordinator. Timers are cancelled and any notice is
    /// dismissed; the backend session is left alone.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Starts a coordinator task and returns its handle.
///
/// The coordinator starts in `Validating`; call
/// [`SessionHandle::initialize`] to resolve it. `expiry` is consumed here:
/// one listener per coordinator lifetime.
pub fn spawn<C, N>(
    config: SessionConfig,
    port: Arc<C>,
    notifier: Arc<N>,
    expiry: ExpiryListener,
) -> SessionHandle
where
    C: CredentialPort,
    N: Notifier,
{
    let config = config.validated();
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();
    let state = SessionState::Validating;
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(&state, 0));
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

    let activity = ActivityMonitor::new(config.activity_signals.clone());
    let activity_rx = activity.subscribe();

    let actor = SessionActor {
        config,
        port,
        notifier,
        state,
        epoch: 0,
        timers: TimerSet::idle(0),
        activity: activity.clone(),
        activity_rx,
        expiry,
        commands: cmd_rx,
        completions_tx,
        completions_rx,
        snapshot_tx,
        events_tx: events_tx.clone(),
        initialized: false,
        login_in_flight: false,
        revalidating: false,
    };

    tokio::spawn(actor.run());

    SessionHandle {
        commands: cmd_tx,
        activity,
        snapshot: snapshot_rx,
        events: events_tx,
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

struct SessionActor<C: CredentialPort, N: Notifier> {
    config: SessionConfig,
    port: Arc<C>,
    notifier: Arc<N>,
    state: SessionState,
    epoch: u64,
    timers: TimerSet<N>,
    activity: ActivityMonitor,
    activity_rx: watch::Receiver<Instant>,
    expiry: ExpiryListener,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    initialized: bool,
    login_in_flight: bool,
    revalidating: bool,
}

impl<C: CredentialPort, N: Notifier> SessionActor<C, N> {
    async fn run(mut self) {
        info!("session coordinator started");

        loop {
            let inactivity = self.timers.inactivity_deadline();
            let warning = self.timers.warning_deadline();

            tokio::select! {
                biased;

                changed = self.activity_rx.changed() => {
                    if changed.is_ok() {
                        self.activity_rx.borrow_and_update();
                        self.on_activity();
                    }
                }
                Some(()) = self.expiry.recv() => {
                    self.on_external_expiry();
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(done) = self.completions_rx.recv() => {
                    self.handle_completion(done);
                }
                _ = wait_until(warning) => {
                    self.on_warning_tick();
                }
                _ = wait_until(inactivity) => {
                    self.on_inactivity_elapsed();
                }
                _ = self.timers.refresh.wait_for_tick() => {
                    self.on_refresh_tick();
                }
                _ = self.timers.status_poll.wait_for_tick() => {
                    self.on_status_tick();
                }
            }
        }

        self.teardown_timers();
        info!(epoch = self.epoch, "session coordinator stopped");
    }

    // -- Commands ------------------------------------------------------------

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Initialize { reply } => self.handle_initialize(reply),
            Command::Login { credentials, reply } => self.handle_login(credentials, reply),
            Command::Logout { reason, reply } => self.logout(reason, Some(reply)),
            Command::Revalidate { reply } => self.handle_revalidate(reply),
            Command::Inspect { reply } => {
                let _ = reply.send(self.timers.status());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    fn handle_initialize(&mut self, reply: oneshot::Sender<SessionSnapshot>) {
        if self.initialized {
            debug!(state = %self.state, "initialize already called; ignoring");
            let _ = reply.send(self.snapshot());
            return;
        }
        self.initialized = true;

        self.spawn_call(
            |port| async move { port.validate().await },
            move |outcome| Completion::Initialized { outcome, reply },
        );
    }

    fn handle_login(
        &mut self,
        credentials: Credentials,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    ) {
        let rejection = match &self.state {
            SessionState::Validating => Some(SessionError::StillValidating),
            SessionState::Authenticated(_) => Some(SessionError::AlreadyAuthenticated),
            SessionState::Unauthenticated if self.login_in_flight => {
                Some(SessionError::LoginInProgress)
            }
            SessionState::Unauthenticated => None,
        };
        if let Some(err) = rejection {
            debug!(error = %err, "login rejected");
            let _ = reply.send(Err(err));
            return;
        }

        self.login_in_flight = true;
        let epoch = self.epoch;
        debug!(username = %credentials.username, "login started");

        self.spawn_call(
            move |port| async move {
                port.login(&credentials).await?;
                port.validate().await
            },
            move |outcome| Completion::LoggedIn {
                epoch,
                outcome,
                reply,
            },
        );
    }

    fn handle_revalidate(&mut self, reply: oneshot::Sender<SessionSnapshot>) {
        if !self.state.is_authenticated() || self.revalidating {
            debug!(
                state = %self.state,
                in_flight = self.revalidating,
                "revalidate ignored"
            );
            let _ = reply.send(self.snapshot());
            return;
        }
        self.revalidating = true;
        let epoch = self.epoch;

        self.spawn_call(
            |port| async move { port.validate().await },
            move |outcome| Completion::Revalidated {
                epoch,
                outcome,
                reply,
            },
        );
    }

    // -- Completions ---------------------------------------------------------

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Initialized { outcome, reply } => {
                self.finish_initialize(outcome);
                let _ = reply.send(self.snapshot());
            }
            Completion::LoggedIn {
                epoch,
                outcome,
                reply,
            } => {
                let result = self.finish_login(epoch, outcome);
                let _ = reply.send(result);
            }
            Completion::Revalidated {
                epoch,
                outcome,
                reply,
            } => {
                self.finish_revalidate(epoch, outcome);
                let _ = reply.send(self.snapshot());
            }
            Completion::Refreshed { epoch, outcome } => self.finish_refresh(epoch, outcome),
            Completion::StatusPolled { epoch, outcome } => self.finish_status(epoch, outcome),
        }
    }

    fn finish_initialize(&mut self, outcome: Result<Option<User>, CredentialError>) {
        if !self.state.is_validating() {
            return;
        }
        match outcome {
            Ok(Some(user)) => self.enter_authenticated(user),
            Ok(None) => {
                info!("no existing session");
                self.state = SessionState::Unauthenticated;
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "initial validation failed; treating as signed out");
                self.state = SessionState::Unauthenticated;
                self.publish();
            }
        }
    }

    fn finish_login(
        &mut self,
        epoch: u64,
        outcome: Result<Option<User>, CredentialError>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.login_in_flight = false;
        if epoch != self.epoch || !matches!(self.state, SessionState::Unauthenticated) {
            debug!(epoch, current = self.epoch, "stale login result discarded");
            return Err(SessionError::Superseded);
        }
        match outcome {
            Ok(Some(user)) => {
                self.enter_authenticated(user);
                Ok(self.snapshot())
            }
            Ok(None) => {
                warn!("login accepted but validation found no session");
                Err(SessionError::NoSession)
            }
            Err(e) => {
                info!(error = %e, "login failed");
                Err(SessionError::LoginFailed(e))
            }
        }
    }

    fn finish_revalidate(&mut self, epoch: u64, outcome: Result<Option<User>, CredentialError>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "stale revalidation discarded");
            return;
        }
        self.revalidating = false;
        match outcome {
            Ok(Some(user)) => {
                if self.state.user() != Some(&user) {
                    debug!(user_id = %user.id, "user record updated");
                    self.state = SessionState::Authenticated(user);
                    self.publish();
                }
            }
            Ok(None) => {
                info!("revalidation found no session");
                self.logout(LogoutReason::BackendExpired, None);
            }
            Err(e) if e.is_authoritative() => {
                info!(error = %e, "revalidation rejected");
                self.logout(LogoutReason::BackendExpired, None);
            }
            Err(e) => {
                warn!(error = %e, "revalidation failed; keeping current state");
            }
        }
    }

    fn finish_refresh(&mut self, epoch: u64, outcome: Result<(), CredentialError>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "stale refresh result discarded");
            return;
        }
        self.timers.end_refresh();
        match outcome {
            Ok(()) => debug!(epoch, "credential refreshed"),
            Err(e) if e.is_authoritative() => {
                info!(epoch, error = %e, "refresh rejected by backend");
                self.logout(LogoutReason::BackendExpired, None);
            }
            Err(e) => warn!(epoch, error = %e, "refresh failed; retrying next cycle"),
        }
    }

    fn finish_status(
        &mut self,
        epoch: u64,
        outcome: Result<Option<SessionStatus>, CredentialError>,
    ) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "stale status result discarded");
            return;
        }
        self.timers.end_status();
        match outcome {
            Ok(Some(status)) if status.is_expired() => {
                info!(
                    epoch,
                    remaining = status.remaining_seconds,
                    "backend reports credential expired"
                );
                self.logout(LogoutReason::BackendExpired, None);
            }
            Ok(Some(status)) => {
                trace!(epoch, remaining = status.remaining_seconds, "status ok");
            }
            Ok(None) => trace!(epoch, "backend reported no expiry"),
            Err(e) if e.is_authoritative() => {
                info!(epoch, error = %e, "status check rejected");
                self.logout(LogoutReason::BackendExpired, None);
            }
            Err(e) => warn!(epoch, error = %e, "status check failed"),
        }
    }

    // -- Timers and signals --------------------------------------------------

    fn on_activity(&mut self) {
        if !self.state.is_authenticated() {
            return;
        }
        self.timers.on_activity();
        trace!(epoch = self.epoch, "inactivity timer reset");
    }

    fn on_external_expiry(&mut self) {
        if !self.state.is_authenticated() {
            debug!(state = %self.state, "expiry signal with no active session; ignoring");
            return;
        }
        info!(epoch = self.epoch, "backend rejected a request; ending session");
        self.logout(LogoutReason::ExternalExpiry, None);
    }

    fn on_inactivity_elapsed(&mut self) {
        let seconds = self.config.warning_seconds();
        match self.timers.enter_warning(seconds, &self.notifier) {
            WarningStart::Started(handle) => {
                info!(epoch = self.epoch, %handle, seconds, "inactivity timeout; warning shown");
            }
            WarningStart::Expired => {
                info!(epoch = self.epoch, "inactivity timeout with no warning period");
                self.logout(LogoutReason::Inactivity, None);
            }
        }
    }

    fn on_warning_tick(&mut self) {
        match self.timers.warning_tick() {
            CountdownStep::Continue(remaining) => {
                trace!(epoch = self.epoch, remaining, "warning countdown");
            }
            CountdownStep::Finished => {
                info!(epoch = self.epoch, "warning countdown elapsed");
                self.logout(LogoutReason::Inactivity, None);
            }
            CountdownStep::Stale => {}
        }
    }

    fn on_refresh_tick(&mut self) {
        if !self.state.is_authenticated() {
            return;
        }
        let window_start = self.timers.take_refresh_window();
        if self.timers.phase() == InactivityPhase::Warning {
            debug!(epoch = self.epoch, "refresh skipped during warning");
            return;
        }
        if self.activity.last_activity() < window_start {
            debug!(epoch = self.epoch, "refresh skipped; no activity since last cycle");
            return;
        }
        if !self.timers.try_begin_refresh() {
            debug!(epoch = self.epoch, "refresh already in flight; skipping");
            return;
        }

        let epoch = self.epoch;
        self.spawn_call(
            |port| async move { port.refresh().await },
            move |outcome| Completion::Refreshed { epoch, outcome },
        );
    }

    fn on_status_tick(&mut self) {
        if !self.state.is_authenticated() {
            return;
        }
        if !self.timers.try_begin_status() {
            debug!(epoch = self.epoch, "status check already in flight; skipping");
            return;
        }

        let epoch = self.epoch;
        self.spawn_call(
            |port| async move { port.status().await },
            move |outcome| Completion::StatusPolled { epoch, outcome },
        );
    }

    // -- Transitions ---------------------------------------------------------

    fn enter_authenticated(&mut self, user: User) {
        self.epoch += 1;
        let epoch = self.epoch;
        info!(epoch, user_id = %user.id, email = %user.email, "session authenticated");

        self.state = SessionState::Authenticated(user.clone());
        self.timers = TimerSet::start(epoch, &self.config);
        self.activity.arm();
        self.activity_rx.borrow_and_update();

        self.publish();
        let _ = self.events_tx.send(SessionEvent::LoggedIn { user, epoch });
    }

    /// Ends the current session. A no-op unless authenticated, which is
    /// what makes repeated and racing logouts harmless.
    fn logout(&mut self, reason: LogoutReason, reply: Option<oneshot::Sender<()>>) {
        if !self.state.is_authenticated() {
            debug!(%reason, state = %self.state, "logout ignored; no active session");
            if let Some(reply) = reply {
                let _ = reply.send(());
            }
            return;
        }

        self.teardown_timers();
        self.epoch += 1;
        self.state = SessionState::Unauthenticated;
        self.revalidating = false;
        info!(epoch = self.epoch, %reason, "session ended");

        self.publish();
        let _ = self.events_tx.send(SessionEvent::LoggedOut {
            reason,
            epoch: self.epoch,
        });

        let port = Arc::clone(&self.port);
        tokio::spawn(async move {
            if let Err(e) = call_port(port, |port| async move { port.revoke().await }).await {
                warn!(error = %e, %reason, "revoke failed; local session already cleared");
            }
            if let Some(reply) = reply {
                let _ = reply.send(());
            }
        });
    }

    /// Cancels every timer, dismisses any notice and clears both latches.
    /// Idempotent.
    fn teardown_timers(&mut self) {
        self.activity.disarm();
        if self.timers.phase() != InactivityPhase::Idle {
            debug!(epoch = self.epoch, "timer set torn down");
        }
        // Dropping the old set dismisses a live notice.
        self.timers = TimerSet::idle(self.epoch);
    }

    // -- Helpers -------------------------------------------------------------

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(&self.state, self.epoch)
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Runs a port call on its own task and feeds the result back into the
    /// loop as a completion.
    fn spawn_call<T, F, Fut>(
        &self,
        call: F,
        finish: impl FnOnce(Result<T, CredentialError>) -> Completion + Send + 'static,
    ) where
        T: Send + 'static,
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CredentialError>> + Send + 'static,
    {
        let port = Arc::clone(&self.port);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = call_port(port, call).await;
            let _ = completions.send(finish(outcome));
        });
    }
}

/// Awaits a port call on a separate task so that a panicking provider
/// surfaces as a transient error instead of a lost completion.
async fn call_port<C, T, F, Fut>(port: Arc<C>, call: F) -> Result<T, CredentialError>
where
    C: CredentialPort,
    T: Send + 'static,
    F: FnOnce(Arc<C>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, CredentialError>> + Send + 'static,
{
    match tokio::spawn(call(port)).await {
        Ok(outcome) => outcome,
        Err(e) => Err(CredentialError::Transient(format!(
            "credential call aborted: {e}"
        ))),
    }
}

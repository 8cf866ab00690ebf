//! Integration tests for the session coordinator.
//!
//! The backend and the toast renderer are recording fakes. Every test
//! runs with Tokio's clock paused: sleeping in the test advances virtual
//! time, and the coordinator's timers fire in order as it passes. Most
//! checks sit half a second off any timer boundary; the tie-break tests
//! land activity exactly on one with `tokio::time::advance`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memegen_session::{
    expiry_channel, spawn, ActivityKind, CredentialError, CredentialPort, Credentials,
    ExpirySignal, InactivityPhase, LogoutReason, NoticeHandle, Notifier, SessionConfig,
    SessionError, SessionEvent, SessionHandle, SessionStatus, User,
};
use tokio::sync::broadcast;
use tokio::time::{advance, sleep};

// =========================================================================
// Fakes
// =========================================================================

fn ann() -> User {
    User {
        id: "3f9a0c2e".into(),
        first_name: "Ann".into(),
        last_name: "Lee".into(),
        email: "ann@example.com".into(),
    }
}

/// Scripted answers for the fake backend.
struct Script {
    /// Consumed front to back; when empty, validate returns `ann`.
    validate: VecDeque<Result<Option<User>, CredentialError>>,
    login: Result<(), CredentialError>,
    refresh: Result<(), CredentialError>,
    refresh_delay: Duration,
    refresh_panics: bool,
    revoke: Result<(), CredentialError>,
    status: Result<Option<SessionStatus>, CredentialError>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            validate: VecDeque::new(),
            login: Ok(()),
            refresh: Ok(()),
            refresh_delay: Duration::ZERO,
            refresh_panics: false,
            revoke: Ok(()),
            status: Ok(Some(SessionStatus {
                remaining_seconds: 1800,
            })),
        }
    }
}

#[derive(Default)]
struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeBackend {
    fn with(edit: impl FnOnce(&mut Script)) -> Arc<Self> {
        let backend = Self::default();
        edit(&mut backend.script.lock().unwrap());
        Arc::new(backend)
    }

    fn edit(&self, edit: impl FnOnce(&mut Script)) {
        edit(&mut self.script.lock().unwrap());
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

impl CredentialPort for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<(), CredentialError> {
        self.record("login");
        self.script.lock().unwrap().login.clone()
    }

    async fn validate(&self) -> Result<Option<User>, CredentialError> {
        self.record("validate");
        self.script
            .lock()
            .unwrap()
            .validate
            .pop_front()
            .unwrap_or_else(|| Ok(Some(ann())))
    }

    async fn refresh(&self) -> Result<(), CredentialError> {
        self.record("refresh");
        let (delay, panics, result) = {
            let s = self.script.lock().unwrap();
            (s.refresh_delay, s.refresh_panics, s.refresh.clone())
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if panics {
            panic!("refresh provider failed hard");
        }
        result
    }

    async fn revoke(&self) -> Result<(), CredentialError> {
        self.record("revoke");
        self.script.lock().unwrap().revoke.clone()
    }

    async fn status(&self) -> Result<Option<SessionStatus>, CredentialError> {
        self.record("status");
        self.script.lock().unwrap().status.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Toast {
    Warn(u32),
    Update(u32),
    Dismiss,
}

#[derive(Default)]
struct FakeToasts {
    calls: Mutex<Vec<Toast>>,
    next_id: Mutex<u64>,
}

impl FakeToasts {
    fn calls(&self) -> Vec<Toast> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Toast) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| pred(t)).count()
    }
}

impl Notifier for FakeToasts {
    fn warn(&self, seconds: u32) -> NoticeHandle {
        self.calls.lock().unwrap().push(Toast::Warn(seconds));
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        NoticeHandle(*id)
    }

    fn update(&self, _handle: NoticeHandle, seconds: u32) {
        self.calls.lock().unwrap().push(Toast::Update(seconds));
    }

    fn dismiss(&self, _handle: NoticeHandle) {
        self.calls.lock().unwrap().push(Toast::Dismiss);
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// 30 s inactivity, 60 s warning, refresh every 10 s, status every 15 s.
fn config() -> SessionConfig {
    SessionConfig {
        inactivity_timeout: Duration::from_secs(30),
        warning_duration: Duration::from_secs(60),
        refresh_interval: Duration::from_secs(10),
        status_poll_interval: Duration::from_secs(15),
        timer_jitter: Duration::ZERO,
        ..SessionConfig::default()
    }
}

struct Harness {
    handle: SessionHandle,
    expiry: ExpirySignal,
    backend: Arc<FakeBackend>,
    toasts: Arc<FakeToasts>,
}

fn start(config: SessionConfig, backend: Arc<FakeBackend>) -> Harness {
    let toasts = Arc::new(FakeToasts::default());
    let (expiry, listener) = expiry_channel();
    let handle = spawn(config, Arc::clone(&backend), Arc::clone(&toasts), listener);
    Harness {
        handle,
        expiry,
        backend,
        toasts,
    }
}

/// A harness whose initial validation found `ann`.
async fn signed_in(config: SessionConfig, backend: Arc<FakeBackend>) -> Harness {
    let h = start(config, backend);
    let snap = h.handle.initialize().await.unwrap();
    assert!(snap.is_authenticated);
    h
}

async fn sleep_ms(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

fn logouts(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<LogoutReason> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::LoggedOut { reason, .. } = event {
            out.push(reason);
        }
    }
    out
}

// =========================================================================
// initialize()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_with_user_authenticates() {
    let h = start(config(), FakeBackend::with(|_| {}));
    assert!(h.handle.snapshot().is_validating);

    let snap = h.handle.initialize().await.unwrap();

    assert!(snap.is_authenticated);
    assert!(!snap.is_validating);
    assert_eq!(snap.user, Some(ann()));
    assert_eq!(snap.epoch, 1);
    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::CountingInactivity);
    assert!(status.inactivity_armed);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_without_user_is_unauthenticated() {
    let h = start(config(), FakeBackend::with(|s| s.validate.push_back(Ok(None))));

    let snap = h.handle.initialize().await.unwrap();

    assert!(!snap.is_authenticated);
    assert!(!snap.is_validating);
    assert_eq!(h.handle.inspect().await.unwrap().phase, InactivityPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_network_error_is_unauthenticated() {
    let h = start(
        config(),
        FakeBackend::with(|s| {
            s.validate
                .push_back(Err(CredentialError::Transient("offline".into())))
        }),
    );

    let snap = h.handle.initialize().await.unwrap();

    assert!(!snap.is_authenticated);
    assert!(!snap.is_validating);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_twice_validates_once() {
    let h = start(config(), FakeBackend::with(|_| {}));

    let (first, second) = tokio::join!(h.handle.initialize(), h.handle.initialize());
    first.unwrap();
    second.unwrap();
    h.handle.initialize().await.unwrap();

    assert_eq!(h.backend.count("validate"), 1);
    assert!(h.handle.snapshot().is_authenticated);
}

// =========================================================================
// login()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_after_signed_out_start_authenticates() {
    let h = start(config(), FakeBackend::with(|s| s.validate.push_back(Ok(None))));
    h.handle.initialize().await.unwrap();
    let mut events = h.handle.events();

    let snap = h.handle.login(Credentials::new("ann", "pw")).await.unwrap();

    assert!(snap.is_authenticated);
    assert_eq!(h.backend.count("login"), 1);
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::LoggedIn { user, .. }) if user == ann()
    ));
    assert!(h.handle.activity().is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_login_rejected_leaves_state_unchanged() {
    let h = start(
        config(),
        FakeBackend::with(|s| {
            s.validate.push_back(Ok(None));
            s.login = Err(CredentialError::Rejected("bad password".into()));
        }),
    );
    let before = h.handle.initialize().await.unwrap();

    let result = h.handle.login(Credentials::new("ann", "nope")).await;

    assert!(matches!(result, Err(SessionError::LoginFailed(_))));
    assert_eq!(h.handle.snapshot(), before);
    assert_eq!(h.handle.inspect().await.unwrap().phase, InactivityPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_login_while_validating_is_rejected() {
    let h = start(config(), FakeBackend::with(|_| {}));

    let result = h.handle.login(Credentials::new("ann", "pw")).await;

    assert!(matches!(result, Err(SessionError::StillValidating)));
    assert_eq!(h.backend.count("login"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_when_authenticated_is_rejected() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    let result = h.handle.login(Credentials::new("ann", "pw")).await;

    assert!(matches!(result, Err(SessionError::AlreadyAuthenticated)));
}

#[tokio::test(start_paused = true)]
async fn test_login_without_session_after_validate_fails() {
    let h = start(
        config(),
        FakeBackend::with(|s| {
            s.validate.push_back(Ok(None));
            s.validate.push_back(Ok(None));
        }),
    );
    h.handle.initialize().await.unwrap();

    let result = h.handle.login(Credentials::new("ann", "pw")).await;

    assert!(matches!(result, Err(SessionError::NoSession)));
    assert!(!h.handle.snapshot().is_authenticated);
}

// =========================================================================
// logout()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_twice_tears_down_once() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    tokio::join!(
        h.handle.logout(LogoutReason::Manual),
        h.handle.logout(LogoutReason::Manual)
    );
    h.handle.logout(LogoutReason::Manual).await;

    assert_eq!(h.backend.count("revoke"), 1);
    assert_eq!(logouts(&mut events), [LogoutReason::Manual]);
    let snap = h.handle.snapshot();
    assert!(!snap.is_authenticated);
    assert_eq!(snap.epoch, 2);
    assert!(!h.handle.activity().is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_logout_succeeds_when_revoke_fails() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| s.revoke = Err(CredentialError::Transient("502".into()))),
    )
    .await;

    h.handle.logout(LogoutReason::Manual).await;

    assert!(!h.handle.snapshot().is_authenticated);
    assert_eq!(h.handle.inspect().await.unwrap().phase, InactivityPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_warning_dismisses_once_and_stops_countdown() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    sleep_ms(35_500).await;
    assert_eq!(h.toasts.calls().first(), Some(&Toast::Warn(60)));

    h.handle.logout(LogoutReason::Manual).await;
    let after_logout = h.toasts.calls().len();
    sleep_ms(120_000).await;

    assert_eq!(h.toasts.count(|t| *t == Toast::Dismiss), 1);
    assert_eq!(h.toasts.calls().len(), after_logout);
    assert_eq!(h.backend.count("revoke"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_when_never_signed_in_is_noop() {
    let h = start(config(), FakeBackend::with(|s| s.validate.push_back(Ok(None))));
    h.handle.initialize().await.unwrap();

    h.handle.logout(LogoutReason::Manual).await;

    assert_eq!(h.backend.count("revoke"), 0);
    assert_eq!(h.handle.snapshot().epoch, 0);
}

// =========================================================================
// Inactivity
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_runs_out_logs_out_for_inactivity() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    sleep_ms(30_500).await;
    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::Warning);
    assert_eq!(status.warning_remaining, Some(60));
    assert!(status.refresh_paused);
    assert_eq!(h.toasts.calls(), [Toast::Warn(60)]);
    let refreshes_before_warning = h.backend.count("refresh");

    sleep_ms(59_000).await; // t = 89.5 s
    assert_eq!(h.handle.inspect().await.unwrap().warning_remaining, Some(1));
    assert!(h.handle.snapshot().is_authenticated);

    sleep_ms(1_000).await; // t = 90.5 s
    let mut expected = vec![Toast::Warn(60)];
    expected.extend((1..=59).rev().map(Toast::Update));
    expected.push(Toast::Dismiss);
    assert_eq!(h.toasts.calls(), expected);
    assert!(!h.handle.snapshot().is_authenticated);
    assert_eq!(logouts(&mut events), [LogoutReason::Inactivity]);
    assert_eq!(h.backend.count("refresh"), refreshes_before_warning);
    assert_eq!(h.backend.count("revoke"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_activity_mid_countdown_cancels_logout() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    sleep_ms(75_500).await; // 45 s into the countdown
    assert_eq!(h.handle.inspect().await.unwrap().warning_remaining, Some(15));

    assert!(h.handle.activity().signal(ActivityKind::Click));
    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::CountingInactivity);
    assert_eq!(status.warning_remaining, None);
    assert!(!status.refresh_paused);
    assert_eq!(h.toasts.calls().last(), Some(&Toast::Dismiss));
    assert_eq!(h.toasts.count(|t| *t == Toast::Dismiss), 1);

    // The old countdown would have hit zero at t = 90 s.
    sleep_ms(29_000).await; // t = 104.5 s
    assert!(h.handle.snapshot().is_authenticated);
    assert_eq!(h.toasts.count(|t| matches!(t, Toast::Warn(_))), 1);
    assert!(logouts(&mut events).is_empty());

    // Inactivity restarted from the click: a fresh warning at t = 105.5 s.
    sleep_ms(1_500).await;
    assert_eq!(h.toasts.count(|t| matches!(t, Toast::Warn(_))), 2);
    assert_eq!(h.toasts.count(|t| *t == Toast::Dismiss), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_activity_keeps_single_inactivity_timer() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    for _ in 0..50 {
        assert!(h.handle.on_activity());
        sleep_ms(500).await;
    }
    // Last activity at t = 24.5 s; the deadline is t = 54.5 s.
    sleep_ms(29_000).await; // t = 54 s
    assert!(h.toasts.calls().is_empty());

    sleep_ms(1_000).await; // t = 55 s
    assert_eq!(h.toasts.calls(), [Toast::Warn(60)]);
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_signal_does_not_reset() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    sleep_ms(20_000).await;
    assert!(!h.handle.activity().signal(ActivityKind::PointerMove));
    sleep_ms(10_500).await;

    assert_eq!(h.toasts.calls(), [Toast::Warn(60)]);
}

#[tokio::test(start_paused = true)]
async fn test_activity_while_signed_out_is_ignored() {
    let h = start(config(), FakeBackend::with(|s| s.validate.push_back(Ok(None))));
    h.handle.initialize().await.unwrap();

    assert!(!h.handle.on_activity());
    assert!(!h.handle.activity().signal(ActivityKind::KeyPress));
}

#[tokio::test(start_paused = true)]
async fn test_activity_on_final_countdown_tick_wins() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    sleep_ms(89_500).await;
    assert_eq!(h.handle.inspect().await.unwrap().warning_remaining, Some(1));

    // The click and the last countdown tick (t = 90 s) are both pending
    // when the coordinator next wakes.
    assert!(h.handle.activity().signal(ActivityKind::Click));
    advance(Duration::from_millis(500)).await;

    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::CountingInactivity);
    assert_eq!(status.warning_remaining, None);
    assert!(h.handle.snapshot().is_authenticated);
    assert!(logouts(&mut events).is_empty());
    assert_eq!(h.toasts.count(|t| *t == Toast::Dismiss), 1);
    assert_eq!(h.backend.count("revoke"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activity_on_inactivity_deadline_skips_warning() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    sleep_ms(29_500).await;
    assert!(h.handle.activity().signal(ActivityKind::Click));
    advance(Duration::from_millis(500)).await; // t = 30 s, the old deadline

    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::CountingInactivity);
    assert!(h.toasts.calls().is_empty());

    // Reset from the click: the warning comes 30 s later, at t = 60 s.
    sleep_ms(29_500).await;
    assert!(h.toasts.calls().is_empty());
    sleep_ms(1_000).await;
    assert_eq!(h.toasts.calls(), [Toast::Warn(60)]);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_durations_do_not_stop_coordinator() {
    let cfg = SessionConfig {
        inactivity_timeout: Duration::MAX,
        warning_duration: Duration::MAX,
        refresh_interval: Duration::MAX,
        status_poll_interval: Duration::MAX,
        timer_jitter: Duration::MAX,
        ..config()
    };
    let h = start(cfg, FakeBackend::with(|_| {}));

    let snap = h.handle.initialize().await.unwrap();
    assert!(snap.is_authenticated);

    sleep_ms(60_000).await;
    let status = h.handle.inspect().await.unwrap();
    assert_eq!(status.phase, InactivityPhase::CountingInactivity);
    assert!(h.toasts.calls().is_empty());

    h.handle.logout(LogoutReason::Manual).await;
    assert!(!h.handle.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_zero_warning_logs_out_at_timeout() {
    let cfg = SessionConfig {
        warning_duration: Duration::ZERO,
        ..config()
    };
    let h = signed_in(cfg, FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    sleep_ms(30_500).await;

    assert!(h.toasts.calls().is_empty());
    assert_eq!(logouts(&mut events), [LogoutReason::Inactivity]);
}

// =========================================================================
// Refresh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_refresh_in_flight_skips_next_tick() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| s.refresh_delay = Duration::from_secs(25)),
    )
    .await;

    // Stay active so no refresh is skipped for idleness.
    for _ in 0..8 {
        sleep_ms(5_000).await;
        h.handle.on_activity();
    }
    // t = 40 s: ticks at 10 (starts, ends at 35), 20 and 30 (skipped), 40.
    sleep_ms(500).await;

    assert_eq!(h.backend.count("refresh"), 2);
    assert!(h.handle.inspect().await.unwrap().refresh_in_flight);
    assert!(h.handle.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_unauthorized_logs_out_once() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| s.refresh = Err(CredentialError::Unauthorized)),
    )
    .await;
    let mut events = h.handle.events();

    sleep_ms(10_500).await;

    assert_eq!(logouts(&mut events), [LogoutReason::BackendExpired]);
    assert_eq!(h.backend.count("refresh"), 1);
    let status = h.handle.inspect().await.unwrap();
    assert!(!status.refresh_in_flight);
    assert_eq!(status.phase, InactivityPhase::Idle);

    sleep_ms(60_000).await;
    assert!(logouts(&mut events).is_empty());
    assert_eq!(h.backend.count("refresh"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_refresh_failure_keeps_session() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| s.refresh = Err(CredentialError::Transient("timeout".into()))),
    )
    .await;

    sleep_ms(5_000).await;
    h.handle.on_activity();
    sleep_ms(5_500).await;

    assert_eq!(h.backend.count("refresh"), 1);
    assert!(h.handle.snapshot().is_authenticated);
    assert!(!h.handle.inspect().await.unwrap().refresh_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_refresh_clears_guard() {
    let h = signed_in(config(), FakeBackend::with(|s| s.refresh_panics = true)).await;

    sleep_ms(10_500).await;

    assert_eq!(h.backend.count("refresh"), 1);
    assert!(!h.handle.inspect().await.unwrap().refresh_in_flight);
    assert!(h.handle.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_skipped_for_idle_user() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    // First cycle counts sign-in as activity; the second sees none.
    sleep_ms(20_500).await;

    assert_eq!(h.backend.count("refresh"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_result_after_relogin_is_discarded() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| {
            s.refresh = Err(CredentialError::Unauthorized);
            s.refresh_delay = Duration::from_secs(5);
        }),
    )
    .await;

    sleep_ms(12_000).await; // refresh started at 10 s, answers at 15 s
    h.handle.logout(LogoutReason::Manual).await;
    let snap = h.handle.login(Credentials::new("ann", "pw")).await.unwrap();
    assert_eq!(snap.epoch, 3);
    let mut events = h.handle.events();

    sleep_ms(4_000).await; // t = 16 s

    assert!(h.handle.snapshot().is_authenticated);
    assert_eq!(h.handle.snapshot().epoch, 3);
    assert!(logouts(&mut events).is_empty());
}

// =========================================================================
// Status poll
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_status_reporting_expired_overrides_local_timers() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| {
            s.status = Ok(Some(SessionStatus {
                remaining_seconds: 0,
            }))
        }),
    )
    .await;
    let mut events = h.handle.events();

    sleep_ms(14_500).await;
    assert!(h.handle.snapshot().is_authenticated);

    sleep_ms(1_000).await; // poll at 15 s, inactivity deadline still 30 s away

    assert_eq!(logouts(&mut events), [LogoutReason::BackendExpired]);
    assert!(h.toasts.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_status_transient_error_keeps_session() {
    let h = signed_in(
        config(),
        FakeBackend::with(|s| s.status = Err(CredentialError::Transient("503".into()))),
    )
    .await;

    sleep_ms(15_500).await;

    assert_eq!(h.backend.count("status"), 1);
    assert!(h.handle.snapshot().is_authenticated);
    assert!(!h.handle.inspect().await.unwrap().status_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_status_runs_during_warning() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;

    sleep_ms(30_500).await;
    let before = h.backend.count("status");
    sleep_ms(15_000).await;

    assert_eq!(h.backend.count("status"), before + 1);
}

// =========================================================================
// External expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_expiry_while_validating_is_noop() {
    let h = start(config(), FakeBackend::with(|_| {}));

    h.expiry.raise();
    sleep_ms(1).await;
    assert!(h.handle.snapshot().is_validating);

    let snap = h.handle.initialize().await.unwrap();
    sleep_ms(1).await;

    assert!(snap.is_authenticated);
    assert!(h.handle.snapshot().is_authenticated);
    assert_eq!(h.backend.count("revoke"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_signal_logs_out_authenticated_session() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    let mut events = h.handle.events();

    h.expiry.raise();
    h.expiry.raise();
    sleep_ms(1).await;

    assert_eq!(logouts(&mut events), [LogoutReason::ExternalExpiry]);
    assert!(!h.handle.snapshot().is_authenticated);
    assert_eq!(h.backend.count("revoke"), 1);
}

// =========================================================================
// revalidate()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_revalidate_updates_user_without_touching_timers() {
    let renamed = User {
        last_name: "Lee-Park".into(),
        ..ann()
    };
    let backend = FakeBackend::with(|_| {});
    let h = signed_in(config(), Arc::clone(&backend)).await;
    backend.edit(|s| s.validate.push_back(Ok(Some(renamed.clone()))));

    sleep_ms(20_000).await;
    let snap = h.handle.revalidate().await.unwrap();
    sleep_ms(10_500).await; // original deadline at 30 s still holds

    assert_eq!(snap.user, Some(renamed));
    assert_eq!(h.toasts.calls(), [Toast::Warn(60)]);
}

#[tokio::test(start_paused = true)]
async fn test_revalidate_transient_error_keeps_authenticated() {
    let backend = FakeBackend::with(|_| {});
    let h = signed_in(config(), Arc::clone(&backend)).await;
    backend.edit(|s| {
        s.validate
            .push_back(Err(CredentialError::Transient("offline".into())))
    });

    let snap = h.handle.revalidate().await.unwrap();

    assert!(snap.is_authenticated);
    assert_eq!(snap.user, Some(ann()));
}

#[tokio::test(start_paused = true)]
async fn test_revalidate_no_session_logs_out() {
    let backend = FakeBackend::with(|_| {});
    let h = signed_in(config(), Arc::clone(&backend)).await;
    backend.edit(|s| s.validate.push_back(Ok(None)));
    let mut events = h.handle.events();

    let snap = h.handle.revalidate().await.unwrap();

    assert!(!snap.is_authenticated);
    assert_eq!(logouts(&mut events), [LogoutReason::BackendExpired]);
}

#[tokio::test(start_paused = true)]
async fn test_revalidate_while_signed_out_does_not_call_backend() {
    let h = start(config(), FakeBackend::with(|s| s.validate.push_back(Ok(None))));
    h.handle.initialize().await.unwrap();

    h.handle.revalidate().await.unwrap();

    assert_eq!(h.backend.count("validate"), 1);
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_warning_dismisses_notice() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    sleep_ms(31_500).await;

    h.handle.shutdown().await;
    sleep_ms(1).await;

    assert_eq!(h.toasts.calls().last(), Some(&Toast::Dismiss));
    assert_eq!(h.backend.count("revoke"), 0);
    assert!(matches!(
        h.handle.inspect().await,
        Err(SessionError::Unavailable)
    ));
    assert!(!h.handle.activity().is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_tears_down() {
    let h = signed_in(config(), FakeBackend::with(|_| {})).await;
    sleep_ms(31_500).await;
    let toasts = Arc::clone(&h.toasts);

    drop(h);
    sleep_ms(60_000).await;

    assert_eq!(toasts.count(|t| *t == Toast::Dismiss), 1);
    assert_eq!(toasts.calls()[toasts.calls().len() - 1], Toast::Dismiss);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_sees_login_and_logout() {
    let h = start(config(), FakeBackend::with(|_| {}));
    let mut snapshots = h.handle.subscribe();
    assert!(snapshots.borrow_and_update().is_validating);

    h.handle.initialize().await.unwrap();
    snapshots.changed().await.unwrap();
    assert!(snapshots.borrow_and_update().is_authenticated);

    h.handle.logout(LogoutReason::Manual).await;
    snapshots.changed().await.unwrap();
    let after = snapshots.borrow_and_update().clone();
    assert!(!after.is_authenticated);
    assert_eq!(after.epoch, 2);
}

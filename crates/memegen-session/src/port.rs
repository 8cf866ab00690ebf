//! Ports: the two external collaborators the coordinator talks to.
//!
//! The session core does not know how credentials are stored or how a
//! warning toast is drawn. It talks to:
//!
//! - a [`CredentialPort`]: the authentication backend (login, validate,
//!   refresh, revoke, status), and
//! - a [`Notifier`]: whatever renders the "you will be logged out in N
//!   seconds" notice.
//!
//! Production code plugs in the HTTP adapter and a UI toast; tests plug
//! in recording fakes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CredentialError;

// ---------------------------------------------------------------------------
// Data passed through the ports
// ---------------------------------------------------------------------------

/// The signed-in user, as returned by the backend's "who am I" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque id (a hex uuid on the memegen backend).
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    /// First and last name joined for display.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Username and password for the login call.
///
/// `Debug` redacts the password so credentials can be logged safely.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The backend's own view of how long the credential has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Seconds until the backend considers the credential expired.
    /// Zero or negative means it already has.
    pub remaining_seconds: i64,
}

impl SessionStatus {
    /// `true` when the backend says the credential has no time left.
    pub fn is_expired(&self) -> bool {
        self.remaining_seconds <= 0
    }
}

/// Opaque identifier for a notice shown by a [`Notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeHandle(pub u64);

impl fmt::Display for NoticeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notice-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CredentialPort
// ---------------------------------------------------------------------------

/// The authentication backend as seen by the coordinator.
///
/// Every method may suspend. The coordinator never awaits them on its own
/// task; calls are spawned and their results come back tagged with the
/// session epoch they started in.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because the port is shared through an `Arc`
/// with the spawned call tasks.
///
/// # Example
///
/// ```rust
/// use memegen_session::{CredentialError, CredentialPort, Credentials, SessionStatus, User};
///
/// /// Treats every visitor as the same demo user.
/// struct DemoBackend;
///
/// impl CredentialPort for DemoBackend {
///     async fn login(&self, _credentials: &Credentials) -> Result<(), CredentialError> {
///         Ok(())
///     }
///     async fn validate(&self) -> Result<Option<User>, CredentialError> {
///         Ok(Some(User {
///             id: "demo".into(),
///             first_name: "Demo".into(),
///             last_name: "User".into(),
///             email: "demo@example.com".into(),
///         }))
///     }
///     async fn refresh(&self) -> Result<(), CredentialError> {
///         Ok(())
///     }
///     async fn revoke(&self) -> Result<(), CredentialError> {
///         Ok(())
///     }
///     async fn status(&self) -> Result<Option<SessionStatus>, CredentialError> {
///         Ok(Some(SessionStatus { remaining_seconds: 1800 }))
///     }
/// }
/// ```
pub trait CredentialPort: Send + Sync + 'static {
    /// Exchanges a username and password for a credential.
    ///
    /// Returns [`CredentialError::Rejected`] for wrong credentials.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;

    /// Asks the backend who the current credential belongs to.
    ///
    /// - `Ok(Some(user))`: the credential is valid
    /// - `Ok(None)`: there is no session
    /// - `Err(_)`: the question could not be answered
    fn validate(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<User>, CredentialError>> + Send;

    /// Extends the credential's lifetime.
    ///
    /// Fails with [`CredentialError::Unauthorized`] when the credential is
    /// already invalid; any other error is treated as transient.
    fn refresh(&self) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;

    /// Invalidates the credential. Best-effort: failures are only logged.
    fn revoke(&self) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;

    /// Reports how long the backend still honours the credential.
    /// `Ok(None)` means the backend does not report an expiry.
    fn status(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<SessionStatus>, CredentialError>> + Send;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Renders the inactivity warning.
///
/// Calls are synchronous: showing or updating a toast must not suspend.
/// The coordinator guarantees at most one live notice at a time and
/// exactly one `dismiss` per `warn`.
pub trait Notifier: Send + Sync + 'static {
    /// Shows a notice counting down from `seconds` and returns its handle.
    fn warn(&self, seconds: u32) -> NoticeHandle;

    /// Updates the countdown of a live notice.
    fn update(&self, handle: NoticeHandle, seconds: u32);

    /// Removes a notice.
    fn dismiss(&self, handle: NoticeHandle);
}

//! Error types for the session layer.

/// Errors returned by a [`CredentialPort`](crate::CredentialPort).
///
/// The coordinator only needs to know one thing about a failure: did the
/// backend *confirm* the credential is invalid, or did the call just not
/// get through? See [`is_authoritative`](Self::is_authoritative).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The backend rejected the credential as invalid or expired.
    #[error("credential rejected by backend")]
    Unauthorized,

    /// Login was refused (bad username or password).
    #[error("login rejected: {0}")]
    Rejected(String),

    /// The call failed for a reason that may go away on retry:
    /// network error, timeout, 5xx, a panicking provider.
    #[error("transient credential failure: {0}")]
    Transient(String),
}

impl CredentialError {
    /// `true` when the backend confirmed the credential is no longer valid.
    /// Such failures end the session; everything else is retried.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Errors surfaced to the presentation layer by the
/// [`SessionHandle`](crate::SessionHandle).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Login failed; state is unchanged.
    #[error("login failed: {0}")]
    LoginFailed(#[source] CredentialError),

    /// Login succeeded but validation did not return a user.
    #[error("login succeeded but no session was established")]
    NoSession,

    /// A user is already signed in. Log out first.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// The initial validation has not resolved yet.
    #[error("session is still being validated")]
    StillValidating,

    /// Another login call has not finished yet.
    #[error("a login is already in progress")]
    LoginInProgress,

    /// A session epoch ended while the call was in flight, so its result
    /// was discarded.
    #[error("session changed while the request was in flight")]
    Superseded,

    /// The coordinator task has stopped.
    #[error("session coordinator is unavailable")]
    Unavailable,
}

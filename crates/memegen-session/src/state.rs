//! Session state: the authoritative record of who is signed in.
//!
//! ```text
//!   Validating ──(validate: user)────→ Authenticated
//!       │                                   │  ↑
//!       └──(validate: none / error)──→ Unauthenticated
//!                                (logout)   │  └──(login)
//! ```
//!
//! There is no way back into `Validating`. Each entry into `Authenticated`
//! and each logout starts a new *epoch*.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::User;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of the single client session.
///
/// The user record lives inside `Authenticated`, so "authenticated without
/// a user" cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The first `validate()` has not resolved yet.
    Validating,
    /// A credential is held for this user.
    Authenticated(User),
    /// No credential is held.
    Unauthenticated,
}

impl SessionState {
    pub fn is_validating(&self) -> bool {
        matches!(self, Self::Validating)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => write!(f, "Validating"),
            Self::Authenticated(_) => write!(f, "Authenticated"),
            Self::Unauthenticated => write!(f, "Unauthenticated"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Read-only view of the session for rendering decisions: spinner while
/// `is_validating`, the app while `is_authenticated`, a redirect otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_validating: bool,
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn new(state: &SessionState, epoch: u64) -> Self {
        Self {
            user: state.user().cloned(),
            is_authenticated: state.is_authenticated(),
            is_validating: state.is_validating(),
            epoch,
        }
    }
}

// ---------------------------------------------------------------------------
// LogoutReason / SessionEvent
// ---------------------------------------------------------------------------

/// Why a session ended. Lets the presentation layer pick a message and a
/// route without the core knowing about navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogoutReason {
    /// The user asked to log out.
    Manual,
    /// The warning countdown ran out.
    Inactivity,
    /// The HTTP layer saw a request rejected for authentication reasons.
    ExternalExpiry,
    /// The backend confirmed the credential is gone (refresh, status or
    /// revalidation).
    BackendExpired,
}

impl LogoutReason {
    /// `true` for every reason except a manual logout.
    pub fn is_expiry(&self) -> bool {
        !matches!(self, Self::Manual)
    }

    /// A short message for the login page the user lands on.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Manual => "You have been logged out.",
            Self::Inactivity => "Your session expired due to inactivity.",
            Self::ExternalExpiry | Self::BackendExpired => {
                "Your session expired. Please log in again."
            }
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Inactivity => write!(f, "inactivity"),
            Self::ExternalExpiry => write!(f, "external-expiry"),
            Self::BackendExpired => write!(f, "backend-expired"),
        }
    }
}

/// Lifecycle notifications broadcast to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session started (initial validation or login).
    LoggedIn { user: User, epoch: u64 },
    /// A session ended.
    LoggedOut { reason: LogoutReason, epoch: u64 },
}

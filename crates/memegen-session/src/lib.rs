//! Client-side session lifecycle for memegen.
//!
//! This crate keeps a signed-in user signed in while they are active and
//! signs them out when they are not:
//!
//! 1. **Validation**: resolve "is there a session?" once at start-up.
//! 2. **Inactivity**: after a quiet period, show a countdown notice;
//!    any activity cancels it, reaching zero logs out.
//! 3. **Refresh**: extend the credential in the background for active users.
//! 4. **Reconciliation**: poll the backend's own expiry clock and react
//!    to 401s seen anywhere in the HTTP layer.
//!
//! # How it fits together
//!
//! ```text
//! Presentation layer  ← SessionHandle, ActivityMonitor, SessionSnapshot
//!     ↕
//! Coordinator (this crate)  ← one task owning state + timers
//!     ↕
//! Ports  ← CredentialPort (backend), Notifier (toast)
//! ```
//!
//! Start it with [`spawn`], then call [`SessionHandle::initialize`].

#![allow(async_fn_in_trait)]

mod activity;
mod config;
mod coordinator;
mod error;
mod expiry;
mod port;
mod state;
mod timers;

pub use activity::{ActivityKind, ActivityMonitor};
pub use config::{SessionConfig, MAX_DURATION};
pub use coordinator::{spawn, SessionHandle};
pub use error::{CredentialError, SessionError};
pub use expiry::{expiry_channel, ExpiryListener, ExpirySignal};
pub use port::{CredentialPort, Credentials, NoticeHandle, Notifier, SessionStatus, User};
pub use state::{LogoutReason, SessionEvent, SessionSnapshot, SessionState};
pub use timers::{InactivityPhase, TimerStatus};

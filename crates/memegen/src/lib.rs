//! # memegen
//!
//! Keeps a memegen user signed in while they are active and signs them
//! out when they are not. Wires the HTTP credential port to the session
//! coordinator and re-exports what an application needs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memegen::prelude::*;
//!
//! struct Toast;
//!
//! impl Notifier for Toast {
//!     fn warn(&self, seconds: u32) -> NoticeHandle {
//!         eprintln!("logging out in {seconds}s");
//!         NoticeHandle(1)
//!     }
//!     fn update(&self, _: NoticeHandle, seconds: u32) {
//!         eprintln!("logging out in {seconds}s");
//!     }
//!     fn dismiss(&self, _: NoticeHandle) {}
//! }
//!
//! # async fn run() -> Result<(), MemegenError> {
//! memegen::telemetry::init()?;
//! let client = MemegenClient::builder().build(Toast)?;
//! let snapshot = client.session().initialize().await?;
//! if !snapshot.is_authenticated {
//!     client.session().login(Credentials::new("ann", "hunter2")).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod telemetry;

pub use client::{MemegenClient, MemegenClientBuilder};
pub use error::MemegenError;
pub use memegen_http::{HttpConfig, HttpCredentialPort, HttpError};
pub use memegen_session::{
    expiry_channel, spawn, ActivityKind, ActivityMonitor, CredentialError, CredentialPort,
    Credentials, ExpiryListener, ExpirySignal, InactivityPhase, LogoutReason, NoticeHandle,
    Notifier, SessionConfig, SessionError, SessionEvent, SessionHandle, SessionSnapshot,
    SessionState, SessionStatus, TimerStatus, User,
};

pub mod prelude {
    pub use crate::{
        ActivityKind, Credentials, HttpConfig, LogoutReason, MemegenClient, MemegenError,
        NoticeHandle, Notifier, SessionConfig, SessionEvent, SessionHandle, SessionSnapshot,
    };
}

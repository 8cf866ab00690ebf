//! HTTP [`CredentialPort`](memegen_session::CredentialPort) for the
//! memegen backend.
//!
//! | port call  | request                       | 401 means                |
//! |------------|-------------------------------|--------------------------|
//! | `login`    | `POST /auth/login` (form)     | wrong username/password  |
//! | `validate` | `GET /users/me`               | no session (`Ok(None)`)  |
//! | `refresh`  | `POST /auth/refresh`          | expired, signal raised   |
//! | `revoke`   | `POST /auth/logout`           | expired, signal raised   |
//! | `status`   | `GET /auth/session-status`    | expired, signal raised   |
//!
//! ```no_run
//! # async fn demo() -> Result<(), memegen_http::HttpError> {
//! use memegen_http::{HttpConfig, HttpCredentialPort};
//!
//! let (signal, listener) = memegen_session::expiry_channel();
//! let port = HttpCredentialPort::new(HttpConfig::from_env(), signal)?;
//! # let _ = (port, listener);
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod client;
mod config;
mod error;

pub use client::HttpCredentialPort;
pub use config::{HttpConfig, API_URL_ENV, TIMEOUT_ENV};
pub use error::HttpError;

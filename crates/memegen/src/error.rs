//! Unified error type for the memegen client.

use memegen_http::HttpError;
use memegen_session::{CredentialError, SessionError};

/// Top-level error wrapping the error of every member crate, so callers
/// of the facade handle one type and `?` converts the rest.
#[derive(Debug, thiserror::Error)]
pub enum MemegenError {
    /// Session lifecycle (login refused, coordinator stopped).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A credential port call failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// HTTP client setup or transport.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Logging could not be installed.
    #[error("telemetry: {0}")]
    Telemetry(String),
}

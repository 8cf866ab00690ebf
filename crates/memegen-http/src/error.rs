use memegen_session::CredentialError;

/// Failures talking to the memegen backend over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("unauthorized; credential missing or expired")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl HttpError {
    /// Maps a non-success status and its body to an error.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = truncate_body(body);
        match status.as_u16() {
            401 => Self::Unauthorized,
            403 => Self::AccessDenied(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError(body),
            _ => Self::InvalidResponse(format!("status {status}: {body}")),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// A 401 is the backend's verdict on the credential; anything else may
/// succeed on retry.
impl From<HttpError> for CredentialError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Unauthorized => CredentialError::Unauthorized,
            other => CredentialError::Transient(other.to_string()),
        }
    }
}

//! [`CredentialPort`] over the memegen REST API.
//!
//! The backend keeps the credential in an HTTP-only `access_token`
//! cookie, so the client runs with a cookie store and never sees the
//! token itself.

use memegen_session::{
    CredentialError, CredentialPort, Credentials, ExpirySignal, SessionStatus, User,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{HttpConfig, HttpError};

const LOGIN_PATH: &str = "/auth/login";
const CURRENT_USER_PATH: &str = "/users/me";
const REFRESH_PATH: &str = "/auth/refresh";
const LOGOUT_PATH: &str = "/auth/logout";
const STATUS_PATH: &str = "/auth/session-status";

/// Body of `GET /auth/session-status`.
///
/// Older backends answer with just `{"authenticated": true, ...}`; both
/// fields are then absent and no expiry information is reported.
#[derive(Debug, Default, Deserialize)]
struct StatusPayload {
    is_valid: Option<bool>,
    time_remaining_ms: Option<i64>,
}

impl StatusPayload {
    fn into_status(self) -> Option<SessionStatus> {
        match (self.is_valid, self.time_remaining_ms) {
            (Some(false), _) => Some(SessionStatus {
                remaining_seconds: 0,
            }),
            // Rounded up: half a second left is not expired yet.
            (_, Some(ms)) => Some(SessionStatus {
                remaining_seconds: if ms > 0 {
                    ms / 1000 + i64::from(ms % 1000 != 0)
                } else {
                    0
                },
            }),
            (Some(true), None) | (None, None) => None,
        }
    }
}

/// HTTP adapter for the session coordinator.
///
/// Clone is cheap; clones share the connection pool and cookie store.
#[derive(Clone)]
pub struct HttpCredentialPort {
    client: Client,
    config: HttpConfig,
    expiry: ExpirySignal,
}

impl HttpCredentialPort {
    /// Builds the client. `expiry` is raised whenever the backend answers
    /// 401 to a call made on behalf of an existing session.
    pub fn new(config: HttpConfig, expiry: ExpirySignal) -> Result<Self, HttpError> {
        reqwest::Url::parse(&config.base_url).map_err(|e| HttpError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            expiry,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let response = request.send().await?;
        check_response(response).await
    }

    /// Raises the expiry signal if `result` is a 401.
    fn watch_expiry<T>(&self, path: &str, result: Result<T, HttpError>) -> Result<T, HttpError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                debug!(path, "backend answered 401; raising expiry signal");
                self.expiry.raise();
            }
        }
        result
    }

    async fn post_empty(&self, path: &str) -> Result<(), HttpError> {
        let request = self.client.post(self.config.endpoint(path));
        let result = self.send(request).await.map(drop);
        self.watch_expiry(path, result)
    }
}

async fn check_response(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpError::from_status(status, &body))
}

impl CredentialPort for HttpCredentialPort {
    async fn login(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        debug!(username = %credentials.username, "POST {LOGIN_PATH}");
        let request = self.client.post(self.config.endpoint(LOGIN_PATH)).form(&[
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ]);
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(HttpError::Unauthorized) => Err(CredentialError::Rejected(
                "incorrect username or password".into(),
            )),
            Err(e) => {
                warn!(error = %e, "login request failed");
                Err(e.into())
            }
        }
    }

    async fn validate(&self) -> Result<Option<User>, CredentialError> {
        let request = self.client.get(self.config.endpoint(CURRENT_USER_PATH));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(HttpError::Unauthorized) => {
                debug!("no valid session cookie");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let user = response
            .json::<User>()
            .await
            .map_err(|e| HttpError::InvalidResponse(format!("user record: {e}")))?;
        Ok(Some(user))
    }

    async fn refresh(&self) -> Result<(), CredentialError> {
        Ok(self.post_empty(REFRESH_PATH).await?)
    }

    async fn revoke(&self) -> Result<(), CredentialError> {
        Ok(self.post_empty(LOGOUT_PATH).await?)
    }

    async fn status(&self) -> Result<Option<SessionStatus>, CredentialError> {
        let request = self.client.get(self.config.endpoint(STATUS_PATH));
        let result = self.send(request).await;
        let response = self.watch_expiry(STATUS_PATH, result)?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let payload = response
            .json::<StatusPayload>()
            .await
            .map_err(|e| HttpError::InvalidResponse(format!("session status: {e}")))?;
        Ok(payload.into_status())
    }
}

//! `MemegenClient` builder: HTTP port, expiry channel and coordinator in
//! one call.

use std::sync::Arc;

use memegen_http::{HttpConfig, HttpCredentialPort};
use memegen_session::{expiry_channel, ExpirySignal, Notifier, SessionConfig, SessionHandle};

use crate::MemegenError;

/// Builder for a [`MemegenClient`].
///
/// ```rust,no_run
/// # async fn demo(notifier: impl memegen::Notifier) -> Result<(), memegen::MemegenError> {
/// use memegen::prelude::*;
///
/// let client = MemegenClient::builder()
///     .http(HttpConfig::from_env())
///     .build(notifier)?;
/// client.session().initialize().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemegenClientBuilder {
    session: SessionConfig,
    http: HttpConfig,
}

impl MemegenClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session timing configuration.
    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Sets where the backend lives.
    pub fn http(mut self, config: HttpConfig) -> Self {
        self.http = config;
        self
    }

    /// Builds the HTTP port and starts the session coordinator.
    ///
    /// Must be called inside a Tokio runtime. The session starts out
    /// validating; call [`SessionHandle::initialize`] next.
    pub fn build<N: Notifier>(self, notifier: N) -> Result<MemegenClient, MemegenError> {
        let (signal, listener) = expiry_channel();
        let port = Arc::new(HttpCredentialPort::new(self.http, signal.clone())?);
        let session =
            memegen_session::spawn(self.session, Arc::clone(&port), Arc::new(notifier), listener);

        tracing::debug!(base_url = %port.config().base_url, "memegen client started");
        Ok(MemegenClient {
            session,
            port,
            expiry: signal,
        })
    }
}

/// A running session against the memegen backend.
#[derive(Clone)]
pub struct MemegenClient {
    session: SessionHandle,
    port: Arc<HttpCredentialPort>,
    expiry: ExpirySignal,
}

impl MemegenClient {
    pub fn builder() -> MemegenClientBuilder {
        MemegenClientBuilder::new()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The credential port, for callers that want to issue backend calls
    /// sharing the session cookie.
    pub fn port(&self) -> &Arc<HttpCredentialPort> {
        &self.port
    }

    /// The expiry signal. Hand it to any other HTTP code that should end
    /// the session when it sees a 401.
    pub fn expiry_signal(&self) -> ExpirySignal {
        self.expiry.clone()
    }
}

//! Log output for binaries built on memegen.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::MemegenError;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, falling
/// back to [`DEFAULT_FILTER`].
///
/// Fails if a global subscriber is already set.
pub fn init() -> Result<(), MemegenError> {
    init_with(DEFAULT_FILTER)
}

/// Like [`init`], with a different fallback directive
/// (e.g. `"memegen_session=debug,info"`).
pub fn init_with(default_directive: &str) -> Result<(), MemegenError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| MemegenError::Telemetry(e.to_string()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|e| MemegenError::Telemetry(e.to_string()))
}

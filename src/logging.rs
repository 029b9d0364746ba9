//! Tracing subscriber setup for binaries and tests that embed the crate.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_directive`
/// (for example `"jobtrack=info"`) when the variable is unset or invalid.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_logging(
    default_directive: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

//! Logging setup for hosts that do not install their own subscriber

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::error::TelemetryError;

/// Directive used when the host passes none
pub const DEFAULT_DIRECTIVE: &str = "healthkit_export=info";

/// Install a `fmt` subscriber filtered by `RUST_LOG` plus `default_directive`.
///
/// Returns `Ok(false)` when a global subscriber is already set.
pub fn init_logging(default_directive: &str) -> Result<bool, TelemetryError> {
    let directive = default_directive
        .parse::<Directive>()
        .map_err(|e| TelemetryError::Configuration(format!("Invalid log directive: {e}")))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .try_init()
        .is_ok();
    Ok(installed)
}

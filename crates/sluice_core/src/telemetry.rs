//! Tracing subscriber initialisation.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize human-readable tracing output.
///
/// The subscriber respects the RUST_LOG environment variable.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(fmt_layer).try_init()?;

    Ok(())
}

/// Initialize JSON tracing output for log collectors.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_json_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(json_layer).try_init()?;

    Ok(())
}

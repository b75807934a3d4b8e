pub mod config;
pub mod error;

pub use config::{AuthConfig, Config, SyncConfig, ValidationResult};
pub use error::ConfigError;

/// Initialize tracing for the agenda binaries.
///
/// Honors `RUST_LOG`; defaults to `info`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("agenda core initialized");
}

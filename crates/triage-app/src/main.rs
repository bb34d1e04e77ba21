//! Triage server binary - composition root.
//!
//! 1. Parse CLI flags and read configuration from TOML
//! 2. Install tracing, then report how the configuration was obtained
//! 3. Build the analysis provider, shared memory and agent
//! 4. Serve the HTTP API until Ctrl-C, then close event streams and drain

mod cli;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use triage_analysis::provider_from_config;
use triage_api::{start_server, AppState};
use triage_core::config::TriageConfig;
use triage_core::error::TriageError;

use crate::cli::CliArgs;

/// Where the running configuration came from.
#[derive(Debug)]
enum ConfigSource {
    File,
    Missing,
    /// The file exists but could not be used; defaults are in effect.
    Invalid(TriageError),
}

/// Read the config file without logging; the caller reports the source once
/// tracing is up.
fn read_config(path: &Path) -> (TriageConfig, ConfigSource) {
    match TriageConfig::load_optional(path) {
        Ok(Some(config)) => (config, ConfigSource::File),
        Ok(None) => (TriageConfig::default(), ConfigSource::Missing),
        Err(e) => (TriageConfig::default(), ConfigSource::Invalid(e)),
    }
}

fn report_config_source(path: &Path, source: &ConfigSource) {
    match source {
        ConfigSource::File => {
            tracing::info!(path = %path.display(), "Configuration loaded")
        }
        ConfigSource::Missing => {
            tracing::info!(path = %path.display(), "No configuration file, using defaults")
        }
        ConfigSource::Invalid(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to load configuration, using defaults"
        ),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read first because it supplies the log level.
    let config_file = args.resolve_config_path();
    let (mut config, source) = read_config(&config_file);
    args.apply(&mut config);

    // Tracing: RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.server.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Triage v{}", env!("CARGO_PKG_VERSION"));
    report_config_source(&config_file, &source);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let provider = provider_from_config(&config.analysis);
    tracing::info!(
        provider = provider.name(),
        stage_delay_ms = config.pipeline.stage_delay_ms,
        workflow_window = config.pipeline.workflow_window,
        "Processing pipeline ready"
    );

    let state = AppState::from_config(config, provider);
    start_server(state, shutdown_signal()).await?;

    tracing::info!("Triage stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_config_missing_file_uses_defaults() {
        let (config, source) = read_config(Path::new("/nonexistent/triage.toml"));
        assert!(matches!(source, ConfigSource::Missing));
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn test_read_config_malformed_file_is_reported() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[server\nport = 9000").unwrap();

        let (config, source) = read_config(file.path());
        assert!(matches!(source, ConfigSource::Invalid(TriageError::Config(_))));
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn test_read_config_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[server]\nport = 9000").unwrap();

        let (config, source) = read_config(file.path());
        assert!(matches!(source, ConfigSource::File));
        assert_eq!(config.server.port, 9000);
    }
}

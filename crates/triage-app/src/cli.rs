//! CLI argument definitions for the Triage server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use triage_core::config::TriageConfig;

/// Triage - analyze submitted error messages and stream every processing
/// stage to connected clients.
#[derive(Parser, Debug)]
#[command(name = "triage", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Analysis provider: "rules" or "ai".
    #[arg(short = 'a', long = "analysis")]
    pub analysis: Option<String>,

    /// Artificial delay between pipeline stages, in milliseconds.
    #[arg(long = "stage-delay-ms")]
    pub stage_delay_ms: Option<u64>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TRIAGE_CONFIG env var > ~/.triage/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TRIAGE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > TRIAGE_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("TRIAGE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the language model API key.
    ///
    /// Priority: TRIAGE_LLM_API_KEY env var > config file value.
    pub fn resolve_api_key(&self, config_key: Option<String>) -> Option<String> {
        std::env::var("TRIAGE_LLM_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or(config_key)
    }

    /// Fold every override into `config`.
    pub fn apply(&self, config: &mut TriageConfig) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        config.server.port = self.resolve_port(config.server.port);
        if let Some(ref level) = self.log_level {
            config.server.log_level = level.clone();
        }
        if let Some(ref mode) = self.analysis {
            config.analysis.mode = mode.clone();
        }
        if let Some(delay) = self.stage_delay_ms {
            config.pipeline.stage_delay_ms = delay;
        }
        config.analysis.llm.api_key = self.resolve_api_key(config.analysis.llm.api_key.take());
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".triage").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".triage").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let args = CliArgs::parse_from([
            "triage",
            "--config",
            "/tmp/triage.toml",
            "--host",
            "0.0.0.0",
            "-p",
            "9000",
            "--log-level",
            "debug",
            "--analysis",
            "ai",
            "--stage-delay-ms",
            "0",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/triage.toml"));
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.stage_delay_ms, Some(0));
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = CliArgs::parse_from([
            "triage",
            "--host",
            "0.0.0.0",
            "--port",
            "9100",
            "--log-level",
            "warn",
            "--analysis",
            "ai",
            "--stage-delay-ms",
            "25",
        ]);
        let mut config = TriageConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.log_level, "warn");
        assert_eq!(config.analysis.mode, "ai");
        assert_eq!(config.pipeline.stage_delay_ms, 25);
    }

    #[test]
    fn test_apply_without_flags_keeps_file_values() {
        let args = CliArgs::parse_from(["triage", "--port", "8787"]);
        let mut config = TriageConfig::default();
        config.server.host = "10.0.0.5".to_string();
        config.pipeline.stage_delay_ms = 100;
        args.apply(&mut config);

        assert_eq!(config.server.host, "10.0.0.5");
        assert_eq!(config.pipeline.stage_delay_ms, 100);
        assert_eq!(config.analysis.mode, "rules");
    }
}

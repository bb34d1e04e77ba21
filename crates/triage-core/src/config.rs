use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TriageError};

/// Top-level configuration for the Triage server.
///
/// Loaded from `~/.triage/config.toml` by default. Every section falls back to
/// its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl TriageConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TriageConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration if the file exists.
    ///
    /// A missing file is `Ok(None)`; an unreadable or malformed one is an
    /// error. Nothing is logged here: callers usually read the config before
    /// tracing is installed and report the outcome afterwards.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(toml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.stream.keepalive_secs == 0 {
            return Err(TriageError::Config(
                "stream.keepalive_secs must be greater than 0".to_string(),
            ));
        }
        if self.stream.buffer_size == 0 {
            return Err(TriageError::Config(
                "stream.buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.workflow_window == 0 {
            return Err(TriageError::Config(
                "pipeline.workflow_window must be greater than 0".to_string(),
            ));
        }
        if AnalysisMode::parse(&self.analysis.mode).is_none() {
            return Err(TriageError::Config(format!(
                "analysis.mode must be \"rules\" or \"ai\", got \"{}\"",
                self.analysis.mode
            )));
        }
        if !(0.0..=2.0).contains(&self.analysis.llm.temperature) {
            return Err(TriageError::Config(
                "analysis.llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// API server port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            log_level: "info".to_string(),
        }
    }
}

/// Event stream endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Interval between keep-alive comments on idle connections.
    pub keepalive_secs: u64,
    /// Events buffered per connection before the connection starts dropping.
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            buffer_size: 256,
        }
    }
}

/// Processing pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Artificial pause between stages so viewers can follow progress.
    pub stage_delay_ms: u64,
    /// Number of recent workflows kept in memory (newest first).
    pub workflow_window: usize,
    /// Maximum characters of the last processed error kept for display.
    pub last_processed_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: 500,
            workflow_window: 10,
            last_processed_chars: 100,
        }
    }
}

/// Which classifier backs the analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Keyword rules only.
    Rules,
    /// Language model with keyword-rule fallback.
    Ai,
}

impl AnalysisMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" | "keyword" => Some(AnalysisMode::Rules),
            "ai" | "llm" => Some(AnalysisMode::Ai),
            _ => None,
        }
    }
}

/// Analysis provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// "rules" or "ai".
    pub mode: String,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl AnalysisConfig {
    /// Parsed mode; unknown values are treated as rules.
    pub fn mode(&self) -> AnalysisMode {
        AnalysisMode::parse(&self.mode).unwrap_or(AnalysisMode::Rules)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: "rules".to_string(),
            llm: LlmConfig::default(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint used in "ai" mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token. Optional for local endpoints.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 20,
            temperature: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TriageConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.stream.keepalive_secs, 30);
        assert_eq!(config.stream.buffer_size, 256);
        assert_eq!(config.pipeline.workflow_window, 10);
        assert_eq!(config.pipeline.last_processed_chars, 100);
        assert_eq!(config.analysis.mode(), AnalysisMode::Rules);
        assert!(config.analysis.llm.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[server]
port = 9000
log_level = "debug"

[stream]
keepalive_secs = 5

[pipeline]
stage_delay_ms = 0
workflow_window = 3

[analysis]
mode = "ai"

[analysis.llm]
base_url = "http://localhost:11434/v1"
model = "llama3"
"#,
        );

        let config = TriageConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.stream.keepalive_secs, 5);
        assert_eq!(config.stream.buffer_size, 256);
        assert_eq!(config.pipeline.stage_delay_ms, 0);
        assert_eq!(config.pipeline.workflow_window, 3);
        assert_eq!(config.analysis.mode(), AnalysisMode::Ai);
        assert_eq!(config.analysis.llm.model, "llama3");
        assert_eq!(config.analysis.llm.timeout_secs, 20);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = TriageConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.pipeline.stage_delay_ms, 500);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("server = [[[");
        let err = TriageConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_load_optional_missing_file() {
        let loaded = TriageConfig::load_optional(Path::new("/nonexistent/triage.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_optional_reports_malformed_file() {
        let file = create_temp_config("[server]\nport = \"not a number\"");
        let err = TriageConfig::load_optional(file.path()).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_load_optional_existing_file() {
        let file = create_temp_config("[server]\nport = 9100");
        let config = TriageConfig::load_optional(file.path()).unwrap().unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TriageConfig::default();
        config.server.port = 4242;
        config.analysis.mode = "ai".to_string();
        config.save(&path).unwrap();

        let reloaded = TriageConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, 4242);
        assert_eq!(reloaded.analysis.mode(), AnalysisMode::Ai);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = TriageConfig::default();
        config.stream.keepalive_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TriageConfig::default();
        config.stream.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = TriageConfig::default();
        config.pipeline.workflow_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_mode_and_temperature() {
        let mut config = TriageConfig::default();
        config.analysis.mode = "magic".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("magic"));

        let mut config = TriageConfig::default();
        config.analysis.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_analysis_mode_parse() {
        assert_eq!(AnalysisMode::parse("RULES"), Some(AnalysisMode::Rules));
        assert_eq!(AnalysisMode::parse("llm"), Some(AnalysisMode::Ai));
        assert_eq!(AnalysisMode::parse(" ai "), Some(AnalysisMode::Ai));
        assert_eq!(AnalysisMode::parse("other"), None);
    }
}

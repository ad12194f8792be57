//! Configuration for the evaluation service.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Judge model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Whether rows are sent to the judge at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL for the OpenAI-compatible API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Judge model name
    pub model: String,

    /// Request timeout in seconds for a single judge call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

/// Where the daily logs live and where reports go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the log tree.
    pub logs_dir: PathBuf,
    /// Subdirectory of `logs_dir` holding orchestrator routing logs.
    pub routing_subdir: String,
    /// Subdirectory of `logs_dir` holding agent response logs.
    pub responses_subdir: String,
    /// Directory the date-stamped report is written to.
    pub report_dir: PathBuf,
    /// Ground truth table used when a request does not name one.
    pub ground_truth: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            routing_subdir: "orchestrator".to_string(),
            responses_subdir: "openai_agent".to_string(),
            report_dir: PathBuf::from("."),
            ground_truth: PathBuf::from("single_turn.csv"),
        }
    }
}

/// Pipeline behaviour switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Collect malformed log lines instead of aborting the run.
    #[serde(default)]
    pub lenient_log_parsing: bool,
    /// Evaluate only responses whose id appears in the response-id file.
    /// When false the id file only gates the run on being non-empty.
    #[serde(default)]
    pub filter_rows: bool,
}

/// Job endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the job endpoint binds to.
    pub bind_addr: String,
    /// Timeout in seconds for webhook delivery.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Judge settings
    pub judge: JudgeConfig,
    /// Input and output locations
    pub paths: PathsConfig,
    /// Pipeline switches
    pub pipeline: PipelineConfig,
    /// Job endpoint
    pub server: ServerConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    judge: Option<JudgeFileSection>,
    paths: Option<PathsFileSection>,
    pipeline: Option<PipelineFileSection>,
    server: Option<ServerFileSection>,
}

#[derive(Debug, Deserialize)]
struct JudgeFileSection {
    enabled: Option<bool>,
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct PathsFileSection {
    logs_dir: Option<PathBuf>,
    routing_subdir: Option<String>,
    responses_subdir: Option<String>,
    report_dir: Option<PathBuf>,
    ground_truth: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PipelineFileSection {
    lenient_log_parsing: Option<bool>,
    filter_rows: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ServerFileSection {
    bind_addr: Option<String>,
    webhook_timeout_secs: Option<u64>,
}

/// Parse a boolean-ish environment value ("1", "true", "yes", "on").
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (OPENAI_API_KEY, LLM_JUDGE_MODEL, EVAL_LOGS_DIR, ...)
    /// 2. Config file (~/.config/turn-scorer/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.judge.api_base = api_base;
        }

        // OPENAI_API_KEY wins over the generic name.
        if let Some(api_key) = lookup("OPENAI_API_KEY").or_else(|| lookup("LLM_API_KEY")) {
            self.judge.api_key = api_key;
        }

        if let Some(model) = lookup("LLM_JUDGE_MODEL") {
            self.judge.model = model;
        }

        if let Some(enabled) = lookup("LLM_JUDGE_ENABLED").and_then(|v| parse_flag(&v)) {
            self.judge.enabled = enabled;
        }

        if let Some(timeout) = lookup("LLM_JUDGE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.judge.timeout_secs = timeout;
        }

        if let Some(logs_dir) = lookup("EVAL_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(logs_dir);
        }

        if let Some(report_dir) = lookup("EVAL_REPORT_DIR") {
            self.paths.report_dir = PathBuf::from(report_dir);
        }

        if let Some(lenient) = lookup("EVAL_LENIENT_LOGS").and_then(|v| parse_flag(&v)) {
            self.pipeline.lenient_log_parsing = lenient;
        }

        if let Some(filter) = lookup("EVAL_FILTER_ROWS").and_then(|v| parse_flag(&v)) {
            self.pipeline.filter_rows = filter;
        }

        if let Some(bind) = lookup("EVAL_BIND_ADDR") {
            self.server.bind_addr = bind;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling unset keys with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(judge) = file_config.judge {
            if let Some(enabled) = judge.enabled {
                config.judge.enabled = enabled;
            }
            if let Some(api_base) = judge.api_base {
                config.judge.api_base = api_base;
            }
            if let Some(api_key) = judge.api_key {
                config.judge.api_key = api_key;
            }
            if let Some(model) = judge.model {
                config.judge.model = model;
            }
            if let Some(timeout_secs) = judge.timeout_secs {
                config.judge.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = judge.temperature {
                config.judge.temperature = temperature;
            }
        }

        if let Some(paths) = file_config.paths {
            if let Some(logs_dir) = paths.logs_dir {
                config.paths.logs_dir = logs_dir;
            }
            if let Some(routing_subdir) = paths.routing_subdir {
                config.paths.routing_subdir = routing_subdir;
            }
            if let Some(responses_subdir) = paths.responses_subdir {
                config.paths.responses_subdir = responses_subdir;
            }
            if let Some(report_dir) = paths.report_dir {
                config.paths.report_dir = report_dir;
            }
            if let Some(ground_truth) = paths.ground_truth {
                config.paths.ground_truth = ground_truth;
            }
        }

        if let Some(pipeline) = file_config.pipeline {
            if let Some(lenient) = pipeline.lenient_log_parsing {
                config.pipeline.lenient_log_parsing = lenient;
            }
            if let Some(filter_rows) = pipeline.filter_rows {
                config.pipeline.filter_rows = filter_rows;
            }
        }

        if let Some(server) = file_config.server {
            if let Some(bind_addr) = server.bind_addr {
                config.server.bind_addr = bind_addr;
            }
            if let Some(timeout) = server.webhook_timeout_secs {
                config.server.webhook_timeout_secs = timeout;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "turn-scorer")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    ///
    /// Credentials are only required while judging is enabled.
    pub fn validate(&self) -> Result<()> {
        if !self.judge.enabled {
            return Ok(());
        }

        if self.judge.api_base.is_empty() {
            return Err(EvalError::Config(
                "Judge API base URL is required. Set LLM_API_BASE environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.judge.api_key.is_empty() {
            return Err(EvalError::Config(
                "Judge API key is required. Set OPENAI_API_KEY environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.judge.model.is_empty() {
            return Err(EvalError::Config(
                "Judge model is required. Set LLM_JUDGE_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit judge values (useful for testing).
    pub fn with_judge(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            judge: JudgeConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.judge.enabled);
        assert!(config.judge.api_key.is_empty());
        assert_eq!(config.judge.model, "gpt-4o-mini");
        assert_eq!(config.judge.api_base, "https://api.openai.com");
        assert_eq!(config.paths.routing_subdir, "orchestrator");
        assert_eq!(config.paths.responses_subdir, "openai_agent");
        assert_eq!(config.server.webhook_timeout_secs, 10);
        assert!(!config.pipeline.lenient_log_parsing);
        assert!(!config.pipeline.filter_rows);
    }

    #[test]
    fn test_validate_fails_without_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_passes_when_judge_disabled() {
        let mut config = Config::default();
        config.judge.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_judge() {
        let config = Config::with_judge("https://api.example.com", "test-key", "gpt-4o");
        assert_eq!(config.judge.api_base, "https://api.example.com");
        assert_eq!(config.judge.api_key, "test-key");
        assert_eq!(config.judge.model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LLM_API_KEY", "generic"),
            ("OPENAI_API_KEY", "openai"),
            ("LLM_JUDGE_MODEL", "gpt-4o"),
            ("LLM_JUDGE_ENABLED", "false"),
            ("EVAL_LOGS_DIR", "/var/log/assistant"),
            ("EVAL_LENIENT_LOGS", "yes"),
            ("LLM_JUDGE_TIMEOUT_SECS", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.judge.api_key, "openai");
        assert_eq!(config.judge.model, "gpt-4o");
        assert!(!config.judge.enabled);
        assert_eq!(config.paths.logs_dir, PathBuf::from("/var/log/assistant"));
        assert!(config.pipeline.lenient_log_parsing);
        // Unparseable values leave the default alone.
        assert_eq!(config.judge.timeout_secs, 60);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
judge:
  model: gpt-4.1-mini
  enabled: false
paths:
  logs_dir: /data/logs
pipeline:
  filter_rows: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.judge.model, "gpt-4.1-mini");
        assert!(!config.judge.enabled);
        assert_eq!(config.judge.api_base, "https://api.openai.com");
        assert_eq!(config.paths.logs_dir, PathBuf::from("/data/logs"));
        assert_eq!(config.paths.routing_subdir, "orchestrator");
        assert!(config.pipeline.filter_rows);
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(Config::from_yaml("judge: [unterminated").is_err());
    }
}

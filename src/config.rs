//! Configuration system for the analysis bus
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no file)
//! yields a working configuration.

use crate::protocol::messages::{AgentType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub scanner: ScannerSection,
    /// Per agent-type overrides keyed by type name (e.g. `BUG_DETECTION`)
    #[serde(default)]
    pub agents: BTreeMap<String, AgentOverrides>,
}

/// Message bus settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusSection {
    /// Wait bound applied to requests that carry `timeout_ms = 0`
    #[serde(default = "default_request_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Channel capacity for channel-backed event subscriptions
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_request_timeout_ms(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl BusSection {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Report aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSection {
    /// Per-call timeout of the aggregator fan-out
    #[serde(default = "default_aggregation_timeout_ms")]
    pub aggregation_timeout_ms: u64,
    /// Rendering format when a render request does not name one
    #[serde(default = "default_report_format")]
    pub default_format: String,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            aggregation_timeout_ms: default_aggregation_timeout_ms(),
            default_format: default_report_format(),
        }
    }
}

/// Severity penalties subtracted from a perfect score of 100
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    #[serde(default = "default_critical_weight")]
    pub critical: u32,
    #[serde(default = "default_high_weight")]
    pub high: u32,
    #[serde(default = "default_medium_weight")]
    pub medium: u32,
    #[serde(default = "default_low_weight")]
    pub low: u32,
    #[serde(default)]
    pub info: u32,
    /// Extra penalty per correlated issue
    #[serde(default = "default_correlated_weight")]
    pub correlated: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            critical: default_critical_weight(),
            high: default_high_weight(),
            medium: default_medium_weight(),
            low: default_low_weight(),
            info: 0,
            correlated: default_correlated_weight(),
        }
    }
}

impl ScoringWeights {
    pub fn penalty(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// File-system scanning limits shared by the scanner and analyzers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerSection {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
    /// Source extensions to analyze; empty means every file
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            ignored_dirs: default_ignored_dirs(),
            extensions: default_extensions(),
        }
    }
}

/// Overrides applied to an agent's declared capabilities at registration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentOverrides {
    pub max_concurrent_messages: Option<usize>,
    pub priority: Option<i32>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_aggregation_timeout_ms() -> u64 {
    10_000
}

fn default_report_format() -> String {
    "markdown".to_string()
}

fn default_critical_weight() -> u32 {
    20
}

fn default_high_weight() -> u32 {
    10
}

fn default_medium_weight() -> u32 {
    5
}

fn default_low_weight() -> u32 {
    2
}

fn default_correlated_weight() -> u32 {
    15
}

fn default_max_files() -> usize {
    5000
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_ignored_dirs() -> Vec<String> {
    ["target", ".git", "node_modules", "build", "out", ".idea", ".gradle"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_extensions() -> Vec<String> {
    ["rs", "kt", "kts", "java", "py", "js", "ts", "go"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Unknown agent type in [agents]: {0}")]
    UnknownAgentType(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "bus.default_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.bus.subscriber_buffer == 0 {
            return Err(ConfigError::InvalidConfig(
                "bus.subscriber_buffer must be greater than 0".to_string(),
            ));
        }
        if self.report.aggregation_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "report.aggregation_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if crate::render::ReportFormat::from_str(&self.report.default_format).is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "report.default_format '{}' must be one of markdown, json, text",
                self.report.default_format
            )));
        }
        if self.scanner.max_files == 0 {
            return Err(ConfigError::InvalidConfig(
                "scanner.max_files must be greater than 0".to_string(),
            ));
        }

        for (name, overrides) in &self.agents {
            AgentType::from_str(name).map_err(|_| ConfigError::UnknownAgentType(name.clone()))?;
            if overrides.max_concurrent_messages == Some(0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "agents.{name}.max_concurrent_messages must be at least 1"
                )));
            }
        }

        Ok(())
    }

    /// Overrides configured for an agent type, if any
    pub fn overrides_for(&self, agent_type: AgentType) -> AgentOverrides {
        self.agents
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(agent_type.as_str()))
            .map(|(_, overrides)| overrides.clone())
            .unwrap_or_default()
    }

    /// Create a test configuration with short timeouts
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[bus]
default_timeout_ms = 2000

[report]
aggregation_timeout_ms = 1000

[agents.BUG_DETECTION]
max_concurrent_messages = 2
priority = 10
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

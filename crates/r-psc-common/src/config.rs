//! ---
//! psc_section: "01-core-functionality"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Shared primitives and utilities for the decision kernel."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_agent_deadline() -> Duration {
    Duration::from_millis(8_000)
}

fn default_coordinator_deadline() -> Duration {
    Duration::from_millis(20_000)
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

fn default_llm_provider() -> String {
    "gemini".to_owned()
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_owned()
}

fn default_api_key_env() -> String {
    "R_PSC_LLM_API_KEY".to_owned()
}

fn default_llm_temperature() -> f32 {
    0.2
}

fn default_llm_max_tokens() -> u32 {
    1024
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9899".parse().expect("valid default metrics address")
}

/// Primary configuration object for the R-PSC kernel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PscConfig {
    #[serde(default)]
    pub scenario: Scenario,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`PscConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedPscConfig {
    pub config: PscConfig,
    pub source: PathBuf,
}

impl PscConfig {
    pub const ENV_CONFIG_PATH: &'static str = "R_PSC_CONFIG";

    /// Load configuration from disk, respecting the `R_PSC_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedPscConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedPscConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedPscConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<PscConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.agents.assess_deadline.is_zero() {
            return Err(anyhow!("agents.assess_deadline_ms must be positive"));
        }
        if self.agents.coordinator_deadline.is_zero() {
            return Err(anyhow!("agents.coordinator_deadline_ms must be positive"));
        }
        if self.llm.enabled {
            if self.llm.provider.trim().is_empty() {
                return Err(anyhow!("llm.provider must be set when llm.enabled"));
            }
            if self.llm.model.trim().is_empty() {
                return Err(anyhow!("llm.model must be set when llm.enabled"));
            }
        }
        if let Some(path) = &self.station.dataset_path {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("station.dataset_path must not be empty"));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for PscConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: PscConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Electricity price scenario bound at startup.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Scenario::Normal),
            "high" => Ok(Scenario::High),
            other => Err(format!("unknown price scenario: {}", other)),
        }
    }
}

/// Station data bindings: historical dataset, tunnel geometry, model artifact.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationConfig {
    /// CSV dataset of historical operation. When unset, a seeded synthetic
    /// dataset backs the kernel (replay and tests).
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
    /// Level↔volume lookup table for the tunnel. Built-in table when unset.
    #[serde(default)]
    pub geometry_path: Option<PathBuf>,
    /// Forecaster weight artifact. Persistence-only forecasts when unset.
    #[serde(default)]
    pub forecaster_model_path: Option<PathBuf>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_agent_deadline", rename = "assess_deadline_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub assess_deadline: Duration,
    #[serde(
        default = "default_coordinator_deadline",
        rename = "coordinator_deadline_ms"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub coordinator_deadline: Duration,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            assess_deadline: default_agent_deadline(),
            coordinator_deadline: default_coordinator_deadline(),
        }
    }
}

/// LLM narrator settings. The kernel is fully functional with `enabled = false`;
/// agents then fall back to deterministic narrative text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PscConfig::default();
        config.validate().expect("default config must be valid");
        assert_eq!(config.scenario, Scenario::Normal);
        assert_eq!(config.agents.assess_deadline, Duration::from_millis(8_000));
        assert_eq!(
            config.agents.coordinator_deadline,
            Duration::from_millis(20_000)
        );
        assert!(!config.llm.enabled);
    }

    #[test]
    fn parses_toml_overrides() {
        let config: PscConfig = r#"
            scenario = "high"

            [agents]
            assess_deadline_ms = 2000
            coordinator_deadline_ms = 5000

            [llm]
            enabled = true
            provider = "openai"
            model = "gpt-4o-mini"
            base_url = "http://localhost:11434/v1"
        "#
        .parse()
        .expect("config must parse");
        assert_eq!(config.scenario, Scenario::High);
        assert_eq!(config.agents.assess_deadline, Duration::from_millis(2_000));
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn rejects_enabled_llm_without_model() {
        let parsed = r#"
            [llm]
            enabled = true
            model = ""
        "#
        .parse::<PscConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn scenario_from_str_round_trips() {
        assert_eq!("normal".parse::<Scenario>().unwrap(), Scenario::Normal);
        assert_eq!("HIGH".parse::<Scenario>().unwrap(), Scenario::High);
        assert!("storm".parse::<Scenario>().is_err());
    }
}

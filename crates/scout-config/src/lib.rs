use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable consulted for the remote browser credential
pub const API_KEY_ENV: &str = "SCOUT_API_KEY";

/// Environment variable consulted for the remote browser project
pub const PROJECT_ID_ENV: &str = "SCOUT_PROJECT_ID";

/// Default search locations, first match wins
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "./scout.toml",
    "~/.config/scout/config.toml",
    "~/.scout.toml",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where the browser-automation capability runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Credential for the remote environment (falls back to `SCOUT_API_KEY`)
    pub api_key: Option<String>,
    /// Project for the remote environment (falls back to `SCOUT_PROJECT_ID`)
    pub project_id: Option<String>,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Local,
            api_key: None,
            project_id: None,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Agent execution mode passed through to the capability
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_verbose")]
    pub verbose: u8,
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_mode() -> String {
    "dom".to_string()
}

fn default_max_steps() -> u32 {
    20
}

fn default_verbose() -> u8 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            mode: default_mode(),
            max_steps: default_max_steps(),
            verbose: default_verbose(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Per-session log buffer cap; oldest entries are dropped first
    pub max_logs: usize,
    /// Terminal sessions older than this are removed by the sweeper
    pub retention_minutes: u64,
    pub sweep_interval_minutes: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_logs: 1000,
            retention_minutes: 60,
            sweep_interval_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Fallback endpoint for the session-ended event when the page has no tracking hook
    pub endpoint: Option<String>,
    pub close_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            close_timeout_ms: 3000,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists. Falls back to defaults when nothing is found.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path_to_load = match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    anyhow::bail!("Config file not found: {}", path);
                }
                Some(path.to_string())
            }
            None => DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
                let expanded_path = shellexpand::tilde(path);
                if Path::new(expanded_path.as_ref()).exists() {
                    Some(expanded_path.to_string())
                } else {
                    None
                }
            }),
        };

        let Some(path) = path_to_load else {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        debug!("Loaded config from {}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            anyhow::bail!("agent.max_steps must be at least 1");
        }
        if self.sessions.max_logs == 0 {
            anyhow::bail!("sessions.max_logs must be at least 1");
        }
        if self.sessions.sweep_interval_minutes == 0 {
            anyhow::bail!("sessions.sweep_interval_minutes must be at least 1");
        }
        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}

use scout_config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Per-run task configuration. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Target page the agent starts from
    pub website: String,
    /// Natural-language task for the agent
    pub instruction: String,
    pub max_steps: u32,
    pub environment: Environment,
    pub verbose: u8,
    #[serde(default)]
    pub credentials: Credentials,
    pub model: String,
    pub mode: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stable identity for downstream observers; generated when absent
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub telemetry_endpoint: Option<String>,
    pub close_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Never echoed back to observers
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl TaskConfig {
    /// Task with reference defaults (20 steps, local environment)
    pub fn new(website: &str, instruction: &str) -> Self {
        Self::from_config(&Config::default(), website, instruction)
    }

    pub fn from_config(config: &Config, website: &str, instruction: &str) -> Self {
        Self {
            website: website.to_string(),
            instruction: instruction.to_string(),
            max_steps: config.agent.max_steps,
            environment: config.browser.environment,
            verbose: config.agent.verbose,
            credentials: Credentials {
                api_key: config.browser.api_key.clone(),
                project_id: config.browser.project_id.clone(),
            },
            model: config.agent.model.clone(),
            mode: config.agent.mode.clone(),
            system_prompt: config.agent.system_prompt.clone(),
            task_id: None,
            headless: config.browser.headless,
            telemetry_endpoint: config.telemetry.endpoint.clone(),
            close_timeout_ms: config.telemetry.close_timeout_ms,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_credentials(mut self, api_key: Option<&str>, project_id: Option<&str>) -> Self {
        self.credentials = Credentials {
            api_key: api_key.map(str::to_string),
            project_id: project_id.map(str::to_string),
        };
        self
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    pub fn with_telemetry_endpoint(mut self, endpoint: &str) -> Self {
        self.telemetry_endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_close_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.close_timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let task = TaskConfig::new("https://example.com", "Find the pricing page");
        assert_eq!(task.max_steps, 20);
        assert_eq!(task.environment, Environment::Local);
        assert_eq!(task.close_timeout_ms, 3000);
        assert!(task.task_id.is_none());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let task = TaskConfig::new("https://example.com", "x")
            .with_credentials(Some("secret"), Some("proj"));
        let json = serde_json::to_string(&task).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("proj"));
    }
}

use thiserror::Error;

/// Errors that interrupt the caller. Everything else in a run is recovered
/// locally and only logged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Remote environment requires a {what}: set it in the config or via {env_var}")]
    MissingCredential {
        what: &'static str,
        env_var: &'static str,
    },

    #[error("Orchestrator is not initialized; call init() first")]
    NotInitialized,

    #[error("Orchestrator cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Browser engine has no controllable page")]
    NoSurface,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_message_names_env_var() {
        let err = OrchestratorError::MissingCredential {
            what: "project id",
            env_var: "SCOUT_PROJECT_ID",
        };
        let message = err.to_string();
        assert!(message.contains("project id"));
        assert!(message.contains("SCOUT_PROJECT_ID"));
    }
}

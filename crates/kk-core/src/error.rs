use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("prerequisite not met: {0}")]
    Prerequisite(String),

    #[error("cluster not ready: {0}")]
    Transient(String),

    #[error("`{command}` failed (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    #[error("selection cancelled by user")]
    PromptCancelled,

    #[error("interactive prompt failed: {0}")]
    Prompt(String),

    #[error("state persistence failed: {0}")]
    State(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl KeeperError {
    pub fn configuration(message: impl Into<String>) -> Self {
        KeeperError::Configuration(message.into())
    }

    pub fn prerequisite(message: impl Into<String>) -> Self {
        KeeperError::Prerequisite(message.into())
    }

    /// True for errors raised before any stage could run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KeeperError::Configuration(_) | KeeperError::ConfigNotFound(_) | KeeperError::Yaml(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;

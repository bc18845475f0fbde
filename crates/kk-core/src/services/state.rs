use std::path::{Path, PathBuf};

use crate::error::{KeeperError, Result};
use crate::models::{BuildState, Configuration};

pub struct BuildStateStore {
    state_file_path: PathBuf,
}

impl BuildStateStore {
    pub fn new(state_file_path: impl Into<PathBuf>) -> Self {
        Self {
            state_file_path: state_file_path.into(),
        }
    }

    pub fn for_config(config: &Configuration) -> Self {
        Self::new(config.state_file())
    }

    pub fn path(&self) -> &Path {
        &self.state_file_path
    }

    /// Load the persisted snapshot, or start fresh when there is none.
    ///
    /// An unreadable or corrupt snapshot is treated as no prior state.
    pub async fn load(&self, config: Configuration) -> BuildState {
        match self.read().await {
            Ok(Some(state)) => {
                tracing::info!(
                    path = %self.state_file_path.display(),
                    completed = state.completed_stages().len(),
                    "loaded build state"
                );
                state.with_config(config)
            }
            Ok(None) => BuildState::new(config),
            Err(e) => {
                tracing::warn!(
                    path = %self.state_file_path.display(),
                    error = %e,
                    "ignoring unreadable build state, starting fresh"
                );
                BuildState::new(config)
            }
        }
    }

    /// Read the snapshot without falling back; `None` when absent.
    pub async fn read(&self) -> Result<Option<BuildState>> {
        if !self.state_file_path.exists() {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&self.state_file_path)
            .await
            .map_err(|e| KeeperError::State(format!("failed to read state file: {e}")))?;
        let state: BuildState = serde_json::from_str(&json)?;
        Ok(Some(state))
    }

    pub async fn save(&self, state: &BuildState) -> Result<()> {
        if let Some(parent) = self.state_file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KeeperError::State(format!("failed to create state dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.state_file_path, json)
            .await
            .map_err(|e| KeeperError::State(format!("failed to write state file: {e}")))?;
        Ok(())
    }

    /// Save, logging instead of failing; persistence is best-effort.
    pub async fn save_logged(&self, state: &BuildState) {
        if let Err(e) = self.save(state).await {
            tracing::error!(path = %self.state_file_path.display(), error = %e, "could not persist build state");
        }
    }
}

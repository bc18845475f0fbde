use std::path::Path;

use crate::error::{KeeperError, Result};
use crate::models::ConfigFile;

pub fn load(config_path: &Path) -> Result<ConfigFile> {
    if !config_path.exists() {
        return Err(KeeperError::ConfigNotFound(config_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(config_path)?;
    let file: ConfigFile = serde_yaml::from_str(&contents)?;
    if let Some(0) = file.crd_timeout_secs {
        return Err(KeeperError::configuration(
            "crd_timeout_secs must be greater than zero",
        ));
    }
    Ok(file)
}

use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{StageId, StageResult};
use crate::services::command::ExecOptions;
use crate::services::stage::{Stage, StageContext};

/// Checks the host before anything is installed: privilege level, a
/// reachable docker daemon, and curl for the tool installers.
pub struct PrerequisitesStage {
    is_root: fn() -> bool,
}

impl Default for PrerequisitesStage {
    fn default() -> Self {
        Self {
            is_root: running_as_root,
        }
    }
}

impl PrerequisitesStage {
    #[cfg(test)]
    fn with_root_check(is_root: fn() -> bool) -> Self {
        Self { is_root }
    }
}

fn running_as_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[async_trait]
impl Stage for PrerequisitesStage {
    fn id(&self) -> StageId {
        StageId::PREREQUISITES
    }

    fn name(&self) -> &'static str {
        "prerequisites"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let config = ctx.config();
        let runner = ctx.runner();
        let mut result = StageResult::success("host prerequisites satisfied");

        if (self.is_root)() {
            if !config.allow_root {
                return Err(KeeperError::prerequisite(
                    "refusing to run as root; re-run as a regular user or pass --allow-root",
                ));
            }
            result = result.with_warning("running as root because --allow-root was given");
        }

        if !runner.exists("docker").await {
            return Err(KeeperError::prerequisite(
                "docker is not installed; kind needs it to run cluster nodes",
            ));
        }
        let info = runner
            .exec("docker", &["info"], ExecOptions::probe())
            .await?;
        if !info.success() {
            return Err(KeeperError::prerequisite(format!(
                "docker daemon is not reachable: {}",
                info.stderr
            )));
        }

        if !runner.exists("curl").await {
            return Err(KeeperError::prerequisite(
                "curl is required to download tools",
            ));
        }

        Ok(result)
    }
}

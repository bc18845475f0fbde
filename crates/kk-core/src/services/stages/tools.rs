use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StageId, StageResult};
use crate::services::stage::{Stage, StageContext};
use crate::services::tools::{self, Tool};

pub struct ToolsStage {
    tools: Vec<Tool>,
}

impl Default for ToolsStage {
    fn default() -> Self {
        Self {
            tools: tools::ALL.to_vec(),
        }
    }
}

#[async_trait]
impl Stage for ToolsStage {
    fn id(&self) -> StageId {
        StageId::TOOLS
    }

    fn name(&self) -> &'static str {
        "tools"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let runner = ctx.runner();
        let mut installed = Vec::new();

        for tool in &self.tools {
            if tool.is_installed(runner).await {
                tracing::debug!(tool = tool.name, "already installed");
                continue;
            }
            tool.install(runner).await?;
            installed.push(tool.name);
        }

        let message = if installed.is_empty() {
            "all tools already present".to_string()
        } else {
            format!("installed {}", installed.join(", "))
        };
        Ok(StageResult::success(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeeperError;
    use crate::models::Configuration;
    use crate::test_support::{fail, Harness, ScriptedRunner};

    #[tokio::test]
    async fn present_tools_are_left_alone() {
        let harness = Harness::new(Configuration::default(), ScriptedRunner::new());
        let result = harness.execute(&ToolsStage::default()).await.unwrap();
        assert_eq!(result.message(), "all tools already present");
        assert_eq!(harness.runner.count_calls("sh -c"), 0);
    }

    #[tokio::test]
    async fn installs_only_missing_tools() {
        let runner = ScriptedRunner::new()
            .missing_until_installed("kind")
            .missing_until_installed("ksm");
        let harness = Harness::new(Configuration::default(), runner);
        let result = harness.execute(&ToolsStage::default()).await.unwrap();
        assert_eq!(result.message(), "installed kind, ksm");
        assert_eq!(harness.runner.count_calls("kind-linux-amd64"), 1);
        assert_eq!(harness.runner.count_calls("get-helm-3"), 0);
    }

    #[tokio::test]
    async fn tool_still_missing_after_install_is_an_error() {
        let runner = ScriptedRunner::new().missing_tool("kind");
        let harness = Harness::new(Configuration::default(), runner);
        let err = harness.execute(&ToolsStage::default()).await.unwrap_err();
        assert!(matches!(err, KeeperError::Prerequisite(msg) if msg.contains("kind")));
    }

    #[tokio::test]
    async fn install_failure_stops_the_stage() {
        let runner = ScriptedRunner::new()
            .missing_tool("go")
            .on("go.dev", fail("403 Forbidden"));
        let harness = Harness::new(Configuration::default(), runner);
        let err = harness.execute(&ToolsStage::default()).await.unwrap_err();
        assert!(matches!(err, KeeperError::CommandFailed { .. }));
        assert_eq!(harness.runner.count_calls("keeper-secrets-manager-cli"), 0);
    }
}

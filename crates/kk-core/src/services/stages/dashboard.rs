use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{PortRole, StageId, StageResult, StateUpdate};
use crate::services::command::ExecOptions;
use crate::services::manifests::{
    self, DASHBOARD_ADMIN, DASHBOARD_CHART, DASHBOARD_NAMESPACE, DASHBOARD_RELEASE,
    DASHBOARD_REPO_URL,
};
use crate::services::stage::{Stage, StageContext};

const TOKEN_DURATION: &str = "--duration=720h";

/// Installs the Kubernetes Dashboard and mints a token for its admin account.
#[derive(Default)]
pub struct DashboardStage;

#[async_trait]
impl Stage for DashboardStage {
    fn id(&self) -> StageId {
        StageId::DASHBOARD
    }

    fn name(&self) -> &'static str {
        "dashboard"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let runner = ctx.runner();

        runner
            .exec(
                "helm",
                &["repo", "add", "kubernetes-dashboard", DASHBOARD_REPO_URL, "--force-update"],
                ExecOptions::default(),
            )
            .await?;
        runner
            .exec("helm", &["repo", "update"], ExecOptions::default())
            .await?;
        runner
            .exec(
                "helm",
                &[
                    "upgrade",
                    "--install",
                    DASHBOARD_RELEASE,
                    DASHBOARD_CHART,
                    "--namespace",
                    DASHBOARD_NAMESPACE,
                    "--create-namespace",
                    "--wait",
                    "--timeout",
                    "5m",
                ],
                ExecOptions::default(),
            )
            .await?;

        runner.apply_manifest(&manifests::dashboard_admin()).await?;

        let token = match ctx.state.dashboard_token() {
            Some(token) => {
                tracing::info!("reusing persisted dashboard token");
                token.to_string()
            }
            None => {
                let output = runner
                    .exec(
                        "kubectl",
                        &[
                            "-n",
                            DASHBOARD_NAMESPACE,
                            "create",
                            "token",
                            DASHBOARD_ADMIN,
                            TOKEN_DURATION,
                        ],
                        ExecOptions::default(),
                    )
                    .await?;
                let token = output.stdout.trim().to_string();
                if token.is_empty() {
                    return Err(KeeperError::Transient(
                        "dashboard token request returned nothing".into(),
                    ));
                }
                token
            }
        };

        let port = ctx
            .state
            .port_allocation()
            .and_then(|p| p.get(PortRole::Dashboard))
            .unwrap_or(PortRole::Dashboard.default_port());
        let message = format!(
            "dashboard installed; reach it with `kubectl -n {DASHBOARD_NAMESPACE} port-forward \
             svc/{DASHBOARD_RELEASE}-kong-proxy {port}:443`"
        );
        Ok(StageResult::success(message).with_update(StateUpdate::DashboardToken(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildState, Configuration, PortAllocation};
    use crate::test_support::{ok, Harness, ScriptedRunner};

    fn token_of(result: &StageResult) -> Option<String> {
        match result {
            StageResult::Success { updates, .. } => updates.iter().find_map(|u| match u {
                StateUpdate::DashboardToken(t) => Some(t.clone()),
                _ => None,
            }),
            _ => None,
        }
    }

    #[tokio::test]
    async fn installs_and_mints_token() {
        let runner = ScriptedRunner::new().on("create token admin-user", ok("eyJhbGciOiJSUzI1NiJ9.x.y\n"));
        let harness = Harness::new(Configuration::default(), runner);

        let result = harness.execute(&DashboardStage).await.unwrap();

        assert_eq!(token_of(&result).as_deref(), Some("eyJhbGciOiJSUzI1NiJ9.x.y"));
        assert_eq!(harness.runner.count_calls("helm upgrade --install kubernetes-dashboard"), 1);
        assert!(harness.runner.applied()[0].contains("ClusterRoleBinding"));
        assert!(result.message().contains("8001:443"));
    }

    #[tokio::test]
    async fn persisted_token_is_reused() {
        let mut state = BuildState::new(Configuration::default());
        state.apply(StateUpdate::DashboardToken("kept".into()));
        let mut ports = PortAllocation::new();
        ports.assign(PortRole::Dashboard, 9001);
        state.apply(StateUpdate::Ports(ports));
        let harness =
            Harness::new(Configuration::default(), ScriptedRunner::new()).with_state(state);

        let result = harness.execute(&DashboardStage).await.unwrap();

        assert_eq!(token_of(&result).as_deref(), Some("kept"));
        assert_eq!(harness.runner.count_calls("create token"), 0);
        assert!(result.message().contains("9001:443"));
    }

    #[tokio::test]
    async fn empty_token_is_an_error() {
        let harness = Harness::new(Configuration::default(), ScriptedRunner::new());
        let err = harness.execute(&DashboardStage).await.unwrap_err();
        assert!(matches!(err, KeeperError::Transient(_)));
    }
}

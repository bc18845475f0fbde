use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{StageId, StageResult};
use crate::services::command::{CommandRunner, ExecOptions};
use crate::services::manifests::{CLUSTER_STORE, DASHBOARD_NAMESPACE, ESO_NAMESPACE};
use crate::services::stage::{Stage, StageContext};

/// End-to-end checks over whatever earlier stages actually set up.
#[derive(Default)]
pub struct ValidationStage;

/// Rows of `--no-headers` output whose status column is not `expected`.
async fn unhealthy_rows(
    runner: &dyn CommandRunner,
    args: &[&str],
    status_column: usize,
    expected: &[&str],
) -> Result<Vec<String>> {
    let output = runner.exec("kubectl", args, ExecOptions::default()).await?;
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let status = line.split_whitespace().nth(status_column).unwrap_or("");
            !expected.contains(&status)
        })
        .map(|line| line.split_whitespace().next().unwrap_or("").to_string())
        .collect())
}

#[async_trait]
impl Stage for ValidationStage {
    fn id(&self) -> StageId {
        StageId::VALIDATION
    }

    fn name(&self) -> &'static str {
        "validation"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let runner = ctx.runner();
        let state = ctx.state;
        let mut checks = 0;

        let nodes = unhealthy_rows(runner, &["get", "nodes", "--no-headers"], 1, &["Ready"]).await?;
        if !nodes.is_empty() {
            return Err(KeeperError::Transient(format!(
                "nodes not ready: {}",
                nodes.join(", ")
            )));
        }
        checks += 1;

        if state.is_completed(StageId::DASHBOARD) {
            let pods = unhealthy_rows(
                runner,
                &["get", "pods", "-n", DASHBOARD_NAMESPACE, "--no-headers"],
                2,
                &["Running", "Completed"],
            )
            .await?;
            if !pods.is_empty() {
                return Err(KeeperError::Transient(format!(
                    "dashboard pods not running: {}",
                    pods.join(", ")
                )));
            }
            checks += 1;
        }

        if state.is_completed(StageId::SECRETS_OPERATOR) {
            let pods = unhealthy_rows(
                runner,
                &["get", "pods", "-n", ESO_NAMESPACE, "--no-headers"],
                2,
                &["Running", "Completed"],
            )
            .await?;
            if !pods.is_empty() {
                return Err(KeeperError::Transient(format!(
                    "secrets operator pods not running: {}",
                    pods.join(", ")
                )));
            }
            checks += 1;
        }

        if state.is_completed(StageId::BACKEND) {
            let ready = runner
                .exec(
                    "kubectl",
                    &[
                        "get",
                        "clustersecretstore",
                        CLUSTER_STORE,
                        "-o",
                        "jsonpath={.status.conditions[?(@.type==\"Ready\")].status}",
                    ],
                    ExecOptions::default(),
                )
                .await?;
            if ready.stdout.trim() != "True" {
                return Err(KeeperError::Transient(format!(
                    "secret store {CLUSTER_STORE} is not Ready; check the KSM credentials"
                )));
            }
            checks += 1;
        }

        Ok(StageResult::success(format!("{checks} checks passed")))
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StageId, StageResult};
use crate::services::command::ExecOptions;
use crate::services::crd::{CrdProber, ExtensionSpec, ProbeSchedule};
use crate::services::manifests::{ESO_CHART, ESO_NAMESPACE, ESO_RELEASE, ESO_REPO_URL};
use crate::services::stage::{Stage, StageContext};

/// Installs the External Secrets Operator and waits until its resource
/// types can actually be used.
pub struct SecretsOperatorStage {
    poll_interval: Duration,
}

impl Default for SecretsOperatorStage {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl SecretsOperatorStage {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl Stage for SecretsOperatorStage {
    fn id(&self) -> StageId {
        StageId::SECRETS_OPERATOR
    }

    fn name(&self) -> &'static str {
        "secrets-operator"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let runner = ctx.runner();

        runner
            .exec(
                "helm",
                &["repo", "add", "external-secrets", ESO_REPO_URL, "--force-update"],
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
                    ESO_RELEASE,
                    ESO_CHART,
                    "--namespace",
                    ESO_NAMESPACE,
                    "--create-namespace",
                    "--set",
                    "installCRDs=true",
                    "--wait",
                ],
                ExecOptions::default(),
            )
            .await?;

        let timeout = ctx.config().crd_timeout;
        let schedule = ProbeSchedule {
            interval: self.poll_interval,
            ..ProbeSchedule::with_timeout(timeout)
        };
        let prober = CrdProber::new(runner, ExtensionSpec::external_secrets());
        let report = prober.wait_until_ready(schedule).await;

        if report.is_ready() {
            let mut result = StageResult::success(format!(
                "external secrets operator ready after {} checks",
                report.polls
            ));
            if report.recovered {
                result = result.with_warning("operator controllers had to be restarted once");
            }
            return Ok(result);
        }

        tracing::warn!(phase = %report.phase, "falling back to functional checks");
        if prober.manual_functional_check().await {
            return Ok(StageResult::success("external secrets operator usable").with_warning(
                format!(
                    "resource types were not reported Established within {}s, \
                     but dry-run creates and lists succeed",
                    timeout.as_secs()
                ),
            ));
        }

        let diagnosis = prober.diagnose().await;
        Ok(StageResult::failure(
            format!(
                "external secrets operator not usable after {}s",
                timeout.as_secs()
            ),
            diagnosis.to_string(),
        ))
    }
}

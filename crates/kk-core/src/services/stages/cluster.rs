use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{PortRole, StageId, StageResult, StateUpdate};
use crate::services::command::{CommandRunner, ExecOptions};
use crate::services::manifests;
use crate::services::stage::{Stage, StageContext};

const NODE_READY_TIMEOUT: &str = "--timeout=180s";

/// Resolves the host port allocation and brings up the kind cluster that
/// publishes it.
#[derive(Default)]
pub struct ClusterStage;

async fn cluster_exists(runner: &dyn CommandRunner, name: &str) -> Result<bool> {
    let output = runner
        .exec("kind", &["get", "clusters"], ExecOptions::default())
        .await?;
    Ok(output.stdout.lines().any(|line| line.trim() == name))
}

#[async_trait]
impl Stage for ClusterStage {
    fn id(&self) -> StageId {
        StageId::CLUSTER
    }

    fn name(&self) -> &'static str {
        "cluster"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let config = ctx.config();
        let runner = ctx.runner();
        let name = config.cluster_name.as_str();

        let prior = ctx.state.port_allocation();
        let persisted = |role: PortRole| prior.as_ref().and_then(|p| p.get(role));
        let mut notes = Vec::new();
        let mut overrides = config.port_overrides.clone();
        // a resumed run keeps what the interrupted run published
        if config.resume_from.is_some() {
            overrides.retain(|role, port| match persisted(*role) {
                Some(old) if old != *port => {
                    tracing::warn!(%role, old, ignored = *port, "keeping persisted port on resume");
                    notes.push(format!(
                        "{role} port {old} kept on resume; override {port} ignored"
                    ));
                    false
                }
                _ => true,
            });
        }
        for (role, port) in &overrides {
            if let Some(old) = persisted(*role).filter(|old| old != port) {
                notes.push(format!("{role} port changed from {old} to {port} by override"));
            }
        }

        let ports = ctx
            .env
            .ports
            .resolve_assignment(
                &overrides,
                prior.as_ref(),
                config.port_mode,
                ctx.env.prompter,
            )
            .await?;
        if !ports.is_complete() || !ports.is_distinct() {
            return Err(KeeperError::PortAllocation(
                "allocation is missing roles or reuses a port".into(),
            ));
        }

        let mut result = StageResult::success(format!("cluster {name} ready"));
        for role in ports.forced_roles() {
            if let Some(port) = ports.get(*role) {
                result = result.with_warning(format!(
                    "{role} port {port} is already in use; the cluster may fail to bind it"
                ));
            }
        }
        for note in notes {
            result = result.with_warning(note);
        }

        let mut create = true;
        if cluster_exists(runner, name).await? {
            if config.allow_destructive {
                tracing::warn!(cluster = name, "deleting existing cluster");
                runner
                    .exec("kind", &["delete", "cluster", "--name", name], ExecOptions::default())
                    .await?;
            } else {
                tracing::info!(cluster = name, "reusing existing cluster");
                result = result.with_warning(format!(
                    "cluster {name} already existed and was reused; its port mappings were not changed \
                     (pass --allow-destructive to recreate it)"
                ));
                create = false;
            }
        }

        if create {
            tracing::info!(cluster = name, "creating cluster");
            runner
                .exec(
                    "kind",
                    &["create", "cluster", "--name", name, "--config", "-"],
                    ExecOptions::default().with_input(manifests::kind_config(&ports)),
                )
                .await?;
        }

        let context = format!("kind-{name}");
        runner
            .exec(
                "kubectl",
                &["cluster-info", "--context", &context],
                ExecOptions::default(),
            )
            .await?;
        let wait = runner
            .exec(
                "kubectl",
                &[
                    "wait",
                    "--for=condition=Ready",
                    "nodes",
                    "--all",
                    NODE_READY_TIMEOUT,
                ],
                ExecOptions::default(),
            )
            .await;
        if let Err(e) = wait {
            return Err(KeeperError::Transient(format!("nodes did not become ready: {e}")));
        }

        Ok(result
            .with_update(StateUpdate::Ports(ports))
            .with_update(StateUpdate::ClusterReady))
    }
}

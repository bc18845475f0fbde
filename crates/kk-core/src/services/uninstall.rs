use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::models::{Configuration, StageId};
use crate::services::command::{CommandRunner, ExecOptions};
use crate::services::manifests::{CLUSTER_STORE, CREDENTIAL_SECRET, ESO_NAMESPACE, ESO_RELEASE};
use crate::services::state::BuildStateStore;

/// How much of an installation to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallScope {
    /// Secret store, credentials and the operator; the cluster stays.
    Backend,
    /// The whole kind cluster.
    Cluster,
    /// The cluster plus the working directory with its state and logs.
    Purge,
}

impl UninstallScope {
    pub fn as_str(self) -> &'static str {
        match self {
            UninstallScope::Backend => "backend",
            UninstallScope::Cluster => "cluster",
            UninstallScope::Purge => "purge",
        }
    }

    /// Stages whose progress survives this teardown.
    fn keeps(self, id: StageId) -> bool {
        match self {
            UninstallScope::Backend => id < StageId::SECRETS_OPERATOR,
            UninstallScope::Cluster => id < StageId::CLUSTER,
            UninstallScope::Purge => false,
        }
    }
}

impl fmt::Display for UninstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UninstallScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backend" => Ok(UninstallScope::Backend),
            "cluster" => Ok(UninstallScope::Cluster),
            "purge" => Ok(UninstallScope::Purge),
            other => Err(format!("unknown uninstall scope '{other}'")),
        }
    }
}

/// Tear down what an installation created and rewind the build state so
/// the next `install` redoes the removed stages.
pub async fn uninstall(
    config: &Configuration,
    runner: &dyn CommandRunner,
    scope: UninstallScope,
) -> Result<()> {
    tracing::info!(%scope, cluster = %config.cluster_name, "uninstalling");

    match scope {
        UninstallScope::Backend => remove_backend(runner).await?,
        UninstallScope::Cluster | UninstallScope::Purge => {
            runner
                .exec(
                    "kind",
                    &["delete", "cluster", "--name", &config.cluster_name],
                    ExecOptions::default(),
                )
                .await?;
        }
    }

    let store = BuildStateStore::for_config(config);
    if scope == UninstallScope::Purge {
        if config.work_dir.exists() {
            tokio::fs::remove_dir_all(&config.work_dir).await?;
        }
        return Ok(());
    }

    if let Some(state) = store.read().await.ok().flatten() {
        let rewound = state.with_config(config.clone()).retaining(|id| scope.keeps(id));
        store.save(&rewound).await?;
    }
    Ok(())
}

async fn remove_backend(runner: &dyn CommandRunner) -> Result<()> {
    let deletes: [&[&str]; 2] = [
        &["delete", "clustersecretstore", CLUSTER_STORE, "--ignore-not-found"],
        &[
            "delete",
            "secret",
            CREDENTIAL_SECRET,
            "-n",
            ESO_NAMESPACE,
            "--ignore-not-found",
        ],
    ];
    for args in deletes {
        runner.exec("kubectl", args, ExecOptions::default()).await?;
    }

    let release = runner
        .exec(
            "helm",
            &["uninstall", ESO_RELEASE, "--namespace", ESO_NAMESPACE],
            ExecOptions::probe(),
        )
        .await?;
    if !release.success() {
        tracing::info!(release = ESO_RELEASE, "operator release was not installed");
    }
    Ok(())
}

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{KeeperError, Result};
use crate::models::{BackendAuth, FolderDescriptor, StageId, StageResult, StateUpdate};
use crate::services::command::{CommandRunner, ExecOptions};
use crate::services::crd::{CrdProber, ExtensionSpec};
use crate::services::manifests;
use crate::services::stage::{Stage, StageContext};

/// `<22-char uid>  <name>` rows of `ksm shared-folder list`.
static FOLDER_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z0-9_-]{22})\s+(\S.*?)\s*$").unwrap());

pub fn parse_folder_list(output: &str) -> Vec<FolderDescriptor> {
    output
        .lines()
        .filter_map(|line| FOLDER_ROW_RE.captures(line))
        // the table's dashed separator row is uid-shaped too
        .filter(|caps| caps[1].chars().any(|c| c.is_ascii_alphanumeric()))
        .map(|caps| FolderDescriptor {
            id: caps[1].to_string(),
            name: caps[2].to_string(),
        })
        .collect()
}

/// Wires the secrets operator to Keeper: stores the client credentials,
/// picks the shared folder and creates the cluster-wide secret store.
#[derive(Default)]
pub struct BackendStage;

async fn client_config(runner: &dyn CommandRunner, auth: &BackendAuth) -> Result<String> {
    match auth {
        BackendAuth::OneTimeToken(token) => {
            // token via env, never argv
            runner
                .exec(
                    "sh",
                    &["-c", "ksm profile init --token \"$KSM_TOKEN\""],
                    ExecOptions::default().with_env("KSM_TOKEN", token.as_str()),
                )
                .await?;
            let exported = runner
                .exec(
                    "ksm",
                    &["profile", "export", "--file-format=json"],
                    ExecOptions::default(),
                )
                .await?;
            Ok(exported.stdout.trim().to_string())
        }
        BackendAuth::ConfigFile(path) => {
            let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                KeeperError::prerequisite(format!(
                    "cannot read KSM config {}: {e}",
                    path.display()
                ))
            })?;
            Ok(contents.trim().to_string())
        }
    }
}

fn find_folder<'a>(folders: &'a [FolderDescriptor], wanted: &str) -> Option<&'a FolderDescriptor> {
    folders
        .iter()
        .find(|f| f.id == wanted)
        .or_else(|| folders.iter().find(|f| f.name.eq_ignore_ascii_case(wanted)))
}

#[async_trait]
impl Stage for BackendStage {
    fn id(&self) -> StageId {
        StageId::BACKEND
    }

    fn name(&self) -> &'static str {
        "backend-integration"
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
        let config = ctx.config();
        let runner = ctx.runner();

        let auth = config.backend_auth().ok_or_else(|| {
            KeeperError::prerequisite(
                "backend integration needs --token or --ksm-config (or --development-only)",
            )
        })?;

        let prober = CrdProber::new(runner, ExtensionSpec::external_secrets());
        if !prober.check_declared().await && !prober.manual_functional_check().await {
            return Err(KeeperError::Transient(format!(
                "secret store types are not served ({}); rerun from stage {}",
                prober.diagnose().await,
                StageId::SECRETS_OPERATOR
            )));
        }

        let credentials = client_config(runner, &auth).await?;
        if credentials.is_empty() {
            return Err(KeeperError::prerequisite("KSM client config is empty"));
        }
        runner
            .apply_manifest(&manifests::credential_secret(&credentials))
            .await?;

        let listing = runner
            .exec("ksm", &["shared-folder", "list"], ExecOptions::default())
            .await?;
        let folders = parse_folder_list(&listing.stdout);
        if folders.is_empty() {
            return Err(KeeperError::prerequisite(
                "no shared folders are visible to this KSM application",
            ));
        }
        tracing::info!(count = folders.len(), "discovered backend folders");

        let selected = if let Some(wanted) = &config.folder {
            find_folder(&folders, wanted).cloned().ok_or_else(|| {
                KeeperError::prerequisite(format!(
                    "folder '{wanted}' not found; available: {}",
                    folders
                        .iter()
                        .map(|f| format!("{} ({})", f.name, f.id))
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?
        } else if let Some(prior) = ctx
            .state
            .selected_folder()
            .filter(|prior| folders.iter().any(|f| f.id == prior.id))
        {
            prior.clone()
        } else if let [only] = folders.as_slice() {
            only.clone()
        } else {
            ctx.env.prompter.choose_folder(&folders).await?
        };

        runner
            .apply_manifest(&manifests::cluster_secret_store(&selected.id))
            .await?;

        Ok(StageResult::success(format!(
            "secret store {} bound to folder {} ({})",
            manifests::CLUSTER_STORE,
            selected.name,
            selected.id
        ))
        .with_update(StateUpdate::Folders(folders))
        .with_update(StateUpdate::SelectedFolder(selected)))
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::ports::{PortMode, PortRole};
use super::stage::StageId;
use crate::error::{KeeperError, Result};

pub const DEFAULT_WORK_DIR: &str = "/tmp/k8s-keeper-build";
pub const DEFAULT_CLUSTER_NAME: &str = "k8s-keeper";
pub const DEFAULT_CRD_TIMEOUT: Duration = Duration::from_secs(180);

/// Credentials for the Keeper Secrets Manager backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAuth {
    /// One-time access token, redeemed into a client config on first use.
    OneTimeToken(String),
    /// Path to an already initialized client config.
    ConfigFile(PathBuf),
}

/// Settings for a single run. Built once and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub allow_root: bool,
    pub allow_destructive: bool,
    pub production_only: bool,
    pub development_only: bool,
    pub skip_dashboard: bool,
    pub ksm_token: Option<String>,
    pub ksm_config: Option<PathBuf>,
    pub folder: Option<String>,
    pub port_overrides: BTreeMap<PortRole, u16>,
    pub port_mode: PortMode,
    pub resume_from: Option<String>,
    pub skip_stages: Vec<String>,
    pub cluster_name: String,
    pub work_dir: PathBuf,
    pub crd_timeout: Duration,
    pub debug: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            allow_root: false,
            allow_destructive: false,
            production_only: false,
            development_only: false,
            skip_dashboard: false,
            ksm_token: None,
            ksm_config: None,
            folder: None,
            port_overrides: BTreeMap::new(),
            port_mode: PortMode::Auto,
            resume_from: None,
            skip_stages: Vec::new(),
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            crd_timeout: DEFAULT_CRD_TIMEOUT,
            debug: false,
        }
    }
}

impl Configuration {
    /// Check cross-field invariants. Called before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.production_only && self.development_only {
            return Err(KeeperError::configuration(
                "--production-only and --development-only are mutually exclusive",
            ));
        }
        if self.ksm_token.is_some() && self.ksm_config.is_some() {
            return Err(KeeperError::configuration(
                "pass either a one-time token or an existing KSM config, not both",
            ));
        }
        if self.cluster_name.trim().is_empty() {
            return Err(KeeperError::configuration("cluster name must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for (role, port) in &self.port_overrides {
            if *port == 0 {
                return Err(KeeperError::configuration(format!(
                    "port override for {role} must be between 1 and 65535"
                )));
            }
            if !seen.insert(*port) {
                return Err(KeeperError::configuration(format!(
                    "port {port} is assigned to more than one role"
                )));
            }
        }
        self.resume_point()?;
        self.requested_skips()?;
        Ok(())
    }

    pub fn resume_point(&self) -> Result<Option<StageId>> {
        self.resume_from
            .as_deref()
            .map(|raw| {
                raw.parse::<StageId>()
                    .map_err(|e| KeeperError::configuration(format!("--resume-from: {e}")))
            })
            .transpose()
    }

    fn requested_skips(&self) -> Result<BTreeSet<StageId>> {
        self.skip_stages
            .iter()
            .map(|raw| {
                raw.parse::<StageId>()
                    .map_err(|e| KeeperError::configuration(format!("--skip-stage: {e}")))
            })
            .collect()
    }

    /// Explicit skips plus those implied by the installation mode.
    pub fn effective_skips(&self) -> Result<BTreeSet<StageId>> {
        let mut skips = self.requested_skips()?;
        if self.skip_dashboard || self.production_only {
            skips.insert(StageId::DASHBOARD);
        }
        if self.development_only {
            skips.insert(StageId::BACKEND);
        }
        Ok(skips)
    }

    pub fn backend_auth(&self) -> Option<BackendAuth> {
        match (&self.ksm_token, &self.ksm_config) {
            (Some(token), _) => Some(BackendAuth::OneTimeToken(token.clone())),
            (None, Some(path)) => Some(BackendAuth::ConfigFile(path.clone())),
            (None, None) => None,
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.work_dir.join("build-state.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.work_dir.join("k8s-keeper.log")
    }

    /// CLI arguments that reproduce this configuration, minus the resume point.
    ///
    /// The one-time token is never echoed; it is read back from `KSM_TOKEN`.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut flag = |on: bool, name: &str| {
            if on {
                args.push(name.to_string());
            }
        };
        flag(self.allow_root, "--allow-root");
        flag(self.allow_destructive, "--allow-destructive");
        flag(self.production_only, "--production-only");
        flag(self.development_only, "--development-only");
        flag(self.skip_dashboard, "--skip-dashboard");
        flag(self.debug, "--debug");

        if self.ksm_token.is_some() {
            args.push("--token".into());
            args.push("\"$KSM_TOKEN\"".into());
        }
        if let Some(path) = &self.ksm_config {
            args.push("--ksm-config".into());
            args.push(path.display().to_string());
        }
        if let Some(folder) = &self.folder {
            args.push("--folder".into());
            args.push(folder.clone());
        }
        for (role, port) in &self.port_overrides {
            args.push(format!("--{role}-port"));
            args.push(port.to_string());
        }
        if self.port_mode == PortMode::Interactive {
            args.push("--interactive-ports".into());
        }
        for skip in &self.skip_stages {
            args.push("--skip-stage".into());
            args.push(skip.clone());
        }
        if self.cluster_name != DEFAULT_CLUSTER_NAME {
            args.push("--cluster-name".into());
            args.push(self.cluster_name.clone());
        }
        if self.work_dir != PathBuf::from(DEFAULT_WORK_DIR) {
            args.push("--work-dir".into());
            args.push(self.work_dir.display().to_string());
        }
        if self.crd_timeout != DEFAULT_CRD_TIMEOUT {
            args.push("--crd-timeout".into());
            args.push(self.crd_timeout.as_secs().to_string());
        }
        args
    }
}

/// Optional YAML file supplying defaults that command-line flags override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConfigFile {
    pub cluster_name: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub ksm_config: Option<PathBuf>,
    pub folder: Option<String>,
    pub port_mode: Option<PortMode>,
    pub ports: HashMap<PortRole, u16>,
    pub skip_stages: Vec<String>,
    pub skip_dashboard: Option<bool>,
    pub crd_timeout_secs: Option<u64>,
}

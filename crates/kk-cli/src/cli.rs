//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use kk_core::models::config::{DEFAULT_CLUSTER_NAME, DEFAULT_WORK_DIR};
use kk_core::models::{ConfigFile, Configuration, PortMode, PortRole};
use kk_core::services::uninstall::UninstallScope;

/// Provision a local kind cluster wired to Keeper Secrets Manager
#[derive(Parser, Debug)]
#[command(name = "k8s-keeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML file with defaults; flags given on the command line win
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) the installation pipeline
    Install(InstallArgs),
    /// Tear down what `install` created
    Uninstall(UninstallArgs),
    /// Show progress recorded in the build state
    Status(LocationArgs),
    /// Suggest host ports, or scan a range for ports in use
    Ports(PortsArgs),
}

/// Where the cluster and its working files live.
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Name of the kind cluster
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Directory holding the build state and log file
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Allow running as root
    #[arg(long)]
    pub allow_root: bool,

    /// Allow deleting and recreating an existing cluster
    #[arg(long)]
    pub allow_destructive: bool,

    /// Production setup: no dashboard
    #[arg(long, conflicts_with = "development_only")]
    pub production_only: bool,

    /// Development setup: no secrets backend
    #[arg(long)]
    pub development_only: bool,

    /// Do not install the Kubernetes Dashboard
    #[arg(long)]
    pub skip_dashboard: bool,

    /// KSM one-time access token
    #[arg(long, env = "KSM_TOKEN", hide_env_values = true, conflicts_with = "ksm_config")]
    pub token: Option<String>,

    /// Existing KSM client config (as produced by `ksm profile export`)
    #[arg(long)]
    pub ksm_config: Option<PathBuf>,

    /// Keeper shared folder to bind the secret store to (uid or name)
    #[arg(long)]
    pub folder: Option<String>,

    #[arg(long)]
    pub http_port: Option<u16>,

    #[arg(long)]
    pub https_port: Option<u16>,

    #[arg(long)]
    pub nodeport_base_port: Option<u16>,

    #[arg(long)]
    pub dashboard_port: Option<u16>,

    /// Choose each port from a list instead of taking the suggestion
    #[arg(long)]
    pub interactive_ports: bool,

    /// Start at this stage (ordinal like 05 or a name like secrets-operator)
    #[arg(long)]
    pub resume_from: Option<String>,

    /// Skip a stage; may be repeated
    #[arg(long = "skip-stage")]
    pub skip_stages: Vec<String>,

    /// Seconds to wait for the secrets operator's resource types
    #[arg(long)]
    pub crd_timeout: Option<u64>,

    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Backend,
    Cluster,
    Purge,
}

impl From<ScopeArg> for UninstallScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Backend => UninstallScope::Backend,
            ScopeArg::Cluster => UninstallScope::Cluster,
            ScopeArg::Purge => UninstallScope::Purge,
        }
    }
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// What to remove
    #[arg(value_enum, default_value_t = ScopeArg::Cluster)]
    pub scope: ScopeArg,

    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Args, Debug)]
pub struct PortsArgs {
    /// Report ports in use within START-END instead of suggesting
    #[arg(long, value_name = "START-END", value_parser = parse_range)]
    pub scan: Option<(u16, u16)>,
}

fn parse_range(s: &str) -> Result<(u16, u16), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{s}'"))?;
    let start: u16 = start.trim().parse().map_err(|e| format!("bad start: {e}"))?;
    let end: u16 = end.trim().parse().map_err(|e| format!("bad end: {e}"))?;
    if start > end {
        return Err(format!("range {start}-{end} is empty"));
    }
    Ok((start, end))
}

impl LocationArgs {
    /// Apply these flags over the config file and defaults.
    pub fn resolve(&self, file: &ConfigFile, config: &mut Configuration) {
        config.cluster_name = self
            .cluster_name
            .clone()
            .or_else(|| file.cluster_name.clone())
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());
        config.work_dir = self
            .work_dir
            .clone()
            .or_else(|| file.work_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    }

    pub fn into_configuration(self, file: &ConfigFile, debug: bool) -> Configuration {
        let mut config = Configuration {
            debug,
            ..Default::default()
        };
        self.resolve(file, &mut config);
        config
    }
}

impl InstallArgs {
    fn port_flags(&self) -> [(PortRole, Option<u16>); 4] {
        [
            (PortRole::Http, self.http_port),
            (PortRole::Https, self.https_port),
            (PortRole::NodeportBase, self.nodeport_base_port),
            (PortRole::Dashboard, self.dashboard_port),
        ]
    }

    /// Merge flags over `file`. Validation is left to the installer so that
    /// every invariant is checked in one place.
    pub fn into_configuration(self, file: &ConfigFile, debug: bool) -> Configuration {
        let mut config = Configuration {
            debug,
            allow_root: self.allow_root,
            allow_destructive: self.allow_destructive,
            production_only: self.production_only,
            development_only: self.development_only,
            skip_dashboard: self.skip_dashboard || file.skip_dashboard.unwrap_or(false),
            ksm_token: self.token.clone(),
            resume_from: self.resume_from.clone(),
            ..Default::default()
        };
        self.location.resolve(file, &mut config);

        // a token on the command line replaces a config path from the file
        config.ksm_config = match (&self.ksm_config, &config.ksm_token) {
            (Some(path), _) => Some(path.clone()),
            (None, None) => file.ksm_config.clone(),
            (None, Some(_)) => None,
        };
        config.folder = self.folder.clone().or_else(|| file.folder.clone());

        config.port_overrides.extend(file.ports.iter().map(|(r, p)| (*r, *p)));
        for (role, port) in self.port_flags() {
            if let Some(port) = port {
                config.port_overrides.insert(role, port);
            }
        }
        config.port_mode = if self.interactive_ports {
            PortMode::Interactive
        } else {
            file.port_mode.unwrap_or_default()
        };

        config.skip_stages = file.skip_stages.clone();
        for skip in &self.skip_stages {
            if !config.skip_stages.contains(skip) {
                config.skip_stages.push(skip.clone());
            }
        }
        if let Some(secs) = self.crd_timeout.or(file.crd_timeout_secs) {
            config.crd_timeout = Duration::from_secs(secs);
        }
        config
    }
}

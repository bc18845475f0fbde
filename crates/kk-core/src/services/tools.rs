use crate::error::{KeeperError, Result};
use crate::services::command::{CommandRunner, ExecOptions};

/// A command-line tool the pipeline drives, with the script that installs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    /// Release the script pins, when it pins one.
    pub version: Option<&'static str>,
    install_script: &'static str,
}

pub const KUBECTL: Tool = Tool {
    name: "kubectl",
    version: None,
    install_script: r#"set -e
v=$(curl -fsSL https://dl.k8s.io/release/stable.txt)
curl -fsSLo /tmp/kubectl "https://dl.k8s.io/release/$v/bin/linux/amd64/kubectl"
sudo install -m 0755 /tmp/kubectl /usr/local/bin/kubectl"#,
};

pub const KIND: Tool = Tool {
    name: "kind",
    version: Some("v0.24.0"),
    install_script: concat!(
        "set -e\n",
        "curl -fsSLo /tmp/kind https://kind.sigs.k8s.io/dl/",
        "v0.24.0",
        "/kind-linux-amd64\n",
        "sudo install -m 0755 /tmp/kind /usr/local/bin/kind"
    ),
};

pub const HELM: Tool = Tool {
    name: "helm",
    version: None,
    install_script: "set -e\ncurl -fsSL https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash",
};

pub const GO: Tool = Tool {
    name: "go",
    version: Some("1.22.5"),
    install_script: concat!(
        "set -e\n",
        "curl -fsSLo /tmp/go.tgz https://go.dev/dl/go",
        "1.22.5",
        ".linux-amd64.tar.gz\n",
        "sudo rm -rf /usr/local/go\n",
        "sudo tar -C /usr/local -xzf /tmp/go.tgz\n",
        "sudo ln -sf /usr/local/go/bin/go /usr/local/bin/go"
    ),
};

pub const KSM: Tool = Tool {
    name: "ksm",
    version: None,
    install_script: "set -e\npython3 -m pip install --user --upgrade keeper-secrets-manager-cli",
};

/// Everything stage 02 ensures, in install order.
pub const ALL: [Tool; 5] = [KUBECTL, KIND, HELM, GO, KSM];

impl Tool {
    pub async fn is_installed(&self, runner: &dyn CommandRunner) -> bool {
        runner.exists(self.name).await
    }

    pub async fn install(&self, runner: &dyn CommandRunner) -> Result<()> {
        tracing::info!(tool = self.name, "installing");
        runner
            .exec("sh", &["-c", self.install_script], ExecOptions::default())
            .await?;
        if !self.is_installed(runner).await {
            return Err(KeeperError::prerequisite(format!(
                "{} was installed but is still not on PATH",
                self.name
            )));
        }
        Ok(())
    }
}

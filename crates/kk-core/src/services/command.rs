use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{KeeperError, Result};

/// Per-invocation knobs for [`CommandRunner::exec`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Turn a non-zero exit into [`KeeperError::CommandFailed`].
    pub check: bool,
    /// Capture stdout/stderr instead of inheriting the terminal.
    pub capture_output: bool,
    pub cwd: Option<PathBuf>,
    /// The caller expects failure as a normal answer (existence probes).
    pub suppress_error_log: bool,
    /// Bytes written to the child's stdin.
    pub input: Option<String>,
    pub env: Vec<(String, String)>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            check: true,
            capture_output: true,
            cwd: None,
            suppress_error_log: false,
            input: None,
            env: Vec::new(),
        }
    }
}

impl ExecOptions {
    /// Options for a probe whose failure is an expected answer.
    pub fn probe() -> Self {
        Self {
            check: false,
            suppress_error_log: true,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The only way the core touches external tools.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn exec(&self, program: &str, args: &[&str], options: ExecOptions)
        -> Result<CommandOutput>;

    /// Whether `tool` resolves on `PATH`. A missing tool is not an error.
    async fn exists(&self, tool: &str) -> bool;

    /// Apply a YAML or JSON manifest to the current cluster.
    async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        self.exec(
            "kubectl",
            &["apply", "-f", "-"],
            ExecOptions::default().with_input(manifest),
        )
        .await?;
        Ok(())
    }
}

pub fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        options: ExecOptions,
    ) -> Result<CommandOutput> {
        let rendered = display_command(program, args);
        tracing::debug!(command = %rendered, "exec");

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        if options.capture_output {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
        cmd.stdin(if options.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                if !options.suppress_error_log {
                    tracing::error!(command = %rendered, error = %e, "failed to start command");
                }
                return Err(KeeperError::Spawn {
                    command: rendered,
                    reason: e.to_string(),
                });
            }
        };

        if let (Some(input), Some(mut stdin)) = (&options.input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if !result.success() {
            if !options.suppress_error_log {
                tracing::warn!(
                    command = %rendered,
                    exit_code = result.exit_code,
                    stderr = %result.stderr,
                    "command exited with failure"
                );
            }
            if options.check {
                return Err(KeeperError::CommandFailed {
                    command: rendered,
                    code: result.exit_code,
                    stderr: result.stderr,
                });
            }
        }
        Ok(result)
    }

    async fn exists(&self, tool: &str) -> bool {
        let script = format!("command -v {tool}");
        match self
            .exec("sh", &["-c", &script], ExecOptions::probe())
            .await
        {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }
}

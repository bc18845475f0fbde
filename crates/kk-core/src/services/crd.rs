//! Readiness checks for the secrets operator's custom resource types.
//!
//! A CRD can be accepted by the API server long before its controller and
//! webhooks are able to serve it. The prober first watches the declared
//! `Established` condition, restarts the controllers once at the midpoint of
//! the wait if that stalls, and finally falls back to proving usability with
//! server-side dry-run creates and list calls.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::services::command::{CommandRunner, ExecOptions};
use crate::services::manifests;

/// A custom resource type the operator must serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredCrd {
    /// `<plural>.<group>`, the CRD object name.
    pub name: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    /// Minimal object accepted by a dry-run create.
    pub sample: fn() -> String,
}

/// The operator deployment the prober watches and, if needed, restarts.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    pub namespace: &'static str,
    pub crds: Vec<RequiredCrd>,
}

impl ExtensionSpec {
    pub fn external_secrets() -> Self {
        Self {
            namespace: manifests::ESO_NAMESPACE,
            crds: vec![
                RequiredCrd {
                    name: "externalsecrets.external-secrets.io",
                    kind: "ExternalSecret",
                    plural: "externalsecrets",
                    sample: manifests::sample_external_secret,
                },
                RequiredCrd {
                    name: "secretstores.external-secrets.io",
                    kind: "SecretStore",
                    plural: "secretstores",
                    sample: manifests::sample_secret_store,
                },
                RequiredCrd {
                    name: "clustersecretstores.external-secrets.io",
                    kind: "ClusterSecretStore",
                    plural: "clustersecretstores",
                    sample: manifests::sample_cluster_secret_store,
                },
            ],
        }
    }
}

/// Timing for [`CrdProber::wait_until_ready`].
#[derive(Debug, Clone, Copy)]
pub struct ProbeSchedule {
    pub timeout: Duration,
    pub interval: Duration,
    /// Elapsed time after which the one recovery action fires.
    pub recovery_at: Duration,
}

impl ProbeSchedule {
    /// Poll every five seconds and recover at the midpoint of `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_secs(5),
            recovery_at: timeout / 2,
        }
    }
}

/// Where the wait loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Polling,
    Recovering,
    PollingAfterRecovery,
    Ready,
    TimedOut,
}

impl fmt::Display for ProbePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbePhase::Polling => "polling",
            ProbePhase::Recovering => "recovering",
            ProbePhase::PollingAfterRecovery => "polling after recovery",
            ProbePhase::Ready => "ready",
            ProbePhase::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Outcome of a wait, with enough history for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    pub phase: ProbePhase,
    pub polls: u32,
    pub recovered: bool,
}

impl WaitReport {
    pub fn is_ready(&self) -> bool {
        self.phase == ProbePhase::Ready
    }
}

/// What is wrong when the operator never became usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnosis {
    pub missing: Vec<String>,
    pub pod_phases: Vec<String>,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing.is_empty() {
            write!(f, "all resource types report Established")?;
        } else {
            write!(f, "not established: {}", self.missing.join(", "))?;
        }
        if self.pod_phases.is_empty() {
            write!(f, "; no controller pods found")
        } else {
            write!(f, "; controller pods: {}", self.pod_phases.join(", "))
        }
    }
}

pub struct CrdProber<'a> {
    runner: &'a dyn CommandRunner,
    spec: ExtensionSpec,
}

impl<'a> CrdProber<'a> {
    pub fn new(runner: &'a dyn CommandRunner, spec: ExtensionSpec) -> Self {
        Self { runner, spec }
    }

    /// True only when every required type reports `Established=True`.
    pub async fn check_declared(&self) -> bool {
        for crd in &self.spec.crds {
            if !self.is_established(crd).await {
                return false;
            }
        }
        true
    }

    async fn is_established(&self, crd: &RequiredCrd) -> bool {
        let output = self
            .runner
            .exec(
                "kubectl",
                &[
                    "get",
                    "crd",
                    crd.name,
                    "-o",
                    "jsonpath={.status.conditions[?(@.type==\"Established\")].status}",
                ],
                ExecOptions::probe(),
            )
            .await;
        matches!(output, Ok(out) if out.success() && out.stdout.trim() == "True")
    }

    /// Poll [`check_declared`](Self::check_declared) until it passes or the
    /// schedule times out, restarting the controllers once at
    /// `schedule.recovery_at`.
    pub async fn wait_until_ready(&self, schedule: ProbeSchedule) -> WaitReport {
        let start = Instant::now();
        let mut phase = ProbePhase::Polling;
        let mut polls = 0;
        let mut recovered = false;

        loop {
            polls += 1;
            if self.check_declared().await {
                phase = ProbePhase::Ready;
                break;
            }

            let elapsed = start.elapsed();
            if elapsed >= schedule.timeout {
                phase = ProbePhase::TimedOut;
                break;
            }

            if !recovered && elapsed >= schedule.recovery_at {
                phase = ProbePhase::Recovering;
                tracing::warn!(
                    %phase,
                    namespace = self.spec.namespace,
                    elapsed_secs = elapsed.as_secs(),
                    "resource types still not established, restarting controllers"
                );
                if let Err(e) = self.restart_controllers().await {
                    tracing::warn!(error = %e, "controller restart failed");
                }
                recovered = true;
                phase = ProbePhase::PollingAfterRecovery;
            }

            tracing::debug!(%phase, polls, "waiting for resource types");
            tokio::time::sleep(schedule.interval).await;
        }

        WaitReport {
            phase,
            polls,
            recovered,
        }
    }

    async fn restart_controllers(&self) -> Result<()> {
        self.runner
            .exec(
                "kubectl",
                &[
                    "rollout",
                    "restart",
                    "deployment",
                    "-n",
                    self.spec.namespace,
                ],
                ExecOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// Prove the API server accepts every type: a server-side dry-run create
    /// of a sample object plus a list call, per type.
    pub async fn manual_functional_check(&self) -> bool {
        for crd in &self.spec.crds {
            let sample = (crd.sample)();
            let created = self
                .runner
                .exec(
                    "kubectl",
                    &["create", "--dry-run=server", "-f", "-"],
                    ExecOptions::probe().with_input(sample),
                )
                .await;
            if !matches!(created, Ok(ref out) if out.success()) {
                tracing::debug!(kind = crd.kind, "dry-run create rejected");
                return false;
            }

            let listed = self
                .runner
                .exec(
                    "kubectl",
                    &["get", crd.plural, "--all-namespaces"],
                    ExecOptions::probe(),
                )
                .await;
            if !matches!(listed, Ok(ref out) if out.success()) {
                tracing::debug!(kind = crd.kind, "list rejected");
                return false;
            }
        }
        true
    }

    pub async fn diagnose(&self) -> Diagnosis {
        let mut diagnosis = Diagnosis::default();
        for crd in &self.spec.crds {
            if !self.is_established(crd).await {
                diagnosis.missing.push(crd.kind.to_string());
            }
        }
        let pods = self
            .runner
            .exec(
                "kubectl",
                &[
                    "get",
                    "pods",
                    "-n",
                    self.spec.namespace,
                    "-o",
                    "jsonpath={range .items[*]}{.metadata.name}={.status.phase}{\"\\n\"}{end}",
                ],
                ExecOptions::probe(),
            )
            .await;
        if let Ok(out) = pods {
            diagnosis.pod_phases = out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
        diagnosis
    }
}

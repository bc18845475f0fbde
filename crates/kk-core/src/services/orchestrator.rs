//! Drives the stage pipeline against persisted build state.

use std::fmt::Write as _;

use crate::error::Result;
use crate::models::{BuildState, StageId, StageResult};
use crate::services::stage::{self, Stage, StageEnv};
use crate::services::stages;
use crate::services::state::BuildStateStore;

pub const BINARY_NAME: &str = "k8s-keeper";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Halted {
        stage: StageId,
        name: String,
        message: String,
        detail: String,
    },
}

/// Result of one `install` invocation.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: BuildState,
    /// Each stage that was visited, with how it ended.
    pub results: Vec<(StageId, StageResult)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// The command that resumes at the failed stage, with the same flags.
    pub fn resume_command(&self) -> Option<String> {
        let RunOutcome::Halted { stage, .. } = &self.outcome else {
            return None;
        };
        let mut parts = vec![BINARY_NAME.to_string(), "install".to_string()];
        parts.extend(self.state.config().to_cli_args());
        parts.push("--resume-from".to_string());
        parts.push(stage.to_string());
        Some(parts.join(" "))
    }

    pub fn summary(&self) -> String {
        let config = self.state.config();
        let mut out = String::new();

        match &self.outcome {
            RunOutcome::Completed => {
                let _ = writeln!(out, "{BINARY_NAME}: all stages complete");
            }
            RunOutcome::Halted {
                stage,
                name,
                message,
                detail,
            } => {
                let _ = writeln!(out, "{BINARY_NAME}: stage {stage} ({name}) failed: {message}");
                if !detail.is_empty() {
                    let _ = writeln!(out, "  detail: {detail}");
                }
                let done: Vec<String> = self
                    .state
                    .completed_stages()
                    .iter()
                    .map(StageId::to_string)
                    .collect();
                let _ = writeln!(
                    out,
                    "  completed: {}",
                    if done.is_empty() { "none".to_string() } else { done.join(", ") }
                );
            }
        }

        if let Some(ports) = self.state.port_allocation() {
            let rendered: Vec<String> = ports
                .ports()
                .iter()
                .map(|(role, port)| format!("{role}={port}"))
                .collect();
            let _ = writeln!(out, "  ports: {}", rendered.join(" "));
        }
        if let Some(token) = self.state.dashboard_token() {
            let _ = writeln!(out, "  dashboard token: {token}");
        }
        if let Some(folder) = self.state.selected_folder() {
            let _ = writeln!(out, "  backend folder: {} ({})", folder.name, folder.id);
        }
        let _ = writeln!(out, "  log file: {}", config.log_file().display());
        let _ = writeln!(out, "  state file: {}", config.state_file().display());

        if let Some(command) = self.resume_command() {
            let _ = writeln!(out, "resume with:\n  {command}");
        }
        out
    }
}

/// Sequences the pipeline: validate, load, run each eligible stage, persist
/// after every stage that did not fail.
pub struct Installer<'a> {
    env: StageEnv<'a>,
    store: BuildStateStore,
    stages: Vec<Box<dyn Stage>>,
}

impl<'a> Installer<'a> {
    pub fn new(env: StageEnv<'a>) -> Self {
        let store = BuildStateStore::for_config(env.config);
        Self {
            env,
            store,
            stages: stages::pipeline(),
        }
    }

    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_store(mut self, store: BuildStateStore) -> Self {
        self.store = store;
        self
    }

    /// Run the pipeline. `Err` means the configuration was rejected and no
    /// stage ran; a stage failure is reported through [`RunReport`].
    pub async fn run(&self) -> Result<RunReport> {
        let config = self.env.config;
        config.validate()?;
        let skips = config.effective_skips()?;
        let resume = config.resume_point()?;

        let mut state = self.store.load(config.clone()).await;
        if let Some(start) = resume {
            tracing::info!(stage = %start, "resuming");
            // a skipped stage stays incomplete so later checks ignore it
            for id in start.predecessors().filter(|id| !skips.contains(id)) {
                if !state.is_completed(id) {
                    tracing::info!(stage = %id, "assuming stage complete");
                    state.mark_completed(id);
                }
            }
        }

        let mut results = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let id = stage.id();
            let result = stage::run(stage.as_ref(), &self.env, &mut state, &skips).await;

            if let StageResult::Failure { message, detail } = &result {
                let outcome = RunOutcome::Halted {
                    stage: id,
                    name: stage.name().to_string(),
                    message: message.clone(),
                    detail: detail.clone(),
                };
                // keeps the interrupted stage on disk for `status`
                self.store.save_logged(&state).await;
                results.push((id, result));
                return Ok(RunReport {
                    outcome,
                    state,
                    results,
                });
            }

            self.store.save_logged(&state).await;
            results.push((id, result));
        }

        tracing::info!("installation complete");
        Ok(RunReport {
            outcome: RunOutcome::Completed,
            state,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::KeeperError;
    use crate::models::{Configuration, PortRole};
    use crate::services::command::ExecOptions;
    use crate::services::stage::StageContext;
    use crate::services::stages::{ClusterStage, DashboardStage, ValidationStage};
    use crate::test_support::{ok, FixedProbe, ScriptedPrompter, ScriptedRunner};
    use crate::services::ports::PortAllocator;

    /// Runs `stage <id>` through the runner so calls are observable; a
    /// scripted non-zero exit fails the stage.
    struct Step(StageId);

    #[async_trait]
    impl Stage for Step {
        fn id(&self) -> StageId {
            self.0
        }

        fn name(&self) -> &'static str {
            self.0.slug()
        }

        async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult> {
            let label = self.0.to_string();
            ctx.runner()
                .exec("stage", &[&label], ExecOptions::default())
                .await?;
            Ok(StageResult::success(format!("{} done", self.0.slug())))
        }
    }

    fn steps() -> Vec<Box<dyn Stage>> {
        StageId::ALL
            .into_iter()
            .map(|id| Box::new(Step(id)) as Box<dyn Stage>)
            .collect()
    }

    fn config_in(dir: &tempfile::TempDir) -> Configuration {
        Configuration {
            work_dir: dir.path().to_path_buf(),
            allow_root: true,
            ..Default::default()
        }
    }

    async fn run_steps(config: &Configuration, runner: &ScriptedRunner) -> Result<RunReport> {
        run_stages(config, runner, steps()).await
    }

    async fn run_stages(
        config: &Configuration,
        runner: &ScriptedRunner,
        stages: Vec<Box<dyn Stage>>,
    ) -> Result<RunReport> {
        let prompter = ScriptedPrompter::new();
        let ports = PortAllocator::with_probe(FixedProbe::new([]));
        let env = StageEnv {
            config,
            runner,
            prompter: &prompter,
            ports: &ports,
        };
        Installer::new(env).with_stages(stages).run().await
    }

    #[tokio::test]
    async fn unknown_resume_point_is_rejected_before_any_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            resume_from: Some("99".into()),
            ..config_in(&dir)
        };
        let runner = ScriptedRunner::new();

        let err = run_steps(&config, &runner).await.unwrap_err();

        assert!(matches!(err, KeeperError::Configuration(_)));
        assert!(err.is_configuration());
        assert!(runner.calls().is_empty());
        assert!(!config.state_file().exists());
    }

    #[tokio::test]
    async fn clean_run_completes_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let runner = ScriptedRunner::new();

        let report = run_steps(&config, &runner).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.state.completed_stages().len(), 7);
        assert_eq!(report.resume_command(), None);
        assert_eq!(runner.count_calls("stage "), 7);
    }

    #[tokio::test]
    async fn failure_persists_prior_progress_and_names_resume_point() {
        for k in StageId::ALL {
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(&dir);
            let runner = ScriptedRunner::new()
                .on(&format!("stage {k}"), crate::test_support::fail("boom"));

            let report = run_steps(&config, &runner).await.unwrap();

            assert_eq!(report.exit_code(), 1);
            let persisted = BuildStateStore::for_config(&config)
                .read()
                .await
                .unwrap()
                .expect("failure writes a state file");
            assert_eq!(
                persisted.completed_stages().len(),
                usize::from(k.ordinal() - 1),
                "failing at {k}"
            );
            assert!(!persisted.is_completed(k));
            assert_eq!(persisted.current_stage(), Some(k));
            let command = report.resume_command().unwrap();
            assert!(command.ends_with(&format!("--resume-from {k}")), "{command}");
            assert_eq!(runner.count_calls("stage "), usize::from(k.ordinal()));
        }
    }

    #[tokio::test]
    async fn resumed_run_matches_uninterrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let failing = ScriptedRunner::new().on("stage 05", crate::test_support::fail("crd timeout"));
        let first = run_steps(&config, &failing).await.unwrap();
        let resume = first.resume_command().unwrap();
        assert!(resume.contains("--resume-from 05"));

        let resumed_config = Configuration {
            resume_from: Some("05".into()),
            ..config.clone()
        };
        let runner = ScriptedRunner::new();
        let second = run_steps(&resumed_config, &runner).await.unwrap();

        assert!(second.is_success());
        assert_eq!(runner.count_calls("stage 0"), 3);
        assert_eq!(runner.count_calls("stage 01"), 0);

        let fresh_dir = tempfile::tempdir().unwrap();
        let uninterrupted = run_steps(&config_in(&fresh_dir), &ScriptedRunner::new())
            .await
            .unwrap();
        assert_eq!(
            second.state.completed_stages(),
            uninterrupted.state.completed_stages()
        );
    }

    #[tokio::test]
    async fn resume_point_marks_earlier_stages_assumed_complete() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            resume_from: Some("cluster".into()),
            ..config_in(&dir)
        };
        let runner = ScriptedRunner::new();

        let report = run_steps(&config, &runner).await.unwrap();

        assert!(report.is_success());
        assert_eq!(runner.count_calls("stage 01"), 0);
        assert_eq!(runner.count_calls("stage 02"), 0);
        assert_eq!(runner.count_calls("stage 03"), 1);
    }

    #[tokio::test]
    async fn development_resume_at_validation_leaves_backend_unchecked() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            development_only: true,
            ..config_in(&dir)
        };
        let pipeline = || -> Vec<Box<dyn Stage>> {
            StageId::ALL
                .into_iter()
                .filter(|id| *id != StageId::VALIDATION)
                .map(|id| Box::new(Step(id)) as Box<dyn Stage>)
                .chain(std::iter::once(Box::new(ValidationStage) as Box<dyn Stage>))
                .collect()
        };

        let unready = ScriptedRunner::new().on(
            "get nodes",
            ok("k8s-keeper-control-plane   NotReady   control-plane   1m   v1.31.0"),
        );
        let first = run_stages(&config, &unready, pipeline()).await.unwrap();
        let command = first.resume_command().unwrap();
        assert!(command.ends_with("--resume-from 07"), "{command}");

        let resumed_config = Configuration {
            resume_from: Some("07".into()),
            ..config.clone()
        };
        let healthy = ScriptedRunner::new().on(
            "get nodes",
            ok("k8s-keeper-control-plane   Ready   control-plane   2m   v1.31.0"),
        );
        let resumed = run_stages(&resumed_config, &healthy, pipeline()).await.unwrap();

        assert!(resumed.is_success(), "{}", resumed.summary());
        assert!(!resumed.state.is_completed(StageId::BACKEND));
        assert_eq!(healthy.count_calls("clustersecretstore"), 0);
        assert_eq!(healthy.count_calls("stage "), 0);

        let other = tempfile::tempdir().unwrap();
        let uninterrupted_config = Configuration {
            development_only: true,
            ..config_in(&other)
        };
        let uninterrupted = run_stages(&uninterrupted_config, &healthy, pipeline())
            .await
            .unwrap();
        assert_eq!(
            resumed.state.completed_stages(),
            uninterrupted.state.completed_stages()
        );
    }

    #[tokio::test]
    async fn mode_flags_skip_stages_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            development_only: true,
            skip_dashboard: true,
            ..config_in(&dir)
        };
        let runner = ScriptedRunner::new();

        let report = run_steps(&config, &runner).await.unwrap();

        assert!(report.is_success());
        assert_eq!(runner.count_calls("stage 04"), 0);
        assert_eq!(runner.count_calls("stage 06"), 0);
        let skipped: Vec<StageId> = report
            .results
            .iter()
            .filter(|(_, r)| r.is_skipped())
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(skipped, vec![StageId::DASHBOARD, StageId::BACKEND]);
        assert!(config.state_file().exists());
    }

    #[tokio::test]
    async fn ports_and_token_survive_a_resume() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            skip_stages: vec!["secrets-operator".into(), "backend-integration".into()],
            ..config_in(&dir)
        };
        let pipeline = || -> Vec<Box<dyn Stage>> {
            vec![
                Box::new(Step(StageId::PREREQUISITES)),
                Box::new(Step(StageId::TOOLS)),
                Box::new(ClusterStage),
                Box::new(DashboardStage),
                Box::new(Step(StageId::VALIDATION)),
            ]
        };
        let prompter = ScriptedPrompter::new();

        let first_runner = ScriptedRunner::new()
            .on("create token", ok("tok-1"))
            .on("stage 07", crate::test_support::fail("not yet"));
        let free = PortAllocator::with_probe(FixedProbe::new([]));
        let first = Installer::new(StageEnv {
            config: &config,
            runner: &first_runner,
            prompter: &prompter,
            ports: &free,
        })
        .with_stages(pipeline())
        .run()
        .await
        .unwrap();
        assert_eq!(first.exit_code(), 1);
        assert_eq!(first.state.dashboard_token(), Some("tok-1"));

        let resumed = Configuration {
            resume_from: Some("07".into()),
            ..config.clone()
        };
        let second_runner = ScriptedRunner::new().on("create token", ok("tok-2"));
        let busy = PortAllocator::with_probe(FixedProbe::new([8080, 8443]));
        let second = Installer::new(StageEnv {
            config: &resumed,
            runner: &second_runner,
            prompter: &prompter,
            ports: &busy,
        })
        .with_stages(pipeline())
        .run()
        .await
        .unwrap();

        assert!(second.is_success());
        assert_eq!(second.state.dashboard_token(), Some("tok-1"));
        assert_eq!(
            second.state.port_allocation(),
            first.state.port_allocation()
        );
        assert_eq!(
            second.state.port_allocation().and_then(|p| p.get(PortRole::Http)),
            Some(8080)
        );
        assert_eq!(second_runner.count_calls("kind create"), 0);
    }

    #[tokio::test]
    async fn real_pipeline_runs_end_to_end_against_scripted_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            development_only: true,
            ..config_in(&dir)
        };
        let runner = ScriptedRunner::new()
            .on("get crd", ok("True"))
            .on("create token", ok("tok"));
        let prompter = ScriptedPrompter::new();
        let ports = PortAllocator::with_probe(FixedProbe::new([]));
        let env = StageEnv {
            config: &config,
            runner: &runner,
            prompter: &prompter,
            ports: &ports,
        };

        let report = Installer::new(env).run().await.unwrap();

        assert!(report.is_success(), "{}", report.summary());
        let summary = report.summary();
        assert!(summary.contains("all stages complete"));
        assert!(summary.contains("http=8080"));
        assert!(summary.contains("dashboard token: tok"));
        assert_eq!(runner.count_calls("kind create cluster"), 1);
    }

    #[tokio::test]
    async fn halted_summary_includes_resume_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            ksm_token: Some("never-printed".into()),
            ..config_in(&dir)
        };
        let runner = ScriptedRunner::new().on("stage 03", crate::test_support::fail("kind exploded"));

        let report = run_steps(&config, &runner).await.unwrap();
        let summary = report.summary();

        assert!(summary.contains("stage 03 (cluster) failed"));
        assert!(summary.contains("kind exploded"));
        assert!(summary.contains("completed: 01, 02"));
        assert!(summary.contains("--resume-from 03"));
        assert!(!summary.contains("never-printed"));
    }
}

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

use crate::error::Result;
use crate::models::{BuildState, Configuration, StageId, StageResult};
use crate::services::command::CommandRunner;
use crate::services::ports::PortAllocator;
use crate::services::prompt::Prompter;

/// Collaborators shared by every stage of one run.
pub struct StageEnv<'a> {
    pub config: &'a Configuration,
    pub runner: &'a dyn CommandRunner,
    pub prompter: &'a dyn Prompter,
    pub ports: &'a PortAllocator,
}

/// What a stage sees while executing: the shared collaborators plus a
/// read-only view of the build state.
pub struct StageContext<'a> {
    pub env: &'a StageEnv<'a>,
    pub state: &'a BuildState,
}

impl<'a> StageContext<'a> {
    pub fn config(&self) -> &Configuration {
        self.env.config
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.env.runner
    }
}

/// One idempotent step of the installation pipeline.
///
/// `execute` may let collaborator errors propagate with `?`; [`run`] turns
/// them into a [`StageResult::Failure`].
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult>;
}

pub fn should_run(id: StageId, completed: &BTreeSet<StageId>, skip: &BTreeSet<StageId>) -> bool {
    !skip.contains(&id) && !completed.contains(&id)
}

/// Run `stage` against `state`.
///
/// Ineligible stages return `Skipped` without touching anything. Errors and
/// panics from `execute` become `Failure`. Only a `Success` mutates `state`:
/// its updates are applied and the stage is marked completed.
pub async fn run(
    stage: &dyn Stage,
    env: &StageEnv<'_>,
    state: &mut BuildState,
    skip: &BTreeSet<StageId>,
) -> StageResult {
    let id = stage.id();
    if !should_run(id, state.completed_stages(), skip) {
        let reason = if skip.contains(&id) {
            "skipped by request"
        } else {
            "already completed"
        };
        tracing::info!(stage = %id, name = stage.name(), reason, "skipping stage");
        return StageResult::skipped(format!("{} {reason}", stage.name()));
    }

    tracing::info!(stage = %id, name = stage.name(), "running stage");
    state.set_current_stage(Some(id));

    let outcome = {
        let ctx = StageContext {
            env,
            state: &*state,
        };
        AssertUnwindSafe(stage.execute(&ctx)).catch_unwind().await
    };

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => StageResult::failure(format!("{} failed", stage.name()), e.to_string()),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            StageResult::failure(format!("{} aborted", stage.name()), detail)
        }
    };

    match &result {
        StageResult::Success {
            message,
            updates,
            warnings,
        } => {
            for warning in warnings {
                tracing::warn!(stage = %id, "{warning}");
            }
            for update in updates {
                state.apply(update.clone());
            }
            state.mark_completed(id);
            state.set_current_stage(None);
            tracing::info!(stage = %id, "{message}");
        }
        StageResult::Failure { message, detail } => {
            tracing::error!(stage = %id, detail = %detail, "{message}");
        }
        StageResult::Skipped { message } => {
            state.set_current_stage(None);
            tracing::info!(stage = %id, "{message}");
        }
    }
    result
}

//! Scripted collaborators shared by unit tests.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{BuildState, Configuration, FolderDescriptor, PortRole, StageResult};
use crate::services::command::{display_command, CommandOutput, CommandRunner, ExecOptions};
use crate::services::ports::{PortAllocator, PortProbe};
use crate::services::prompt::Prompter;
use crate::services::stage::{Stage, StageContext, StageEnv};

struct Rule {
    pattern: String,
    responses: VecDeque<CommandOutput>,
}

/// Replays canned outputs for commands matching a substring; anything
/// unmatched succeeds with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    applied: Mutex<Vec<String>>,
    missing: Mutex<HashSet<String>>,
    missing_once: Mutex<HashSet<String>>,
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to matching commands with `output` every time.
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.on_sequence(pattern, vec![output])
    }

    /// Respond with each output in turn; the last one repeats.
    pub fn on_sequence(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: outputs.into(),
        });
        self
    }

    pub fn missing_tool(self, tool: &str) -> Self {
        self.missing.lock().unwrap().insert(tool.to_string());
        self
    }

    /// Report `tool` missing on the first lookup only, as if installed later.
    pub fn missing_until_installed(self, tool: &str) -> Self {
        self.missing_once.lock().unwrap().insert(tool.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    fn respond(&self, rendered: &str) -> CommandOutput {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rendered.contains(&rule.pattern) {
                return if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap_or_default()
                } else {
                    rule.responses.front().cloned().unwrap_or_default()
                };
            }
        }
        ok("")
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        options: ExecOptions,
    ) -> Result<CommandOutput> {
        let rendered = display_command(program, args);
        self.calls.lock().unwrap().push(rendered.clone());
        let output = self.respond(&rendered);
        if options.check && !output.success() {
            return Err(KeeperError::CommandFailed {
                command: rendered,
                code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    async fn exists(&self, tool: &str) -> bool {
        self.calls.lock().unwrap().push(format!("exists {tool}"));
        if self.missing_once.lock().unwrap().remove(tool) {
            return false;
        }
        !self.missing.lock().unwrap().contains(tool)
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        self.applied.lock().unwrap().push(manifest.to_string());
        self.exec(
            "kubectl",
            &["apply", "-f", "-"],
            ExecOptions::default().with_input(manifest),
        )
        .await?;
        Ok(())
    }
}

/// Treats a fixed set of ports as bound by other processes. Clones share
/// one probe counter.
#[derive(Clone)]
pub struct FixedProbe {
    in_use: BTreeSet<u16>,
    probes: Arc<Mutex<usize>>,
}

impl FixedProbe {
    pub fn new(in_use: impl IntoIterator<Item = u16>) -> Self {
        Self {
            in_use: in_use.into_iter().collect(),
            probes: Arc::new(Mutex::new(0)),
        }
    }

    pub fn probe_count(&self) -> usize {
        *self.probes.lock().unwrap()
    }
}

#[async_trait]
impl PortProbe for FixedProbe {
    async fn is_in_use(&self, port: u16) -> bool {
        *self.probes.lock().unwrap() += 1;
        self.in_use.contains(&port)
    }
}

/// Answers prompts from a script; an exhausted script behaves like Ctrl-C.
#[derive(Default)]
pub struct ScriptedPrompter {
    ports: Mutex<VecDeque<usize>>,
    folders: Mutex<VecDeque<usize>>,
    seen: Mutex<Vec<(PortRole, Vec<u16>)>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the candidate at `index` for the next port prompt.
    pub fn port_choice(self, index: usize) -> Self {
        self.ports.lock().unwrap().push_back(index);
        self
    }

    pub fn folder_choice(self, index: usize) -> Self {
        self.folders.lock().unwrap().push_back(index);
        self
    }

    pub fn port_prompts(&self) -> Vec<(PortRole, Vec<u16>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn choose_port(&self, role: PortRole, candidates: &[u16]) -> Result<u16> {
        self.seen.lock().unwrap().push((role, candidates.to_vec()));
        let index = self
            .ports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(KeeperError::PromptCancelled)?;
        candidates
            .get(index)
            .copied()
            .ok_or(KeeperError::PromptCancelled)
    }

    async fn choose_folder(&self, folders: &[FolderDescriptor]) -> Result<FolderDescriptor> {
        let index = self
            .folders
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(KeeperError::PromptCancelled)?;
        folders
            .get(index)
            .cloned()
            .ok_or(KeeperError::PromptCancelled)
    }
}

/// Everything needed to call `Stage::execute` directly.
pub struct Harness {
    pub config: Configuration,
    pub runner: ScriptedRunner,
    pub prompter: ScriptedPrompter,
    pub ports: PortAllocator,
    pub state: BuildState,
}

impl Harness {
    pub fn new(config: Configuration, runner: ScriptedRunner) -> Self {
        Self {
            state: BuildState::new(config.clone()),
            config,
            runner,
            prompter: ScriptedPrompter::new(),
            ports: PortAllocator::with_probe(FixedProbe::new([])),
        }
    }

    pub fn with_prompter(mut self, prompter: ScriptedPrompter) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_ports_in_use(mut self, in_use: impl IntoIterator<Item = u16>) -> Self {
        self.ports = PortAllocator::with_probe(FixedProbe::new(in_use));
        self
    }

    pub fn with_state(mut self, state: BuildState) -> Self {
        self.state = state.with_config(self.config.clone());
        self
    }

    pub fn env(&self) -> StageEnv<'_> {
        StageEnv {
            config: &self.config,
            runner: &self.runner,
            prompter: &self.prompter,
            ports: &self.ports,
        }
    }

    pub async fn execute(&self, stage: &dyn Stage) -> Result<StageResult> {
        let env = self.env();
        let ctx = StageContext {
            env: &env,
            state: &self.state,
        };
        stage.execute(&ctx).await
    }
}

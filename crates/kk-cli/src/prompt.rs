//! Terminal-backed answers to the installer's interactive questions.

use std::io;

use async_trait::async_trait;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use kk_core::models::{FolderDescriptor, PortRole};
use kk_core::services::prompt::Prompter;
use kk_core::{KeeperError, Result};

use crate::app::PickerState;
use crate::keys::{handle_key, PickerAction};
use crate::ui;

/// Shows a full-screen picker for each question.
#[derive(Debug, Default, Clone)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }

    async fn pick(&self, state: PickerState) -> Result<usize> {
        tracing::debug!(title = %state.title.trim(), items = state.items.len(), "opening picker");
        let choice = tokio::task::spawn_blocking(move || run_picker(state))
            .await
            .map_err(|e| KeeperError::Prompt(format!("picker task failed: {e}")))?
            .map_err(|e| KeeperError::Prompt(e.to_string()))?;
        choice.ok_or(KeeperError::PromptCancelled)
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn choose_port(&self, role: PortRole, candidates: &[u16]) -> Result<u16> {
        let index = self.pick(PickerState::for_ports(role, candidates)).await?;
        let port = candidates[index];
        tracing::info!(%role, port, "port chosen");
        Ok(port)
    }

    async fn choose_folder(&self, folders: &[FolderDescriptor]) -> Result<FolderDescriptor> {
        let index = self.pick(PickerState::for_folders(folders)).await?;
        let folder = folders[index].clone();
        tracing::info!(folder = %folder.id, "folder chosen");
        Ok(folder)
    }
}

/// Blocking picker loop. Returns `None` when the user cancels.
fn run_picker(mut state: PickerState) -> io::Result<Option<usize>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e);
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend) {
        Ok(terminal) => terminal,
        Err(e) => {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            let _ = disable_raw_mode();
            return Err(e);
        }
    };

    let outcome = picker_loop(&mut terminal, &mut state);

    // restore on every path
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
    outcome
}

fn picker_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut PickerState,
) -> io::Result<Option<usize>> {
    loop {
        terminal.draw(|f| ui::render(f, state))?;
        if let Event::Key(key) = event::read()? {
            match handle_key(state, key) {
                PickerAction::Continue => {}
                PickerAction::Chosen(index) => return Ok(Some(index)),
                PickerAction::Cancelled => return Ok(None),
            }
        }
    }
}

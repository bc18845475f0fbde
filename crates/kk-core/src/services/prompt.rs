use async_trait::async_trait;

use crate::error::{KeeperError, Result};
use crate::models::{FolderDescriptor, PortRole};

/// Interactive selection workflow supplied by the front end.
///
/// Implementations return [`KeeperError::PromptCancelled`] when the user
/// interrupts the prompt.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Pick one port for `role`. `candidates` is never empty; the first entry
    /// is the allocator's suggestion.
    async fn choose_port(&self, role: PortRole, candidates: &[u16]) -> Result<u16>;

    async fn choose_folder(&self, folders: &[FolderDescriptor]) -> Result<FolderDescriptor>;
}

/// Used when no terminal is attached; every prompt fails.
#[derive(Debug, Default, Clone)]
pub struct NonInteractive;

#[async_trait]
impl Prompter for NonInteractive {
    async fn choose_port(&self, role: PortRole, _candidates: &[u16]) -> Result<u16> {
        Err(KeeperError::Prompt(format!(
            "cannot ask for the {role} port without a terminal; pass --{role}-port"
        )))
    }

    async fn choose_folder(&self, _folders: &[FolderDescriptor]) -> Result<FolderDescriptor> {
        Err(KeeperError::Prompt(
            "several backend folders found; pass --folder <id> to pick one".into(),
        ))
    }
}

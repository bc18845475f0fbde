use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ports::PortAllocation;
use super::state::FolderDescriptor;

/// Ordinal position of a stage in the pipeline.
///
/// The numbering is part of the persisted format and of the printed resume
/// command, so existing ordinals must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StageId(u8);

impl StageId {
    pub const PREREQUISITES: StageId = StageId(1);
    pub const TOOLS: StageId = StageId(2);
    pub const CLUSTER: StageId = StageId(3);
    pub const DASHBOARD: StageId = StageId(4);
    pub const SECRETS_OPERATOR: StageId = StageId(5);
    pub const BACKEND: StageId = StageId(6);
    pub const VALIDATION: StageId = StageId(7);

    /// Every stage in execution order.
    pub const ALL: [StageId; 7] = [
        Self::PREREQUISITES,
        Self::TOOLS,
        Self::CLUSTER,
        Self::DASHBOARD,
        Self::SECRETS_OPERATOR,
        Self::BACKEND,
        Self::VALIDATION,
    ];

    pub fn ordinal(self) -> u8 {
        self.0
    }

    pub fn slug(self) -> &'static str {
        match self.0 {
            1 => "prerequisites",
            2 => "tools",
            3 => "cluster",
            4 => "dashboard",
            5 => "secrets-operator",
            6 => "backend-integration",
            7 => "validation",
            _ => "unknown",
        }
    }

    /// Stages strictly before this one.
    pub fn predecessors(self) -> impl Iterator<Item = StageId> {
        Self::ALL.into_iter().filter(move |s| *s < self)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if let Ok(n) = token.parse::<u8>() {
            return Self::ALL
                .into_iter()
                .find(|id| id.0 == n)
                .ok_or_else(|| format!("unknown stage '{token}'"));
        }
        Self::ALL
            .into_iter()
            .find(|id| id.slug().eq_ignore_ascii_case(token))
            .ok_or_else(|| format!("unknown stage '{token}'"))
    }
}

impl TryFrom<String> for StageId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StageId> for String {
    fn from(id: StageId) -> Self {
        id.to_string()
    }
}

/// A single change a successful stage asks the orchestrator to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Ports(PortAllocation),
    ClusterReady,
    DashboardToken(String),
    Folders(Vec<FolderDescriptor>),
    SelectedFolder(FolderDescriptor),
}

/// Terminal outcome of one stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Success {
        message: String,
        updates: Vec<StateUpdate>,
        warnings: Vec<String>,
    },
    Failure {
        message: String,
        detail: String,
    },
    Skipped {
        message: String,
    },
}

impl StageResult {
    pub fn success(message: impl Into<String>) -> Self {
        StageResult::Success {
            message: message.into(),
            updates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>, detail: impl Into<String>) -> Self {
        StageResult::Failure {
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        StageResult::Skipped {
            message: message.into(),
        }
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        if let StageResult::Success { updates, .. } = &mut self {
            updates.push(update);
        }
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        if let StageResult::Success { warnings, .. } = &mut self {
            warnings.push(warning.into());
        }
        self
    }

    pub fn message(&self) -> &str {
        match self {
            StageResult::Success { message, .. }
            | StageResult::Failure { message, .. }
            | StageResult::Skipped { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageResult::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageResult::Skipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordinals_and_slugs() {
        assert_eq!("3".parse::<StageId>().unwrap(), StageId::CLUSTER);
        assert_eq!("05".parse::<StageId>().unwrap(), StageId::SECRETS_OPERATOR);
        assert_eq!(
            "backend-integration".parse::<StageId>().unwrap(),
            StageId::BACKEND
        );
        assert!("08".parse::<StageId>().is_err());
        assert!("bogus".parse::<StageId>().is_err());
    }

    #[test]
    fn displays_two_digit_token() {
        assert_eq!(StageId::PREREQUISITES.to_string(), "01");
        assert_eq!(StageId::VALIDATION.to_string(), "07");
    }

    #[test]
    fn order_is_fixed() {
        let mut sorted = StageId::ALL;
        sorted.sort();
        assert_eq!(sorted, StageId::ALL);
        assert_eq!(StageId::DASHBOARD.predecessors().count(), 3);
    }

    #[test]
    fn updates_only_attach_to_success() {
        let failed = StageResult::failure("boom", "detail").with_update(StateUpdate::ClusterReady);
        assert_eq!(failed, StageResult::failure("boom", "detail"));

        let ok = StageResult::success("ok").with_update(StateUpdate::ClusterReady);
        match ok {
            StageResult::Success { updates, .. } => assert_eq!(updates.len(), 1),
            _ => panic!("expected success"),
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::Configuration;
use super::ports::{PortAllocation, PortRole};
use super::stage::{StageId, StateUpdate};

/// A folder in the secrets backend that a secret store can be scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    pub id: String,
    pub name: String,
}

/// Persisted record of pipeline progress and user decisions.
///
/// Progress is append-only: nothing here removes a completed stage, so a
/// resumed run can only move forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildState {
    #[serde(skip)]
    config: Configuration,
    completed_stages: BTreeSet<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_stage: Option<StageId>,
    #[serde(default)]
    cluster_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dashboard_token: Option<String>,
    #[serde(default)]
    ports: BTreeMap<PortRole, u16>,
    #[serde(default)]
    folders: Vec<FolderDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_folder: Option<FolderDescriptor>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BuildState {
    pub fn new(config: Configuration) -> Self {
        let now = Utc::now();
        Self {
            config,
            completed_stages: BTreeSet::new(),
            current_stage: None,
            cluster_ready: false,
            dashboard_token: None,
            ports: BTreeMap::new(),
            folders: Vec::new(),
            selected_folder: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the configuration of the current run to a loaded snapshot.
    pub fn with_config(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn completed_stages(&self) -> &BTreeSet<StageId> {
        &self.completed_stages
    }

    pub fn is_completed(&self, id: StageId) -> bool {
        self.completed_stages.contains(&id)
    }

    pub fn current_stage(&self) -> Option<StageId> {
        self.current_stage
    }

    pub fn cluster_ready(&self) -> bool {
        self.cluster_ready
    }

    pub fn dashboard_token(&self) -> Option<&str> {
        self.dashboard_token.as_deref()
    }

    pub fn folders(&self) -> &[FolderDescriptor] {
        &self.folders
    }

    pub fn selected_folder(&self) -> Option<&FolderDescriptor> {
        self.selected_folder.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Previously persisted allocation, if any roles were recorded.
    pub fn port_allocation(&self) -> Option<PortAllocation> {
        if self.ports.is_empty() {
            None
        } else {
            Some(PortAllocation::from_ports(self.ports.clone()))
        }
    }

    /// First stage in order that has not completed yet.
    pub fn next_stage(&self) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .find(|id| !self.completed_stages.contains(id))
    }

    pub fn mark_completed(&mut self, id: StageId) {
        self.completed_stages.insert(id);
        self.touch();
    }

    pub(crate) fn set_current_stage(&mut self, id: Option<StageId>) {
        self.current_stage = id;
    }

    /// A fresh state that keeps only the progress of stages accepted by
    /// `keep`, along with the facts those stages recorded.
    ///
    /// Used after tearing infrastructure down; `self` is left untouched.
    pub fn retaining(&self, keep: impl Fn(StageId) -> bool) -> BuildState {
        let mut next = BuildState::new(self.config.clone());
        next.created_at = self.created_at;
        next.completed_stages = self
            .completed_stages
            .iter()
            .copied()
            .filter(|id| keep(*id))
            .collect();
        if keep(StageId::CLUSTER) {
            next.ports = self.ports.clone();
            next.cluster_ready = self.cluster_ready;
        } else if keep(StageId::TOOLS) {
            // host ports stay valid without a cluster
            next.ports = self.ports.clone();
        }
        if keep(StageId::DASHBOARD) {
            next.dashboard_token = self.dashboard_token.clone();
        }
        if keep(StageId::BACKEND) {
            next.folders = self.folders.clone();
            next.selected_folder = self.selected_folder.clone();
        }
        next
    }

    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Ports(allocation) => {
                self.ports
                    .extend(allocation.ports().iter().map(|(r, p)| (*r, *p)));
            }
            StateUpdate::ClusterReady => self.cluster_ready = true,
            StateUpdate::DashboardToken(token) => self.dashboard_token = Some(token),
            StateUpdate::Folders(folders) => {
                for folder in folders {
                    if !self.folders.iter().any(|f| f.id == folder.id) {
                        self.folders.push(folder);
                    }
                }
            }
            StateUpdate::SelectedFolder(folder) => self.selected_folder = Some(folder),
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

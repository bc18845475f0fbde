use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical service that needs a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortRole {
    Http,
    Https,
    NodeportBase,
    Dashboard,
}

impl PortRole {
    pub const ALL: [PortRole; 4] = [
        PortRole::Http,
        PortRole::Https,
        PortRole::NodeportBase,
        PortRole::Dashboard,
    ];

    pub fn default_port(self) -> u16 {
        match self {
            PortRole::Http => 8080,
            PortRole::Https => 8443,
            PortRole::NodeportBase => 30080,
            PortRole::Dashboard => 8001,
        }
    }

    /// Role-appropriate range searched when the default is taken.
    pub fn fallback_range(self) -> Range<u16> {
        match self {
            PortRole::Http => 8081..8101,
            PortRole::Https => 8444..8464,
            PortRole::NodeportBase => 30081..30182,
            PortRole::Dashboard => 8002..8022,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortRole::Http => "http",
            PortRole::Https => "https",
            PortRole::NodeportBase => "nodeport-base",
            PortRole::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(PortRole::Http),
            "https" => Ok(PortRole::Https),
            "nodeport" | "nodeport-base" | "nodeport_base" => Ok(PortRole::NodeportBase),
            "dashboard" => Ok(PortRole::Dashboard),
            other => Err(format!("unknown port role '{other}'")),
        }
    }
}

/// How ports not pinned by an override are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortMode {
    #[default]
    Auto,
    Interactive,
}

/// Role to port mapping produced by the allocator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortAllocation {
    ports: BTreeMap<PortRole, u16>,
    forced: BTreeSet<PortRole>,
}

impl PortAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ports(ports: BTreeMap<PortRole, u16>) -> Self {
        Self {
            ports,
            forced: BTreeSet::new(),
        }
    }

    pub fn assign(&mut self, role: PortRole, port: u16) {
        self.ports.insert(role, port);
    }

    /// Assign a port that is known to conflict with another local process.
    pub fn assign_forced(&mut self, role: PortRole, port: u16) {
        self.ports.insert(role, port);
        self.forced.insert(role);
    }

    pub fn get(&self, role: PortRole) -> Option<u16> {
        self.ports.get(&role).copied()
    }

    pub fn contains_port(&self, port: u16) -> bool {
        self.ports.values().any(|&p| p == port)
    }

    pub fn is_complete(&self) -> bool {
        PortRole::ALL.iter().all(|r| self.ports.contains_key(r))
    }

    pub fn forced_roles(&self) -> &BTreeSet<PortRole> {
        &self.forced
    }

    pub fn ports(&self) -> &BTreeMap<PortRole, u16> {
        &self.ports
    }

    /// All assigned ports are pairwise distinct.
    pub fn is_distinct(&self) -> bool {
        let unique: BTreeSet<u16> = self.ports.values().copied().collect();
        unique.len() == self.ports.len()
    }
}

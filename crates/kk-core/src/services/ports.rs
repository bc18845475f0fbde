use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::{KeeperError, Result};
use crate::models::{PortAllocation, PortMode, PortRole};
use crate::services::prompt::Prompter;

/// Upper bound on probes issued by a single scan.
pub const MAX_PROBES_PER_SCAN: usize = 100;

/// Searched once a role's own fallback range is exhausted.
pub const GENERIC_FALLBACK: Range<u16> = 18000..18100;

/// How many ports an interactive prompt offers per role.
const INTERACTIVE_CHOICES: usize = 6;

const PROBE_TIMEOUT: Duration = Duration::from_millis(150);

/// Answers whether something on this machine already listens on a port.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_in_use(&self, port: u16) -> bool;
}

/// A port is in use when a loopback connect succeeds within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl PortProbe for TcpProbe {
    async fn is_in_use(&self, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(("127.0.0.1", port))).await,
            Ok(Ok(_))
        )
    }
}

/// Proposes host ports for the cluster's published services.
///
/// Results are advisory: another process may bind a port between the probe
/// and the cluster starting, and that race is accepted.
pub struct PortAllocator {
    probe: Box<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::with_probe(TcpProbe::default())
    }

    pub fn with_probe(probe: impl PortProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
        }
    }

    /// Ports in `range` that are currently in use, probing at most
    /// [`MAX_PROBES_PER_SCAN`] candidates.
    pub async fn scan_range(&self, range: Range<u16>) -> BTreeSet<u16> {
        let mut in_use = BTreeSet::new();
        for port in range.filter(|p| *p != 0).take(MAX_PROBES_PER_SCAN) {
            if self.probe.is_in_use(port).await {
                in_use.insert(port);
            }
        }
        in_use
    }

    /// The first `count` free ports in `range`, in ascending order. May
    /// return fewer when the bounded range runs out.
    pub async fn find_available(&self, range: Range<u16>, count: usize) -> Vec<u16> {
        self.free_ports(range, &PortAllocation::new(), count).await
    }

    /// Default port per role, falling back to the role range, then the
    /// generic range, then the default flagged as a forced conflict.
    pub async fn suggest_assignment(&self) -> PortAllocation {
        self.suggest_remaining(PortAllocation::new()).await
    }

    /// Combine prior state, overrides and the selected mode into one
    /// allocation.
    ///
    /// Precedence: overrides pin their roles (even when in use, flagged as
    /// forced); persisted ports fill the roles no override names, unless an
    /// override took the port; the remaining roles are suggested in auto
    /// mode or asked for in interactive mode. A complete prior allocation
    /// without conflicting overrides comes back unchanged.
    pub async fn resolve_assignment(
        &self,
        overrides: &BTreeMap<PortRole, u16>,
        prior: Option<&PortAllocation>,
        mode: PortMode,
        prompter: &dyn Prompter,
    ) -> Result<PortAllocation> {
        let mut allocation = PortAllocation::new();
        let persisted = |role: PortRole| prior.and_then(|p| p.get(role));
        let was_forced = |role: &PortRole| prior.is_some_and(|p| p.forced_roles().contains(role));

        for (role, port) in overrides {
            if allocation.contains_port(*port) {
                return Err(KeeperError::PortAllocation(format!(
                    "override {role}={port} collides with another override"
                )));
            }
            match persisted(*role) {
                // the running cluster may hold its own port, so it is not probed again
                Some(old) if old == *port => {
                    if was_forced(role) {
                        allocation.assign_forced(*role, *port);
                    } else {
                        allocation.assign(*role, *port);
                    }
                    continue;
                }
                Some(old) => {
                    tracing::warn!(%role, old, new = *port, "override replaces persisted port");
                }
                None => {}
            }
            if self.probe.is_in_use(*port).await {
                tracing::warn!(%role, port, "override port is already in use");
                allocation.assign_forced(*role, *port);
            } else {
                allocation.assign(*role, *port);
            }
        }

        if let Some(prior) = prior {
            for (role, port) in prior.ports() {
                if allocation.get(*role).is_some() {
                    continue;
                }
                if allocation.contains_port(*port) {
                    tracing::warn!(%role, port, "persisted port taken by an override, reallocating");
                    continue;
                }
                if was_forced(role) {
                    allocation.assign_forced(*role, *port);
                } else {
                    allocation.assign(*role, *port);
                }
            }
            if allocation.is_complete() && allocation.ports() == prior.ports() {
                tracing::info!("reusing persisted port allocation");
            }
        }

        match mode {
            PortMode::Auto => Ok(self.suggest_remaining(allocation).await),
            PortMode::Interactive => self.select_remaining(allocation, prompter).await,
        }
    }

    async fn suggest_remaining(&self, mut allocation: PortAllocation) -> PortAllocation {
        for role in PortRole::ALL {
            if allocation.get(role).is_some() {
                continue;
            }
            match self.suggest_port(role, &allocation).await {
                Some(port) => allocation.assign(role, port),
                None => {
                    let port = self.forced_port(role, &allocation);
                    tracing::warn!(%role, port, "no free port found, assigning a conflicting one");
                    allocation.assign_forced(role, port);
                }
            }
        }
        allocation
    }

    async fn select_remaining(
        &self,
        mut allocation: PortAllocation,
        prompter: &dyn Prompter,
    ) -> Result<PortAllocation> {
        for role in PortRole::ALL {
            if allocation.get(role).is_some() {
                continue;
            }
            let suggested = match self.suggest_port(role, &allocation).await {
                Some(port) => port,
                None => self.forced_port(role, &allocation),
            };
            let mut candidates = vec![suggested];
            let mut taken = allocation.clone();
            taken.assign(role, suggested);
            candidates.extend(
                self.free_ports(role.fallback_range(), &taken, INTERACTIVE_CHOICES - 1)
                    .await,
            );

            let chosen = prompter.choose_port(role, &candidates).await?;
            if allocation.contains_port(chosen) {
                return Err(KeeperError::PortAllocation(format!(
                    "port {chosen} is already assigned to another role"
                )));
            }
            if self.probe.is_in_use(chosen).await {
                allocation.assign_forced(role, chosen);
            } else {
                allocation.assign(role, chosen);
            }
        }
        Ok(allocation)
    }

    async fn suggest_port(&self, role: PortRole, taken: &PortAllocation) -> Option<u16> {
        let default = role.default_port();
        if !taken.contains_port(default) && !self.probe.is_in_use(default).await {
            return Some(default);
        }
        if let Some(port) = self.free_ports(role.fallback_range(), taken, 1).await.first() {
            return Some(*port);
        }
        self.free_ports(GENERIC_FALLBACK, taken, 1).await.first().copied()
    }

    /// Conflict fallback that still keeps ports distinct within the allocation.
    fn forced_port(&self, role: PortRole, taken: &PortAllocation) -> u16 {
        let default = role.default_port();
        if !taken.contains_port(default) {
            return default;
        }
        role.fallback_range()
            .chain(GENERIC_FALLBACK)
            .find(|p| !taken.contains_port(*p))
            .unwrap_or(default)
    }

    async fn free_ports(&self, range: Range<u16>, taken: &PortAllocation, count: usize) -> Vec<u16> {
        let mut free = Vec::with_capacity(count);
        if count == 0 {
            return free;
        }
        for port in range.filter(|p| *p != 0).take(MAX_PROBES_PER_SCAN) {
            if taken.contains_port(port) {
                continue;
            }
            if !self.probe.is_in_use(port).await {
                free.push(port);
                if free.len() == count {
                    break;
                }
            }
        }
        free
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

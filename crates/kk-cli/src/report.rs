//! Plain-text rendering for the `status` and `ports` commands.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::ops::RangeInclusive;

use kk_core::models::{BuildState, Configuration, PortAllocation, StageId};
use kk_core::services::state::BuildStateStore;

/// Read the snapshot for `config` and render it. An unreadable snapshot is
/// reported on a warning line and rendered as absent.
pub async fn load_status(config: &Configuration) -> String {
    let store = BuildStateStore::for_config(config);
    match store.read().await {
        Ok(state) => status(config, state.as_ref()),
        Err(e) => {
            tracing::warn!(path = %store.path().display(), error = %e, "ignoring unreadable build state");
            let mut out = format!("warning: ignoring unreadable build state: {e}\n");
            out.push_str(&status(config, None));
            out
        }
    }
}

/// Progress recorded for `config`'s cluster, or a hint when nothing ran yet.
pub fn status(config: &Configuration, state: Option<&BuildState>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cluster: {}", config.cluster_name);

    let Some(state) = state else {
        let _ = writeln!(
            out,
            "no build state at {}; run `k8s-keeper install`",
            config.state_file().display()
        );
        return out;
    };

    for id in StageId::ALL {
        let mark = if state.is_completed(id) { "x" } else { " " };
        let _ = writeln!(out, "[{mark}] {id} {}", id.slug());
    }
    match state.next_stage() {
        Some(next) => {
            let _ = writeln!(out, "next: {next} ({})", next.slug());
        }
        None => {
            let _ = writeln!(out, "next: none, installation complete");
        }
    }
    if let Some(stage) = state.current_stage() {
        if !state.is_completed(stage) {
            let _ = writeln!(out, "interrupted during: {stage} ({})", stage.slug());
        }
    }
    let _ = writeln!(out, "cluster ready: {}", if state.cluster_ready() { "yes" } else { "no" });
    if let Some(ports) = state.port_allocation() {
        out.push_str(&ports_table(&ports));
    }
    if state.dashboard_token().is_some() {
        let _ = writeln!(out, "dashboard token: recorded");
    }
    if let Some(folder) = state.selected_folder() {
        let _ = writeln!(out, "backend folder: {} ({})", folder.name, folder.id);
    }
    out
}

/// One `role  port` line per assigned role.
pub fn ports_table(ports: &PortAllocation) -> String {
    let mut out = String::from("ports:\n");
    for (role, port) in ports.ports() {
        let forced = if ports.forced_roles().contains(role) { "  (in use)" } else { "" };
        let _ = writeln!(out, "  {:<14}{port}{forced}", role.as_str());
    }
    out
}

/// Ports found listening within `range`.
pub fn scan(range: RangeInclusive<u16>, in_use: &BTreeSet<u16>) -> String {
    let mut out = String::new();
    if in_use.is_empty() {
        let _ = writeln!(out, "no ports in use in {}-{}", range.start(), range.end());
    } else {
        let listed: Vec<String> = in_use.iter().map(u16::to_string).collect();
        let _ = writeln!(
            out,
            "{} in use in {}-{}: {}",
            in_use.len(),
            range.start(),
            range.end(),
            listed.join(", ")
        );
    }
    out
}

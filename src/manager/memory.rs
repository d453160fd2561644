//! In-memory service manager.
//!
//! Mirrors the observable behavior of systemd closely enough to exercise
//! reconciliation: `start`/`stop` flip the active state, `enable`/`disable`
//! flip the enabled state, and every call is recorded in order.

use anyhow::{Result, bail};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{DISABLED, INACTIVE, ServiceManager, UnitAction, UnitRecord};
use crate::error::SyncError;

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<String, (bool, bool)>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryManager {
    state: Mutex<State>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a unit's live state.
    pub fn set_unit(&self, unit: &str, active: bool, enabled: bool) {
        self.lock().units.insert(unit.to_string(), (active, enabled));
    }

    /// Make every query and action on `unit` fail.
    pub fn fail_on(&self, unit: &str) {
        self.lock().failing.insert(unit.to_string());
    }

    /// Every call made so far, as `"<verb> <unit>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls other than queries.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("query "))
            .collect()
    }

    pub fn reload_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == "daemon-reload")
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Current state without recording a call.
    pub fn peek(&self, unit: &str) -> UnitRecord {
        let state = self.lock();
        let (active, enabled) = state.units.get(unit).copied().unwrap_or((false, false));
        record(unit, active, enabled)
    }
}

fn record(unit: &str, active: bool, enabled: bool) -> UnitRecord {
    UnitRecord::new(
        unit,
        if active { "active" } else { INACTIVE },
        if enabled { "enabled" } else { DISABLED },
    )
}

impl ServiceManager for MemoryManager {
    fn query(&self, unit: &str) -> Result<UnitRecord> {
        let mut state = self.lock();
        state.calls.push(format!("query {unit}"));
        if state.failing.contains(unit) {
            bail!("query of {unit} failed");
        }
        let (active, enabled) = state.units.get(unit).copied().unwrap_or((false, false));
        Ok(record(unit, active, enabled))
    }

    fn apply(&self, action: UnitAction, unit: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("{action} {unit}"));
        if state.failing.contains(unit) {
            return Err(SyncError::UnitAction {
                action,
                unit: unit.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        let entry = state.units.entry(unit.to_string()).or_insert((false, false));
        match action {
            UnitAction::Start => entry.0 = true,
            UnitAction::Stop => entry.0 = false,
            UnitAction::Enable => entry.1 = true,
            UnitAction::Disable => entry.1 = false,
        }
        Ok(())
    }

    fn daemon_reload(&self) -> Result<()> {
        self.lock().calls.push("daemon-reload".to_string());
        Ok(())
    }

    fn probe(&self) -> Result<String> {
        Ok("in-memory".to_string())
    }
}

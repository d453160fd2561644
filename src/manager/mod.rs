//! Live service-manager capability.
//!
//! Reconciliation and status reporting never touch systemd directly; they go
//! through [`ServiceManager`], which has a subprocess implementation
//! ([`SystemctlManager`]), a D-Bus implementation ([`DbusManager`]) and an
//! in-memory fake ([`MemoryManager`]).

pub mod dbus;
pub mod memory;
pub mod systemctl;

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::command_runner::RealCommandRunner;
use crate::settings::{Backend, Settings};
use crate::unit_file::UnitKind;

pub use dbus::DbusManager;
pub use memory::MemoryManager;
pub use systemctl::SystemctlManager;

/// Reported when the active state cannot be read.
pub const INACTIVE: &str = "inactive";
/// Reported when the enabled state cannot be read.
pub const DISABLED: &str = "disabled";

/// A mutating action on a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitAction {
    Start,
    Stop,
    Enable,
    Disable,
}

impl UnitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitAction::Start => "start",
            UnitAction::Stop => "stop",
            UnitAction::Enable => "enable",
            UnitAction::Disable => "disable",
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observed state of one unit at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub name: String,
    pub kind: UnitKind,
    #[serde(rename = "active")]
    pub active_state: String,
    #[serde(rename = "enabled")]
    pub enabled_state: String,
}

impl UnitRecord {
    pub fn new(
        name: impl Into<String>,
        active_state: impl Into<String>,
        enabled_state: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            kind: UnitKind::from_file_name(&name).unwrap_or(UnitKind::Service),
            name,
            active_state: active_state.into(),
            enabled_state: enabled_state.into(),
        }
    }

    /// Sentinel record used when a query fails.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, INACTIVE, DISABLED)
    }

    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    /// Enabled in any of the forms systemd reports for an installed link.
    pub fn is_enabled(&self) -> bool {
        matches!(
            self.enabled_state.as_str(),
            "enabled" | "enabled-runtime" | "static" | "indirect" | "generated" | "alias"
        )
    }
}

/// Query and mutate live unit state.
pub trait ServiceManager: Send + Sync {
    /// Read the active and enabled state of `unit`.
    fn query(&self, unit: &str) -> Result<UnitRecord>;

    /// Apply a single action to `unit`.
    fn apply(&self, action: UnitAction, unit: &str) -> Result<()>;

    /// Make systemd re-read unit files.
    fn daemon_reload(&self) -> Result<()>;

    /// Check that the backend is reachable.
    fn probe(&self) -> Result<String>;
}

/// Query `unit`, reporting the inactive/disabled sentinel on failure.
pub fn query_or_sentinel(manager: &dyn ServiceManager, unit: &str) -> UnitRecord {
    match manager.query(unit) {
        Ok(record) => record,
        Err(e) => {
            warn!(unit = %unit, "Unit query failed: {:#}", e);
            UnitRecord::unknown(unit)
        }
    }
}

/// Build the configured backend.
pub fn connect(settings: &Settings) -> Result<Box<dyn ServiceManager>> {
    Ok(match settings.backend {
        Backend::Systemctl => Box::new(SystemctlManager::new(
            Arc::new(RealCommandRunner),
            settings.command_timeout,
        )),
        Backend::Dbus => Box::new(DbusManager::new(settings.command_timeout)?),
    })
}

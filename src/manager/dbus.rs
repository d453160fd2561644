//! Systemd D-Bus backend.
//!
//! ## D-Bus Interface
//!
//! - **Bus**: System bus (`org.freedesktop.systemd1`)
//! - **Path**: `/org/freedesktop/systemd1`
//! - **Interface**: `org.freedesktop.systemd1.Manager`
//!
//! Every method call is bounded by the connection's method timeout.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};
use zbus::blocking::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::{DISABLED, INACTIVE, ServiceManager, UnitAction, UnitRecord};
use crate::error::SyncError;

/// Proxy for the systemd Manager interface.
#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait Systemd1Manager {
    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    /// Returns (carries_install_info, Vec<(type, symlink_name, destination)>)
    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<(String, String, String)>)>;

    /// Returns Vec<(type, symlink_name, destination)>
    fn disable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
    ) -> zbus::Result<Vec<(String, String, String)>>;

    /// daemon-reload
    fn reload(&self) -> zbus::Result<()>;

    /// Load a unit (creates it if not loaded).
    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// Proxy for individual systemd Unit properties.
#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1"
)]
trait Systemd1Unit {
    /// active, inactive, activating, deactivating, failed
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;

    /// enabled, disabled, static, masked, ...
    #[zbus(property)]
    fn unit_file_state(&self) -> zbus::Result<String>;
}

pub struct DbusManager {
    connection: Connection,
}

impl DbusManager {
    /// Connect to the system bus.
    pub fn new(timeout: Duration) -> Result<Self> {
        let connection = zbus::blocking::connection::Builder::system()
            .context("Failed to prepare system D-Bus connection")?
            .method_timeout(timeout)
            .build()
            .context("Failed to connect to system D-Bus")?;
        Ok(Self { connection })
    }

    fn manager(&self) -> Result<Systemd1ManagerProxyBlocking<'_>> {
        Systemd1ManagerProxyBlocking::new(&self.connection)
            .context("Failed to create systemd Manager proxy")
    }

    fn unit_proxy(&self, path: OwnedObjectPath) -> Result<Systemd1UnitProxyBlocking<'_>> {
        Systemd1UnitProxyBlocking::builder(&self.connection)
            .path(path)
            .context("Invalid unit path")?
            .build()
            .context("Failed to create Unit proxy")
    }

    fn call(&self, action: UnitAction, unit: &str) -> Result<()> {
        let manager = self.manager()?;
        match action {
            UnitAction::Start => {
                manager.start_unit(unit, "replace")?;
            }
            UnitAction::Stop => {
                manager.stop_unit(unit, "replace")?;
            }
            UnitAction::Enable => {
                let (_, changes) = manager.enable_unit_files(&[unit], false, false)?;
                debug!(unit, changes = changes.len(), "Enabled unit file");
            }
            UnitAction::Disable => {
                let changes = manager.disable_unit_files(&[unit], false)?;
                debug!(unit, changes = changes.len(), "Disabled unit file");
            }
        }
        Ok(())
    }
}

impl ServiceManager for DbusManager {
    fn query(&self, unit: &str) -> Result<UnitRecord> {
        let path = self
            .manager()?
            .load_unit(unit)
            .with_context(|| format!("Failed to load unit: {unit}"))?;
        let proxy = self.unit_proxy(path)?;

        let active = proxy.active_state().unwrap_or_else(|e| {
            warn!("Failed to read active_state for '{}': {}", unit, e);
            INACTIVE.to_string()
        });
        let enabled = proxy.unit_file_state().unwrap_or_else(|e| {
            warn!("Failed to read unit_file_state for '{}': {}", unit, e);
            DISABLED.to_string()
        });
        Ok(UnitRecord::new(unit, active, enabled))
    }

    fn apply(&self, action: UnitAction, unit: &str) -> Result<()> {
        self.call(action, unit).map_err(|e| {
            SyncError::UnitAction {
                action,
                unit: unit.to_string(),
                reason: format!("{e:#}"),
            }
            .into()
        })
    }

    fn daemon_reload(&self) -> Result<()> {
        self.manager()?
            .reload()
            .context("Failed to reload systemd daemon")
    }

    fn probe(&self) -> Result<String> {
        let version = self
            .manager()?
            .version()
            .context("Failed to read systemd version over D-Bus")?;
        Ok(format!("systemd {version} (D-Bus)"))
    }
}

//! Unit installer: renders a utility's unit definitions and writes them to the
//! init system's unit directory.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::catalog::CatalogEntry;
use crate::error::SyncError;
use crate::unit_file::UnitKind;

/// Replaced with the absolute install root in service units.
pub const INSTALL_DIR_PLACEHOLDER: &str = "{{INSTALL_DIR}}";

/// Replaced with the utility's config store directory in service units.
pub const CONFIG_DIR_PLACEHOLDER: &str = "{{CONFIG_DIR}}";

/// A unit definition ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    pub name: String,
    pub kind: UnitKind,
    pub content: String,
}

pub struct UnitInstaller<'a> {
    unit_dir: &'a Path,
    install_root: &'a Path,
    config_dir: PathBuf,
}

impl<'a> UnitInstaller<'a> {
    pub fn new(unit_dir: &'a Path, install_root: &'a Path, config_dir: PathBuf) -> Self {
        Self {
            unit_dir,
            install_root,
            config_dir,
        }
    }

    /// Render every unit of `entry`. Timers are taken verbatim.
    pub fn render(&self, entry: &CatalogEntry) -> Result<Vec<RenderedUnit>, SyncError> {
        let mut rendered = Vec::new();

        for name in &entry.timer_units {
            rendered.push(RenderedUnit {
                name: name.clone(),
                kind: UnitKind::Timer,
                content: fs::read_to_string(entry.unit_source(name))?,
            });
        }

        for name in &entry.service_units {
            let source = fs::read_to_string(entry.unit_source(name))?;
            rendered.push(RenderedUnit {
                name: name.clone(),
                kind: UnitKind::Service,
                content: self.substitute(&source),
            });
        }

        Ok(rendered)
    }

    fn substitute(&self, source: &str) -> String {
        source
            .replace(
                INSTALL_DIR_PLACEHOLDER,
                &self.install_root.to_string_lossy(),
            )
            .replace(CONFIG_DIR_PLACEHOLDER, &self.config_dir.to_string_lossy())
    }

    /// Rendered units whose installed copy is missing or differs.
    pub fn pending(&self, entry: &CatalogEntry) -> Result<Vec<RenderedUnit>, SyncError> {
        Ok(self
            .render(entry)?
            .into_iter()
            .filter(|unit| !self.is_current(unit))
            .collect())
    }

    fn is_current(&self, unit: &RenderedUnit) -> bool {
        fs::read_to_string(self.unit_dir.join(&unit.name))
            .map(|installed| installed == unit.content)
            .unwrap_or(false)
    }

    /// Write `units` into the unit directory, overwriting existing files.
    ///
    /// Returns the names written. A missing unit directory means the init
    /// system is unavailable and fails the whole utility.
    pub fn install(&self, units: &[RenderedUnit]) -> Result<Vec<String>, SyncError> {
        if !self.unit_dir.is_dir() {
            return Err(SyncError::Environment {
                what: "unit directory",
                path: self.unit_dir.to_path_buf(),
            });
        }

        let mut written = Vec::with_capacity(units.len());
        for unit in units {
            let path = self.unit_dir.join(&unit.name);
            debug!(path = %path.display(), "Writing unit file");
            fs::write(&path, &unit.content)?;
            info!(unit = %unit.name, "Installed unit");
            written.push(unit.name.clone());
        }
        Ok(written)
    }
}

/// Installed `.service`/`.timer` files in `unit_dir` matching `belongs`.
pub fn installed_units(
    unit_dir: &Path,
    belongs: impl Fn(&str) -> bool,
) -> Result<Vec<String>, SyncError> {
    if !unit_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(unit_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| UnitKind::from_file_name(name).is_some())
        .filter(|name| belongs(name))
        .collect();
    names.sort();
    Ok(names)
}

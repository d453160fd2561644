//! Catalog scanner: discovers utility definitions under the install root.
//!
//! Every non-hidden immediate subdirectory of the root is a utility. A utility
//! is *managed* when it carries a `systemd/` directory of unit definitions;
//! otherwise it is listed but never installed, enabled or disabled.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::unit_file::{self, UnitKind};

/// Subdirectory holding a utility's unit definitions.
pub const UNITS_DIR: &str = "systemd";

/// Configuration template, relative to the utility directory.
pub const CONFIG_TEMPLATE: &str = ".env.example";

/// File name of a provisioned config store.
pub const CONFIG_STORE_FILE: &str = ".env";

/// One discovered utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub dir: PathBuf,
    pub has_units: bool,
    /// Service unit file names, in enumeration order.
    pub service_units: Vec<String>,
    /// Timer unit file names, in enumeration order.
    pub timer_units: Vec<String>,
    /// Timer name -> service it activates.
    pub timer_targets: BTreeMap<String, String>,
    pub config_template: Option<PathBuf>,
}

impl CatalogEntry {
    pub fn units_dir(&self) -> PathBuf {
        self.dir.join(UNITS_DIR)
    }

    /// Source path of one of this utility's unit definitions.
    pub fn unit_source(&self, unit: &str) -> PathBuf {
        self.units_dir().join(unit)
    }

    /// Timer that activates `service`, if any.
    pub fn timer_for(&self, service: &str) -> Option<&str> {
        self.timer_targets
            .iter()
            .find(|(_, target)| target.as_str() == service)
            .map(|(timer, _)| timer.as_str())
    }

    /// All unit names, timers first.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.timer_units
            .iter()
            .chain(self.service_units.iter())
            .map(String::as_str)
    }

    pub fn declares_unit(&self, unit: &str) -> bool {
        self.unit_names().any(|name| name == unit)
    }
}

/// The set of utilities found on disk, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Scan `root` for utilities.
    ///
    /// Fails with [`SyncError::NameCollision`] when one managed utility's name
    /// is a strict prefix of another's, and with [`SyncError::UnitCollision`]
    /// when a managed utility declares a unit named after a different one, and
    /// with [`SyncError::DuplicateUnit`] when two managed utilities declare
    /// the same unit.
    pub fn scan(root: &Path) -> Result<Self, SyncError> {
        if !root.is_dir() {
            return Err(SyncError::Environment {
                what: "utilities root",
                path: root.to_path_buf(),
            });
        }

        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %dir_entry.path().display(), "Skipping non UTF-8 directory name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            entries.push(scan_entry(name, dir_entry.path())?);
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let catalog = Self { entries };
        catalog.check_collisions()?;

        debug!(
            utilities = catalog.entries.len(),
            managed = catalog.managed().count(),
            "Scanned catalog"
        );
        Ok(catalog)
    }

    /// Build a catalog from pre-made entries, validating the prefix rule.
    pub fn from_entries(mut entries: Vec<CatalogEntry>) -> Result<Self, SyncError> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let catalog = Self { entries };
        catalog.check_collisions()?;
        Ok(catalog)
    }

    fn check_collisions(&self) -> Result<(), SyncError> {
        let managed: Vec<&str> = self.managed().map(|e| e.name.as_str()).collect();
        // Sorted order places every prefix directly before some name extending it.
        for pair in managed.windows(2) {
            let (short, long) = (pair[0], pair[1]);
            if long.starts_with(short) {
                return Err(SyncError::NameCollision {
                    short: short.to_string(),
                    long: long.to_string(),
                });
            }
        }

        // Removal sweeps installed files by utility-name prefix and by declared
        // name, so every unit belongs to exactly one managed utility.
        for (i, entry) in self.managed().enumerate() {
            for unit in entry.unit_names() {
                if let Some(other) = self
                    .managed()
                    .skip(i + 1)
                    .find(|other| other.declares_unit(unit))
                {
                    return Err(SyncError::DuplicateUnit {
                        unit: unit.to_string(),
                        first: entry.name.clone(),
                        second: other.name.clone(),
                    });
                }
                let owner = self
                    .managed()
                    .find(|other| other.name != entry.name && unit.starts_with(other.name.as_str()));
                if let Some(owner) = owner {
                    return Err(SyncError::UnitCollision {
                        prefix: owner.name.clone(),
                        utility: entry.name.clone(),
                        unit: unit.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn managed(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.has_units)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

fn scan_entry(name: String, dir: PathBuf) -> Result<CatalogEntry, SyncError> {
    let units_dir = dir.join(UNITS_DIR);
    let has_units = units_dir.is_dir();

    let mut service_units = Vec::new();
    let mut timer_units = Vec::new();
    let mut timer_targets = BTreeMap::new();

    if has_units {
        let mut files: Vec<String> = fs::read_dir(&units_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        files.sort();

        for file in files {
            match UnitKind::from_file_name(&file) {
                Some(UnitKind::Service) => service_units.push(file),
                Some(UnitKind::Timer) => {
                    let content = fs::read_to_string(units_dir.join(&file))?;
                    timer_targets.insert(file.clone(), unit_file::timer_target(&file, &content));
                    timer_units.push(file);
                }
                None => debug!(utility = %name, file = %file, "Ignoring non-unit file"),
            }
        }
    }

    let template = dir.join(CONFIG_TEMPLATE);
    let config_template = template.is_file().then_some(template);

    Ok(CatalogEntry {
        name,
        dir,
        has_units,
        service_units,
        timer_units,
        timer_targets,
        config_template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_discovers_units_and_template() {
        let root = tempdir().unwrap();
        write(&root.path().join("alpha/systemd/alpha.service"), "[Service]\n");
        write(&root.path().join("alpha/systemd/alpha.timer"), "[Timer]\n");
        write(&root.path().join("alpha/systemd/README.md"), "docs");
        write(&root.path().join("alpha/.env.example"), "KEY=value\n");
        write(&root.path().join("beta/scripts/run.py"), "");

        let catalog = Catalog::scan(root.path()).unwrap();
        assert_eq!(catalog.entries().len(), 2);

        let alpha = catalog.get("alpha").unwrap();
        assert!(alpha.has_units);
        assert_eq!(alpha.service_units, vec!["alpha.service"]);
        assert_eq!(alpha.timer_units, vec!["alpha.timer"]);
        assert_eq!(alpha.timer_for("alpha.service"), Some("alpha.timer"));
        assert!(alpha.config_template.is_some());

        let beta = catalog.get("beta").unwrap();
        assert!(!beta.has_units);
        assert!(beta.service_units.is_empty());
        assert_eq!(catalog.managed().count(), 1);
    }

    #[test]
    fn test_scan_skips_hidden_and_files() {
        let root = tempdir().unwrap();
        write(&root.path().join(".git/systemd/x.service"), "");
        write(&root.path().join("utilities.conf"), "alpha\n");

        let catalog = Catalog::scan(root.path()).unwrap();
        assert!(catalog.entries().is_empty());
    }

    #[test]
    fn test_scan_rejects_prefix_collision() {
        let root = tempdir().unwrap();
        write(&root.path().join("ping/systemd/ping.service"), "");
        write(&root.path().join("ping-extra/systemd/ping-extra.service"), "");

        let err = Catalog::scan(root.path()).unwrap_err();
        assert!(matches!(err, SyncError::NameCollision { ref short, .. } if short == "ping"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_scan_rejects_unit_named_after_other_utility() {
        let root = tempdir().unwrap();
        write(&root.path().join("api/systemd/api.service"), "");
        write(&root.path().join("web/systemd/api-proxy.service"), "");

        let err = Catalog::scan(root.path()).unwrap_err();
        match &err {
            SyncError::UnitCollision {
                prefix,
                utility,
                unit,
            } => {
                assert_eq!(prefix, "api");
                assert_eq!(utility, "web");
                assert_eq!(unit, "api-proxy.service");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_scan_rejects_unit_declared_twice() {
        let root = tempdir().unwrap();
        write(&root.path().join("api/systemd/shared.service"), "");
        write(&root.path().join("web/systemd/shared.service"), "");

        let err = Catalog::scan(root.path()).unwrap_err();
        assert!(matches!(
            err,
            SyncError::DuplicateUnit { ref unit, ref first, ref second }
                if unit == "shared.service" && first == "api" && second == "web"
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unit_rule_ignores_unmanaged_and_own_prefix() {
        let root = tempdir().unwrap();
        write(&root.path().join("api/systemd/api-worker.service"), "");
        write(&root.path().join("web/systemd/web.service"), "");
        write(&root.path().join("docs/README.md"), "");
        write(&root.path().join("web/systemd/docs-sync.timer"), "[Timer]\n");

        assert!(Catalog::scan(root.path()).is_ok());
    }

    #[test]
    fn test_prefix_rule_ignores_unmanaged() {
        let root = tempdir().unwrap();
        write(&root.path().join("ping/systemd/ping.service"), "");
        write(&root.path().join("ping-docs/README.md"), "");

        assert!(Catalog::scan(root.path()).is_ok());
    }

    #[test]
    fn test_scan_missing_root() {
        let root = tempdir().unwrap();
        let err = Catalog::scan(&root.path().join("absent")).unwrap_err();
        assert!(matches!(err, SyncError::Environment { .. }));
    }
}

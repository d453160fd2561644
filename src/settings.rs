//! Runtime settings and path discovery.
//!
//! Settings are resolved with the precedence CLI flag > environment variable >
//! settings file > built-in default. The settings file is optional JSON, read
//! from `RPU_CONFIG` or [`Settings::DEFAULT_PATH`].

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::catalog::CONFIG_STORE_FILE;

/// Name of the declaration file searched for when locating the install root.
pub const DECLARATION_FILE: &str = "utilities.conf";

/// Default location of installed unit files.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Which service-manager implementation talks to systemd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shell out to `systemctl`
    #[default]
    Systemctl,
    /// Talk to systemd over the system D-Bus
    Dbus,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Systemctl => write!(f, "systemctl"),
            Backend::Dbus => write!(f, "dbus"),
        }
    }
}

/// Contents of the optional settings file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub root: Option<PathBuf>,
    pub declaration: Option<PathBuf>,
    pub unit_dir: Option<PathBuf>,
    pub config_root: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub command_timeout_secs: Option<u64>,
    pub accept_defaults: Option<bool>,
}

impl SettingsFile {
    /// Load from a path. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }
}

/// Values supplied on the command line, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub declaration: Option<PathBuf>,
    pub unit_dir: Option<PathBuf>,
    pub config_root: Option<PathBuf>,
    pub backend: Option<Backend>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Utilities source tree; substituted for `{{INSTALL_DIR}}`.
    pub root: PathBuf,
    /// Declaration of enabled utilities.
    pub declaration: PathBuf,
    /// Init system unit directory.
    pub unit_dir: PathBuf,
    /// Root of the provisioned per-utility config stores.
    pub config_root: PathBuf,
    pub backend: Backend,
    pub command_timeout: Duration,
    pub accept_defaults: bool,
}

impl Settings {
    /// System-wide settings file location.
    pub const DEFAULT_PATH: &'static str = "/etc/rpu/config.json";

    /// Resolve settings from the environment, the settings file and `overrides`.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file_path = std::env::var("RPU_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_PATH));
        let file = SettingsFile::load(&file_path)?;
        debug!(path = %file_path.display(), "Loaded settings file");
        Self::from_sources(overrides, &file)
    }

    fn from_sources(overrides: &Overrides, file: &SettingsFile) -> Result<Self> {
        let root = match pick(&overrides.root, "RPU_ROOT", &file.root) {
            Some(root) => root,
            None => find_root_from_cwd()?,
        };

        let declaration = overrides
            .declaration
            .clone()
            .or_else(|| file.declaration.clone())
            .unwrap_or_else(|| root.join(DECLARATION_FILE));

        let unit_dir = pick(&overrides.unit_dir, "RPU_UNIT_DIR", &file.unit_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIT_DIR));

        let config_root = match pick(&overrides.config_root, "RPU_CONFIG_ROOT", &file.config_root)
        {
            Some(path) => path,
            None => default_config_root()?,
        };

        Ok(Self {
            root,
            declaration,
            unit_dir,
            config_root,
            backend: overrides.backend.or(file.backend).unwrap_or_default(),
            command_timeout: Duration::from_secs(
                file.command_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            accept_defaults: file.accept_defaults.unwrap_or(false),
        })
    }

    /// Build settings rooted at explicit directories, bypassing discovery.
    pub fn with_paths(
        root: impl Into<PathBuf>,
        unit_dir: impl Into<PathBuf>,
        config_root: impl Into<PathBuf>,
    ) -> Self {
        let root = root.into();
        Self {
            declaration: root.join(DECLARATION_FILE),
            root,
            unit_dir: unit_dir.into(),
            config_root: config_root.into(),
            backend: Backend::default(),
            command_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            accept_defaults: false,
        }
    }

    /// Absolute install root, substituted into service units.
    pub fn install_root(&self) -> PathBuf {
        fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    /// Directory holding one utility's provisioned config store.
    pub fn config_dir_for(&self, utility: &str) -> PathBuf {
        self.config_root.join(utility)
    }

    /// Path of one utility's provisioned config store.
    pub fn config_store_for(&self, utility: &str) -> PathBuf {
        self.config_dir_for(utility).join(CONFIG_STORE_FILE)
    }
}

fn pick(flag: &Option<PathBuf>, env: &str, file: &Option<PathBuf>) -> Option<PathBuf> {
    flag.clone()
        .or_else(|| std::env::var(env).ok().map(PathBuf::from))
        .or_else(|| file.clone())
}

/// Walk up from cwd to the first directory containing `utilities.conf`,
/// falling back to cwd itself.
fn find_root_from_cwd() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let mut path = current_dir.as_path();
    loop {
        if path.join(DECLARATION_FILE).is_file() {
            return Ok(path.to_path_buf());
        }
        match path.parent() {
            Some(parent) => path = parent,
            None => break,
        }
    }

    debug!(cwd = %current_dir.display(), "No {} found above cwd", DECLARATION_FILE);
    Ok(current_dir)
}

fn default_config_root() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "rpu")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .context("Could not determine a config directory; set RPU_CONFIG_ROOT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_settings_file_missing_is_empty() {
        let dir = tempdir().unwrap();
        let file = SettingsFile::load(&dir.path().join("none.json")).unwrap();
        assert!(file.root.is_none());
        assert!(file.backend.is_none());
    }

    #[test]
    fn test_settings_file_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"rooot": "/srv"}"#).unwrap();
        assert!(SettingsFile::load(&path).is_err());
    }

    #[test]
    fn test_settings_file_parses_backend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backend": "dbus", "command_timeout_secs": 3}"#).unwrap();
        let file = SettingsFile::load(&path).unwrap();
        assert_eq!(file.backend, Some(Backend::Dbus));
        assert_eq!(file.command_timeout_secs, Some(3));
    }

    #[test]
    #[serial]
    fn test_flag_beats_env_beats_file() {
        let file = SettingsFile {
            root: Some(PathBuf::from("/from/file")),
            unit_dir: Some(PathBuf::from("/file/units")),
            config_root: Some(PathBuf::from("/file/config")),
            ..Default::default()
        };

        // SAFETY: serialised via #[serial]; no other thread reads the environment.
        unsafe { std::env::set_var("RPU_UNIT_DIR", "/env/units") };
        let overrides = Overrides {
            root: Some(PathBuf::from("/from/flag")),
            ..Default::default()
        };
        let settings = Settings::from_sources(&overrides, &file).unwrap();
        unsafe { std::env::remove_var("RPU_UNIT_DIR") };

        assert_eq!(settings.root, PathBuf::from("/from/flag"));
        assert_eq!(settings.unit_dir, PathBuf::from("/env/units"));
        assert_eq!(settings.config_root, PathBuf::from("/file/config"));
        assert_eq!(
            settings.declaration,
            PathBuf::from("/from/flag").join(DECLARATION_FILE)
        );
        assert_eq!(settings.backend, Backend::Systemctl);
    }

    #[test]
    fn test_config_store_path() {
        let settings = Settings::with_paths("/srv/utils", "/etc/systemd/system", "/etc/rpu");
        assert_eq!(
            settings.config_store_for("alpha"),
            PathBuf::from("/etc/rpu/alpha/.env")
        );
    }
}

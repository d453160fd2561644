//! Doctor command implementation.
//!
//! Read-only readiness checks for reconciling this host.

use anyhow::Result;
use nix::unistd::Uid;
use std::path::Path;

use super::ensure_privileged;
use crate::manager;
use crate::output::Output;
use crate::settings::{Overrides, Settings};

struct Check {
    name: &'static str,
    passed: bool,
    message: String,
    fix_hint: Option<String>,
}

fn pass(name: &'static str, message: impl Into<String>) -> Check {
    Check {
        name,
        passed: true,
        message: message.into(),
        fix_hint: None,
    }
}

fn fail(name: &'static str, message: impl Into<String>, fix_hint: impl Into<String>) -> Check {
    Check {
        name,
        passed: false,
        message: message.into(),
        fix_hint: Some(fix_hint.into()),
    }
}

fn check_dir(name: &'static str, path: &Path, fix_hint: &str) -> Check {
    if path.is_dir() {
        pass(name, path.display().to_string())
    } else {
        fail(name, format!("{} does not exist", path.display()), fix_hint)
    }
}

fn check_declaration(path: &Path) -> Check {
    if path.is_file() {
        pass("Declaration", path.display().to_string())
    } else {
        fail(
            "Declaration",
            format!("{} not found; nothing will be enabled", path.display()),
            format!("Create {} with one utility name per line", path.display()),
        )
    }
}

fn check_config_root(path: &Path) -> Check {
    if path.is_dir() {
        return pass("Config root", path.display().to_string());
    }
    match path.ancestors().skip(1).find(|p| p.is_dir()) {
        Some(parent) if ensure_privileged(parent).is_ok() => pass(
            "Config root",
            format!("{} will be created on first provision", path.display()),
        ),
        _ => fail(
            "Config root",
            format!("{} cannot be created", path.display()),
            "Create it or set RPU_CONFIG_ROOT",
        ),
    }
}

fn check_privilege(unit_dir: &Path) -> Check {
    match ensure_privileged(unit_dir) {
        Ok(()) if Uid::effective().is_root() => pass("Privilege", "running as root"),
        Ok(()) => pass("Privilege", format!("{} is writable", unit_dir.display())),
        Err(e) => fail("Privilege", e.to_string(), "Run with sudo"),
    }
}

fn check_backend(settings: &Settings) -> Check {
    let spinner = Output::spinner(format!("Probing {} backend...", settings.backend));
    let probed = manager::connect(settings).and_then(|manager| manager.probe());
    match probed {
        Ok(version) => {
            spinner.finish_success(format!("Backend: {version}"));
            pass("Backend", version)
        }
        Err(e) => {
            spinner.finish_error(format!("Backend: {} unreachable", settings.backend));
            fail(
                "Backend",
                format!("{e:#}"),
                "Is systemd running? Try --backend systemctl",
            )
        }
    }
}

pub fn run(overrides: &Overrides) -> Result<()> {
    let settings = Settings::resolve(overrides)?;

    Output::header("rpu doctor - checking host readiness");

    let checks = vec![
        check_dir(
            "Install root",
            &settings.root,
            "Pass --root or set RPU_ROOT to the utilities checkout",
        ),
        check_declaration(&settings.declaration),
        check_dir(
            "Unit directory",
            &settings.unit_dir,
            "Is systemd installed? Override with --unit-dir",
        ),
        check_config_root(&settings.config_root),
        check_privilege(&settings.unit_dir),
        check_backend(&settings),
    ];

    let mut all_passed = true;
    for check in &checks {
        if check.passed {
            Output::success(format!("{}: {}", check.name, check.message));
        } else {
            Output::error(format!("{}: {}", check.name, check.message));
            if let Some(hint) = &check.fix_hint {
                Output::hint(hint);
            }
            all_passed = false;
        }
    }

    Output::blank();
    if all_passed {
        Output::success("All checks passed. Ready to run rpu sync.");
    } else {
        Output::error("Some checks failed. Fix the issues above before running rpu sync.");
    }
    Ok(())
}

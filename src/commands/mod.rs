//! CLI command implementations.

pub mod completions;
pub mod doctor;
pub mod list;
pub mod logs;
pub mod sync;

use anyhow::Result;
use nix::unistd::{AccessFlags, Uid, access};
use std::path::Path;

use crate::catalog::Catalog;
use crate::desired::DesiredState;
use crate::error::SyncError;
use crate::settings::Settings;

/// Root, or write access to the unit directory.
pub fn ensure_privileged(unit_dir: &Path) -> Result<(), SyncError> {
    if Uid::effective().is_root() || access(unit_dir, AccessFlags::W_OK).is_ok() {
        return Ok(());
    }
    Err(SyncError::Privilege {
        unit_dir: unit_dir.to_path_buf(),
    })
}

/// Read the declaration and scan the catalog.
pub fn load_inputs(settings: &Settings) -> Result<(DesiredState, Catalog)> {
    let desired = DesiredState::load(&settings.declaration)?;
    let catalog = Catalog::scan(&settings.root).map_err(precondition)?;
    Ok((desired, catalog))
}

/// Wrap a run-stopping error so it reads as an abort.
pub fn precondition(err: SyncError) -> anyhow::Error {
    if err.is_fatal() {
        anyhow::Error::new(err).context("aborted: precondition failed")
    } else {
        err.into()
    }
}

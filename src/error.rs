//! Error taxonomy for reconciliation.
//!
//! Only [`SyncError::Privilege`] and the catalog collisions
//! ([`SyncError::NameCollision`], [`SyncError::UnitCollision`],
//! [`SyncError::DuplicateUnit`]) abort a run.
//! Everything else is recorded against the unit or utility it affects and the
//! run carries on.

use std::path::PathBuf;
use thiserror::Error;

use crate::manager::UnitAction;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("must run as root to manage units in {}", unit_dir.display())]
    Privilege { unit_dir: PathBuf },

    #[error("{what} not found at {}", path.display())]
    Environment { what: &'static str, path: PathBuf },

    #[error("failed to {action} {unit}: {reason}")]
    UnitAction {
        action: UnitAction,
        unit: String,
        reason: String,
    },

    #[error(
        "utility name '{short}' is a prefix of '{long}'; unit removal would mix their units up"
    )]
    NameCollision { short: String, long: String },

    #[error(
        "unit '{unit}' of utility '{utility}' starts with utility name '{prefix}'; removing '{prefix}' would take it down"
    )]
    UnitCollision {
        prefix: String,
        utility: String,
        unit: String,
    },

    #[error("unit '{unit}' is declared by both '{first}' and '{second}'")]
    DuplicateUnit {
        unit: String,
        first: String,
        second: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error must stop the run before anything is mutated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Privilege { .. }
                | Self::NameCollision { .. }
                | Self::UnitCollision { .. }
                | Self::DuplicateUnit { .. }
        )
    }
}

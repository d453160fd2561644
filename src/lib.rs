//! rpu - reconcile declared background utilities with systemd
//!
//! A utilities checkout holds one directory per utility, each with optional
//! `systemd/` unit definitions and an optional `.env.example` config
//! template. `utilities.conf` at the root declares which utilities should be
//! running. `rpu sync` converges the host to that declaration:
//!
//! - declared utilities get their config provisioned once, their units
//!   installed, and their timers (or standalone services) enabled and started
//! - every other utility has its installed units stopped, disabled and removed
//! - systemd is reloaded exactly once, and only if something changed
//!
//! `rpu sync --status` reports the same view without touching anything.
//!
//! Live state is always reached through [`manager::ServiceManager`], so the
//! reconciliation core runs unchanged against `systemctl`, D-Bus or the
//! in-memory [`manager::MemoryManager`].

pub mod catalog;
pub mod cli;
pub mod command_runner;
pub mod commands;
pub mod desired;
pub mod error;
pub mod installer;
pub mod logs;
pub mod manager;
pub mod output;
pub mod plan;
pub mod provision;
pub mod reconcile;
pub mod settings;
pub mod status;
pub mod unit_file;

pub use cli::{Cli, Commands};
pub use error::SyncError;

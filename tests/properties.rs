//! Property-based tests for declaration parsing, the prefix rule and
//! reconciliation idempotence.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use rpu::catalog::{Catalog, CatalogEntry};
use rpu::desired::DesiredState;
use rpu::installer::installed_units;
use rpu::manager::MemoryManager;
use rpu::plan::ExecuteContext;
use rpu::provision::DefaultsPrompter;
use rpu::reconcile::SyncCommand;
use rpu::settings::Settings;
use rpu::SyncError;

const NAMES: [&str; 4] = ["alpha", "bravo", "charlie", "delta"];

/// Generate a valid utility name (alphanumeric + dashes/underscores).
fn utility_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}"
}

/// A declaration line: bare name, name with a trailing comment, or noise.
fn line_strategy() -> impl Strategy<Value = (Option<String>, String)> {
    prop_oneof![
        utility_name_strategy().prop_map(|n| (Some(n.clone()), n)),
        (utility_name_strategy(), "[ a-z]{0,10}")
            .prop_map(|(n, c)| (Some(n.clone()), format!("  {n}\t# {c}"))),
        "[ a-z]{0,10}".prop_map(|c| (None, format!("# {c}"))),
        Just((None, String::new())),
    ]
}

fn managed_entry(name: &str) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        dir: PathBuf::from("/srv").join(name),
        has_units: true,
        service_units: vec![format!("{name}.service")],
        timer_units: Vec::new(),
        timer_targets: BTreeMap::new(),
        config_template: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn declaration_parses_exactly_the_named_lines(lines in prop::collection::vec(line_strategy(), 0..20)) {
        let content: String = lines.iter().map(|(_, l)| format!("{l}\n")).collect();
        let expected: BTreeSet<String> = lines.into_iter().filter_map(|(n, _)| n).collect();

        let desired = DesiredState::parse(&content);
        let parsed: BTreeSet<String> = desired.names().map(str::to_string).collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn duplicate_declarations_collapse(name in utility_name_strategy(), copies in 1usize..5) {
        let content = format!("{name}\n").repeat(copies);
        prop_assert_eq!(DesiredState::parse(&content).len(), 1);
    }

    #[test]
    fn catalog_rejects_exactly_prefix_collisions(names in prop::collection::btree_set(utility_name_strategy(), 1..8)) {
        let has_prefix_pair = names
            .iter()
            .any(|a| names.iter().any(|b| a != b && b.starts_with(a.as_str())));

        let entries = names.iter().map(|n| managed_entry(n)).collect();
        match Catalog::from_entries(entries) {
            Ok(_) => prop_assert!(!has_prefix_pair),
            Err(SyncError::NameCollision { short, long }) => {
                prop_assert!(has_prefix_pair);
                prop_assert!(long.starts_with(short.as_str()));
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reconciling_twice_mutates_nothing_the_second_time(
        timers in prop::collection::vec(any::<bool>(), NAMES.len()),
        first in prop::collection::vec(any::<bool>(), NAMES.len()),
        second in prop::collection::vec(any::<bool>(), NAMES.len()),
    ) {
        let root = tempfile::tempdir().unwrap();
        let units = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        for (name, has_timer) in NAMES.iter().zip(&timers) {
            let dir = root.path().join(name).join("systemd");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{name}.service")), "[Service]\nExecStart={{INSTALL_DIR}}/run\n").unwrap();
            if *has_timer {
                fs::write(dir.join(format!("{name}.timer")), "[Timer]\nOnBootSec=1h\n").unwrap();
            }
        }
        let settings = Settings::with_paths(root.path(), units.path(), config.path());
        let manager = MemoryManager::new();

        let sync = |declared: &[bool]| {
            let desired: DesiredState = NAMES
                .iter()
                .zip(declared)
                .filter(|(_, on)| **on)
                .map(|(n, _)| *n)
                .collect();
            let command = SyncCommand::new(desired, Catalog::scan(root.path()).unwrap());
            let mut ctx = ExecuteContext::new(&settings, &manager, &DefaultsPrompter);
            command.run(&mut ctx).unwrap()
        };

        sync(&first);
        sync(&second);
        manager.clear_calls();
        let report = sync(&second);

        prop_assert!(report.results.is_empty());
        prop_assert!(manager.mutations().is_empty());

        for ((name, on), has_timer) in NAMES.iter().zip(&second).zip(&timers) {
            let installed = installed_units(units.path(), |u| u.starts_with(name)).unwrap();
            if *on {
                let service = manager.peek(&format!("{name}.service"));
                prop_assert!(service.is_enabled());
                prop_assert_eq!(service.is_active(), !*has_timer);
                prop_assert_eq!(installed.len(), if *has_timer { 2 } else { 1 });
            } else {
                prop_assert!(installed.is_empty());
            }
        }
    }
}

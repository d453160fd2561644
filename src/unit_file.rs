//! Minimal reader for systemd unit files.
//!
//! systemd units use INI-style format with sections like `[Unit]`,
//! `[Service]`, `[Install]`, `[Timer]`.

use std::collections::BTreeMap;

/// Unit file suffixes managed by rpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Service,
    Timer,
}

impl UnitKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            UnitKind::Service => ".service",
            UnitKind::Timer => ".timer",
        }
    }

    /// Classify a unit file name by suffix.
    pub fn from_file_name(name: &str) -> Option<Self> {
        [UnitKind::Service, UnitKind::Timer]
            .into_iter()
            .find(|kind| name.ends_with(kind.suffix()))
    }
}

/// Parsed systemd unit file.
#[derive(Debug, Clone, Default)]
pub struct SystemdUnit {
    /// Section name -> property -> value. Repeated keys keep the last value.
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl SystemdUnit {
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|props| props.get(key))
            .map(String::as_str)
    }
}

/// Parse systemd unit content into structured form.
pub fn parse(content: &str) -> SystemdUnit {
    let mut unit = SystemdUnit::default();
    let mut current_section = String::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            current_section = line[1..line.len() - 1].to_string();
            unit.sections.entry(current_section.clone()).or_default();
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            if !current_section.is_empty() {
                unit.sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    unit
}

/// The service a timer activates: its `Unit=` setting, else the same stem.
pub fn timer_target(timer_name: &str, content: &str) -> String {
    if let Some(target) = parse(content).get("Timer", "Unit") {
        return target.to_string();
    }
    let stem = timer_name.strip_suffix(".timer").unwrap_or(timer_name);
    format!("{stem}.service")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMER: &str = "\
[Unit]
Description=Ping every three days

[Timer]
OnCalendar=*-*-1/3 04:00:00
Persistent=true

[Install]
WantedBy=timers.target
";

    #[test]
    fn test_parse_sections() {
        let unit = parse(TIMER);
        assert_eq!(unit.get("Timer", "Persistent"), Some("true"));
        assert_eq!(unit.get("Install", "WantedBy"), Some("timers.target"));
        assert_eq!(unit.get("Service", "ExecStart"), None);
    }

    #[test]
    fn test_timer_target_defaults_to_stem() {
        assert_eq!(timer_target("alpha.timer", TIMER), "alpha.service");
    }

    #[test]
    fn test_timer_target_honours_unit_setting() {
        let content = "[Timer]\nOnBootSec=5min\nUnit=alpha-worker.service\n";
        assert_eq!(timer_target("alpha.timer", content), "alpha-worker.service");
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(UnitKind::from_file_name("a.service"), Some(UnitKind::Service));
        assert_eq!(UnitKind::from_file_name("a.timer"), Some(UnitKind::Timer));
        assert_eq!(UnitKind::from_file_name("a.socket"), None);
    }
}

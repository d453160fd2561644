//! Desired-state loader for `utilities.conf`.
//!
//! The declaration is line oriented: blank lines and `#` comments are
//! ignored, trailing `# ...` comments are stripped, and any other line names
//! one utility to enable.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Set of utility names declared enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    names: BTreeSet<String>,
    /// False when the declaration file did not exist.
    found: bool,
}

impl DesiredState {
    /// Load the declaration at `path`.
    ///
    /// A missing file is not an error: it means nothing is enabled.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Declaration not found; treating every utility as disabled");
                Ok(Self::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read declaration from {}", path.display())),
        }
    }

    /// Parse declaration text.
    pub fn parse(content: &str) -> Self {
        let mut names = BTreeSet::new();

        for (index, raw) in content.lines().enumerate() {
            let line = match raw.split_once('#') {
                Some((before, _comment)) => before,
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace();
            if let Some(name) = tokens.next() {
                if tokens.next().is_some() {
                    warn!(line = index + 1, "Ignoring extra words after '{}'", name);
                }
                names.insert(name.to_string());
            }
        }

        Self { names, found: true }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether the declaration file existed.
    pub fn was_found(&self) -> bool {
        self.found
    }
}

impl<S: Into<String>> FromIterator<S> for DesiredState {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
            found: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_skips_blank_and_comments() {
        let desired = DesiredState::parse(
            "# Enabled utilities\n\
             \n\
             supabase-keepalive\n\
             #status-dashboard\n",
        );
        assert_eq!(desired.len(), 1);
        assert!(desired.contains("supabase-keepalive"));
        assert!(!desired.contains("status-dashboard"));
    }

    #[test]
    fn test_parse_strips_trailing_comment() {
        let desired = DesiredState::parse("alpha   # pings every 3 days\n");
        assert!(desired.contains("alpha"));
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_parse_collapses_duplicates() {
        let desired = DesiredState::parse("alpha\nalpha\n  alpha  \n");
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_parse_handles_crlf() {
        let desired = DesiredState::parse("alpha\r\nbeta\r\n");
        assert!(desired.contains("alpha"));
        assert!(desired.contains("beta"));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        let desired = DesiredState::load(&dir.path().join("utilities.conf")).unwrap();
        assert!(desired.is_empty());
        assert!(!desired.was_found());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("utilities.conf");
        fs::write(&path, "alpha\n").unwrap();
        let desired = DesiredState::load(&path).unwrap();
        assert!(desired.was_found());
        assert_eq!(desired.names().collect::<Vec<_>>(), vec!["alpha"]);
    }
}

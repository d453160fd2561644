//! First-time provisioning of a utility's `.env` config store.
//!
//! The template is copied line by line. Every `KEY=default` line is replaced
//! with `KEY=<answer>`, where the answer comes from a [`Prompter`]; everything
//! else (blank lines, comments, lines of unknown shape) is copied verbatim.
//! An existing store is never touched.

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use tracing::{info, warn};

/// One `KEY=value` line of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigVariable {
    pub key: String,
    pub default_value: String,
    /// Comment lines directly above the variable, `#` stripped.
    pub preceding_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateLine {
    Verbatim(String),
    Variable(ConfigVariable),
}

/// Parse a template into ordered lines.
pub fn parse_template(content: &str) -> Vec<TemplateLine> {
    let mut lines = Vec::new();
    let mut comment: Vec<String> = Vec::new();

    for raw in content.lines() {
        let trimmed = raw.trim();

        if trimmed.starts_with('#') {
            comment.push(trimmed.trim_start_matches('#').trim().to_string());
            lines.push(TemplateLine::Verbatim(raw.to_string()));
            continue;
        }

        match parse_assignment(trimmed) {
            Some((key, value)) => {
                let preceding_comment = (!comment.is_empty()).then(|| comment.join(" "));
                lines.push(TemplateLine::Variable(ConfigVariable {
                    key: key.to_string(),
                    default_value: value.to_string(),
                    preceding_comment,
                }));
            }
            None => lines.push(TemplateLine::Verbatim(raw.to_string())),
        }
        comment.clear();
    }

    lines
}

/// `KEY=value` where `KEY` matches `[A-Za-z_][A-Za-z0-9_]*`.
fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value))
}

/// Source of answers for template variables.
pub trait Prompter {
    /// Called once before the first variable of a utility.
    fn begin(&self, _utility: &str) -> Result<()> {
        Ok(())
    }

    /// Answer for `variable`; an empty answer accepts the default.
    fn ask(&self, utility: &str, variable: &ConfigVariable) -> Result<String>;

    fn finish(&self, _utility: &str) -> Result<()> {
        Ok(())
    }
}

/// Accepts every template default without asking.
pub struct DefaultsPrompter;

impl Prompter for DefaultsPrompter {
    fn ask(&self, _utility: &str, _variable: &ConfigVariable) -> Result<String> {
        Ok(String::new())
    }
}

/// Asks on the terminal with cliclack.
pub struct InteractivePrompter;

impl Prompter for InteractivePrompter {
    fn begin(&self, utility: &str) -> Result<()> {
        cliclack::intro(format!("Configure {utility}"))?;
        Ok(())
    }

    fn ask(&self, _utility: &str, variable: &ConfigVariable) -> Result<String> {
        if let Some(comment) = &variable.preceding_comment {
            cliclack::log::remark(comment)?;
        }
        let answer: String = cliclack::input(&variable.key)
            .placeholder(&variable.default_value)
            .required(false)
            .interact()
            .with_context(|| format!("Failed to read a value for {}", variable.key))?;
        Ok(answer)
    }

    fn finish(&self, utility: &str) -> Result<()> {
        cliclack::outro(format!("Saved configuration for {utility}"))?;
        Ok(())
    }
}

/// Pick the prompter for this invocation.
///
/// Without a terminal there is nobody to answer, so defaults are used.
pub fn prompter_for(accept_defaults: bool) -> Box<dyn Prompter> {
    if accept_defaults {
        return Box::new(DefaultsPrompter);
    }
    if !std::io::stdin().is_terminal() {
        warn!("stdin is not a terminal; provisioning with template defaults");
        return Box::new(DefaultsPrompter);
    }
    Box::new(InteractivePrompter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Provisioned,
    /// The store already exists.
    SkippedExisting,
    /// The utility has no template.
    SkippedNoTemplate,
}

/// Provision `dest` from `template` unless either precondition rules it out.
pub fn provision(
    utility: &str,
    template: &Path,
    dest: &Path,
    prompter: &dyn Prompter,
) -> Result<ProvisionOutcome> {
    if dest.exists() {
        return Ok(ProvisionOutcome::SkippedExisting);
    }
    if !template.is_file() {
        return Ok(ProvisionOutcome::SkippedNoTemplate);
    }

    let content = fs::read_to_string(template)
        .with_context(|| format!("Failed to read template {}", template.display()))?;
    let lines = parse_template(&content);

    let mut draft = String::new();
    let mut asked = false;
    for line in &lines {
        match line {
            TemplateLine::Verbatim(text) => draft.push_str(text),
            TemplateLine::Variable(variable) => {
                if !asked {
                    prompter.begin(utility)?;
                    asked = true;
                }
                let answer = prompter.ask(utility, variable)?;
                let answer = answer.trim();
                let value = if answer.is_empty() {
                    variable.default_value.as_str()
                } else {
                    answer
                };
                draft.push_str(&format!("{}={}", variable.key, value));
            }
        }
        draft.push('\n');
    }

    write_private(dest, &draft)?;
    if asked {
        prompter.finish(utility)?;
    }
    info!(utility, path = %dest.display(), "Provisioned config");
    Ok(ProvisionOutcome::Provisioned)
}

/// Atomically write `content` to `dest` readable by the owner only.
fn write_private(dest: &Path, content: &str) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("{} has no parent directory", dest.display()))?;
    // Only the per-utility directory is private; the config root keeps the umask.
    if let Some(config_root) = parent.parent() {
        fs::create_dir_all(config_root)
            .with_context(|| format!("Failed to create {}", config_root.display()))?;
    }
    match fs::DirBuilder::new().mode(0o700).create(parent) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to create {}", parent.display()));
        }
    }

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct Answers(HashMap<&'static str, &'static str>);

    impl Prompter for Answers {
        fn ask(&self, _utility: &str, variable: &ConfigVariable) -> Result<String> {
            Ok(self.0.get(variable.key.as_str()).unwrap_or(&"").to_string())
        }
    }

    const TEMPLATE: &str = "\
# Supabase project
SUPABASE_URL=https://example.supabase.co
SUPABASE_KEY=

export WEIRD LINE
PORT=8080
";

    #[test]
    fn test_parse_template_keeps_order_and_comments() {
        let lines = parse_template(TEMPLATE);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], TemplateLine::Verbatim("# Supabase project".into()));
        match &lines[1] {
            TemplateLine::Variable(v) => {
                assert_eq!(v.key, "SUPABASE_URL");
                assert_eq!(v.default_value, "https://example.supabase.co");
                assert_eq!(v.preceding_comment.as_deref(), Some("Supabase project"));
            }
            other => panic!("expected variable, got {other:?}"),
        }
        match &lines[2] {
            TemplateLine::Variable(v) => assert!(v.preceding_comment.is_none()),
            other => panic!("expected variable, got {other:?}"),
        }
        assert_eq!(lines[4], TemplateLine::Verbatim("export WEIRD LINE".into()));
    }

    #[test]
    fn test_parse_assignment_key_rules() {
        assert!(parse_assignment("_A1=x").is_some());
        assert!(parse_assignment("1A=x").is_none());
        assert!(parse_assignment("A-B=x").is_none());
        assert!(parse_assignment("=x").is_none());
        assert_eq!(parse_assignment("A=b=c"), Some(("A", "b=c")));
    }

    #[test]
    fn test_empty_answer_keeps_default() {
        let dir = tempdir().unwrap();
        let template = dir.path().join(".env.example");
        fs::write(&template, "PORT=8080\n").unwrap();
        let dest = dir.path().join("store/alpha/.env");

        let outcome = provision("alpha", &template, &dest, &DefaultsPrompter).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Provisioned);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "PORT=8080\n");
    }

    #[test]
    fn test_answer_replaces_default() {
        let dir = tempdir().unwrap();
        let template = dir.path().join(".env.example");
        fs::write(&template, TEMPLATE).unwrap();
        let dest = dir.path().join("alpha/.env");

        let answers = Answers(HashMap::from([("PORT", "9090"), ("SUPABASE_KEY", "secret")]));
        provision("alpha", &template, &dest, &answers).unwrap();

        let written = fs::read_to_string(&dest).unwrap();
        assert_eq!(
            written,
            "# Supabase project\n\
             SUPABASE_URL=https://example.supabase.co\n\
             SUPABASE_KEY=secret\n\
             \n\
             export WEIRD LINE\n\
             PORT=9090\n"
        );
    }

    #[test]
    fn test_store_is_owner_only() {
        let dir = tempdir().unwrap();
        let template = dir.path().join(".env.example");
        fs::write(&template, "A=1\n").unwrap();
        let dest = dir.path().join("alpha/.env");

        provision("alpha", &template, &dest, &DefaultsPrompter).unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = fs::metadata(dest.parent().unwrap()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn test_config_root_keeps_default_mode() {
        let dir = tempdir().unwrap();
        let template = dir.path().join(".env.example");
        fs::write(&template, "A=1\n").unwrap();
        let reference = dir.path().join("reference");
        fs::create_dir(&reference).unwrap();
        let dest = dir.path().join("config/alpha/.env");

        provision("alpha", &template, &dest, &DefaultsPrompter).unwrap();

        let mode_of = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode_of(&dir.path().join("config")), mode_of(&reference));
        assert_eq!(mode_of(dest.parent().unwrap()), 0o700);
    }

    #[test]
    fn test_existing_store_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let template = dir.path().join(".env.example");
        fs::write(&template, "PORT=8080\n").unwrap();
        let dest = dir.path().join(".env");
        fs::write(&dest, "PORT=1\n").unwrap();

        let answers = Answers(HashMap::from([("PORT", "9090")]));
        let outcome = provision("alpha", &template, &dest, &answers).unwrap();
        assert_eq!(outcome, ProvisionOutcome::SkippedExisting);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "PORT=1\n");
    }

    #[test]
    fn test_missing_template_is_skipped() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join(".env");
        let outcome =
            provision("alpha", &dir.path().join("none"), &dest, &DefaultsPrompter).unwrap();
        assert_eq!(outcome, ProvisionOutcome::SkippedNoTemplate);
        assert!(!dest.exists());
    }
}

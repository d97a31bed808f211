//! Run configuration loaded from a flat `key = value` file.
//!
//! The whole run is driven by one configuration file read once at startup
//! (missing file is fatal). Lists (`repository`, `exclude`) are
//! whitespace-separated, matching what the backup scripts themselves declare.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vaultrun.conf";

/// Default directory scanned for backup scripts.
pub const DEFAULT_SCRIPTS_DIR: &str = "/etc/vaultrun.d";

/// Default engine binary.
pub const DEFAULT_ENGINE_BIN: &str = "restic";

/// Default retention count when `keep_last` is not configured.
pub const DEFAULT_KEEP_LAST: u32 = 7;

/// Settings for one orchestrator run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Credential file handed to the engine (`--password-file`).
    pub password_file: PathBuf,
    /// Global default repositories, used by scripts that declare none.
    pub repositories: Vec<String>,
    /// Exclude patterns applied to every backup invocation.
    pub excludes: Vec<String>,
    /// Retention policy: keep the last N snapshots per repository.
    pub keep_last: u32,
    /// Notification address; `None` falls back to stdout delivery.
    pub mail_to: Option<String>,
    /// Directory holding the executable backup scripts.
    pub scripts_dir: PathBuf,
    /// Engine binary name or path.
    pub engine_bin: String,
}

impl Settings {
    /// Load settings from a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let settings = Self::parse(&content)
            .with_context(|| format!("Failed to parse configuration {:?}", path.as_ref()))?;

        Ok(settings)
    }

    /// Parse `key = value` lines. Unknown keys are rejected so typos
    /// (e.g. `excludes` for `exclude`) surface at startup instead of being
    /// silently ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut password_file: Option<PathBuf> = None;
        let mut repositories: Vec<String> = Vec::new();
        let mut excludes: Vec<String> = Vec::new();
        let mut keep_last = DEFAULT_KEEP_LAST;
        let mut mail_to: Option<String> = None;
        let mut scripts_dir = PathBuf::from(DEFAULT_SCRIPTS_DIR);
        let mut engine_bin = DEFAULT_ENGINE_BIN.to_string();

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("Line {}: expected 'key = value'", lineno + 1))?;
            let key = key.trim();
            let value = unquote(value.trim());

            match key {
                "password_file" => password_file = Some(PathBuf::from(value)),
                "repository" => {
                    repositories = value.split_whitespace().map(String::from).collect()
                }
                "exclude" => excludes = value.split_whitespace().map(String::from).collect(),
                "keep_last" => {
                    keep_last = value.parse().with_context(|| {
                        format!("Line {}: keep_last must be an integer", lineno + 1)
                    })?
                }
                "mail_to" => {
                    mail_to = if value.is_empty() {
                        None
                    } else {
                        Some(value.to_string())
                    }
                }
                "scripts_dir" => scripts_dir = PathBuf::from(value),
                "engine_bin" => engine_bin = value.to_string(),
                other => anyhow::bail!("Line {}: unknown key '{}'", lineno + 1, other),
            }
        }

        let password_file =
            password_file.ok_or_else(|| anyhow::anyhow!("Missing required key 'password_file'"))?;

        Ok(Self {
            password_file,
            repositories,
            excludes,
            keep_last,
            mail_to,
            scripts_dir,
            engine_bin,
        })
    }

    /// Validate the settings.
    ///
    /// Run before any engine invocation so a broken configuration aborts the
    /// run up front instead of halfway through the script sequence.
    pub fn validate(&self) -> Result<()> {
        if !self.password_file.is_file() {
            anyhow::bail!(
                "Credential file does not exist: {}",
                self.password_file.display()
            );
        }
        if self.repositories.is_empty() {
            anyhow::bail!("At least one default repository must be configured");
        }
        if self.keep_last == 0 {
            anyhow::bail!("keep_last must be at least 1");
        }
        Ok(())
    }
}

/// Strip one pair of matching surrounding quotes, if present.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

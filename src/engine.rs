//! Backup engine adapter.
//!
//! The engine (restic or compatible) does all the real work: transfer,
//! dedup, encryption, retention. vaultrun only ever builds typed argument
//! lists and runs the binary; it never touches backup content. The trait
//! exists so the run coordinator can be exercised against a recording
//! double in tests.
//!
//! Dry-run suppression of mutating operations happens in the callers, before
//! this adapter is reached. Implementations here always invoke the binary.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use log::debug;

use crate::config::Settings;
use crate::error::{Result, VaultrunError};
use crate::process_guard::run_tracked;

/// Operations consumed from the backup engine.
pub trait Engine {
    /// Whether the repository already exists and is reachable. Read-only.
    fn check_initialized(&self, repo: &str) -> Result<bool>;

    /// Create the repository. Mutating.
    fn init(&self, repo: &str) -> Result<()>;

    /// Back up `files` to `repo` with the given exclude patterns. Mutating.
    fn backup(&self, repo: &str, files: &[String], excludes: &[String]) -> Result<()>;

    /// Raw statistics text for the repository. Read-only.
    fn stats(&self, repo: &str) -> Result<String>;

    /// Apply the keep-last-N retention policy and prune. Mutating.
    fn forget(&self, repo: &str, keep_last: u32) -> Result<()>;
}

/// Engine adapter invoking a restic-style binary.
pub struct ResticEngine {
    bin: String,
    password_file: PathBuf,
}

impl ResticEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            bin: settings.engine_bin.clone(),
            password_file: settings.password_file.clone(),
        }
    }

    /// Verify the engine binary exists before starting a run. A missing tool
    /// is a fatal configuration error, not something to discover per script.
    pub fn preflight(&self) -> Result<()> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = run_tracked(&mut cmd, &format!("engine binary '{}'", self.bin))
            .map_err(|e| VaultrunError::engine(e.to_string()))?;
        if !output.status.success() {
            return Err(VaultrunError::engine(format!(
                "'{} version' failed: {}",
                self.bin,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn base_command(&self, repo: &str) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--repo")
            .arg(repo)
            .arg("--password-file")
            .arg(&self.password_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<Output> {
        debug!("Engine invocation: {:?}", cmd);
        run_tracked(&mut cmd, what)
    }

    fn ensure_success(output: &Output, what: &str) -> Result<()> {
        if output.status.success() {
            Ok(())
        } else {
            Err(VaultrunError::engine(format!(
                "{} failed (exit code {}): {}",
                what,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl Engine for ResticEngine {
    fn check_initialized(&self, repo: &str) -> Result<bool> {
        // `cat config` succeeds only against an existing repository
        let mut cmd = self.base_command(repo);
        cmd.arg("cat").arg("config");
        let output = self.run(cmd, "repository check")?;
        Ok(output.status.success())
    }

    fn init(&self, repo: &str) -> Result<()> {
        let mut cmd = self.base_command(repo);
        cmd.arg("init");
        let output = self.run(cmd, "repository init")?;
        Self::ensure_success(&output, &format!("init of {}", repo))
    }

    fn backup(&self, repo: &str, files: &[String], excludes: &[String]) -> Result<()> {
        let mut cmd = self.base_command(repo);
        cmd.arg("backup");
        for pattern in excludes {
            cmd.arg("--exclude").arg(pattern);
        }
        cmd.args(files);
        let output = self.run(cmd, "backup")?;
        Self::ensure_success(&output, &format!("backup to {}", repo))
    }

    fn stats(&self, repo: &str) -> Result<String> {
        let mut cmd = self.base_command(repo);
        cmd.arg("stats");
        let output = self.run(cmd, "stats")?;
        Self::ensure_success(&output, &format!("stats for {}", repo))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn forget(&self, repo: &str, keep_last: u32) -> Result<()> {
        let mut cmd = self.base_command(repo);
        cmd.arg("forget")
            .arg("--keep-last")
            .arg(keep_last.to_string())
            .arg("--prune");
        let output = self.run(cmd, "forget")?;
        Self::ensure_success(&output, &format!("forget on {}", repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(bin: &str) -> Settings {
        Settings {
            password_file: PathBuf::from("/tmp/pass"),
            repositories: vec!["repoA".to_string()],
            excludes: vec![],
            keep_last: 7,
            mail_to: None,
            scripts_dir: PathBuf::from("/tmp"),
            engine_bin: bin.to_string(),
        }
    }

    #[test]
    fn test_preflight_missing_binary() {
        let engine = ResticEngine::new(&test_settings("/nonexistent/engine-xyz"));
        assert!(engine.preflight().is_err());
    }

    #[test]
    fn test_preflight_with_stand_in_binary() {
        // Any binary answering `version` with status 0 passes preflight
        let engine = ResticEngine::new(&test_settings("true"));
        assert!(engine.preflight().is_ok());
    }

    #[test]
    fn test_engine_failure_carries_stderr() {
        // `false` ignores its arguments and exits 1
        let engine = ResticEngine::new(&test_settings("false"));
        let err = engine.init("repoA").unwrap_err();
        assert!(err.to_string().contains("init of repoA"));
    }
}

//! Run-level error accumulation and report formatting.

use std::time::Duration;

use crate::engine::Engine;
use crate::error::Result;

/// Append-only accumulator of failure messages for the current run.
///
/// Threaded explicitly through every step rather than living in process-wide
/// state. One recorded entry makes the whole run a failure; entries are
/// surfaced together, once, in the final notification.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    entries: Vec<String>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure attributed to `scope` (script basename, repository,
    /// or run step).
    pub fn record(&mut self, scope: &str, detail: &str) {
        log::error!("{}: {}", scope, detail);
        self.entries.push(format!("{}: {}", scope, detail));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Newline-joined log for the notification body.
    pub fn to_report(&self) -> String {
        self.entries.join("\n")
    }
}

/// Formats per-repository statistics blocks via the engine.
pub struct Reporter<'a, E: Engine + ?Sized> {
    engine: &'a E,
}

impl<'a, E: Engine + ?Sized> Reporter<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// One `stats` call per repository, blocks separated by a blank line.
    ///
    /// Stats retrieval is read-only and runs under dry-run too. Unlike
    /// backup failures, a stats failure here is fatal to the run, so it
    /// propagates instead of being recorded.
    pub fn stats_blocks(&self, repos: &[String]) -> Result<String> {
        let mut blocks = Vec::with_capacity(repos.len());
        for repo in repos {
            let stats = self.engine.stats(repo)?;
            blocks.push(format!("Backup stats for {}: {}", repo, stats));
        }
        Ok(blocks.join("\n\n"))
    }
}

/// Wall-clock duration as `HH:MM:SS`.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

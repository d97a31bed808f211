//! Top-level run sequencing.
//!
//! One invocation = one fully sequential pass: enumerate scripts, drive each
//! through its hook lifecycle, then report, retention, and the final
//! notification over every aggregated repository. Recorded errors never stop
//! the pass; they make the exit code non-zero at the end. Fatal errors
//! (missing named script, unreadable scripts directory, stats failure) abort,
//! but still send the notification with whatever was logged so far,
//! best-effort.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::aggregate::{RepoFilter, RepositoryAggregator};
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::{Result, VaultrunError};
use crate::hooks::{self, HookRunner, ScriptDescriptor};
use crate::notify::Notify;
use crate::registry::ScriptRegistry;
use crate::report::{format_duration, ErrorCollector, Reporter};

/// Outcome of a full backup run. The run "completed" even when errors were
/// recorded; the caller turns a non-empty collector into exit code 1.
#[derive(Debug)]
pub struct RunSummary {
    pub errors: ErrorCollector,
    pub scripts_run: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives a whole orchestrator run against an engine and a notifier.
pub struct RunCoordinator<'a, E: Engine + ?Sized, N: Notify + ?Sized> {
    settings: &'a Settings,
    engine: &'a E,
    notifier: &'a N,
    dry_run: bool,
}

impl<'a, E: Engine + ?Sized, N: Notify + ?Sized> RunCoordinator<'a, E, N> {
    pub fn new(settings: &'a Settings, engine: &'a E, notifier: &'a N, dry_run: bool) -> Self {
        Self {
            settings,
            engine,
            notifier,
            dry_run,
        }
    }

    /// Run the backup sequence for all scripts, or one named script.
    pub fn run_backup(&self, script_filter: Option<&str>) -> Result<RunSummary> {
        let start = Instant::now();
        let registry = ScriptRegistry::new(&self.settings.scripts_dir);

        // A named script that does not exist is fatal; checked before any
        // hook runs so a typo cannot half-execute a run.
        if let Some(name) = script_filter {
            if let Err(e) = registry.discover(Some(name)) {
                self.send_fatal_notification(&ErrorCollector::new(), &e);
                return Err(e);
            }
        }

        let mut errors = ErrorCollector::new();

        // Every script's top level is evaluated exactly once per run, here.
        // Both the backup pass and the aggregation below reuse these
        // descriptors. An unreadable scripts directory is fatal.
        let descriptors = match self.load_descriptors(&registry, &mut errors) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                self.send_fatal_notification(&errors, &e);
                return Err(e);
            }
        };

        let runner = HookRunner::new(
            self.engine,
            &self.settings.excludes,
            &self.settings.repositories,
            self.dry_run,
        );
        let mut scripts_run = 0;
        for script in descriptors
            .iter()
            .filter(|d| script_filter.map_or(true, |name| d.name == name))
        {
            runner.run_script(script, &mut errors);
            scripts_run += 1;
        }

        let aggregator = RepositoryAggregator::new(&self.settings.repositories, &descriptors);
        let repos = aggregator.collect(&RepoFilter::All);

        // Stats failure is fatal, unlike backup failures
        let reporter = Reporter::new(self.engine);
        let blocks = match reporter.stats_blocks(&repos) {
            Ok(blocks) => blocks,
            Err(e) => {
                errors.record("report", &e.to_string());
                self.send_fatal_notification(&errors, &e);
                return Err(e);
            }
        };

        let elapsed = start.elapsed();
        let body = format!("Backup complete in {}.\n\n{}", format_duration(elapsed), blocks);

        self.run_retention(&repos, &mut errors);

        let subject = if errors.is_empty() {
            "vaultrun: backup complete".to_string()
        } else {
            format!("vaultrun: backup finished with {} error(s)", errors.len())
        };
        let full_body = if errors.is_empty() {
            body
        } else {
            format!("{}\n\nErrors:\n{}", body, errors.to_report())
        };
        if let Err(e) = self.notifier.send(&subject, &full_body) {
            warn!("Failed to send notification: {}", e);
        }

        Ok(RunSummary {
            errors,
            scripts_run,
            elapsed,
        })
    }

    /// Initialize one repository, or all configured defaults.
    ///
    /// A repository that already answers the existence check is reported and
    /// treated as a failure, and no mutating call is issued for it.
    pub fn run_init(&self, repo: Option<&str>) -> Result<()> {
        let repos: Vec<String> = match repo {
            Some(r) => vec![r.to_string()],
            None => self.settings.repositories.clone(),
        };

        for repo in &repos {
            if self.engine.check_initialized(repo)? {
                return Err(VaultrunError::engine(format!(
                    "Repository {} is already initialized",
                    repo
                )));
            }
            if self.dry_run {
                info!("[dry-run] would initialize {}", repo);
                continue;
            }
            self.engine.init(repo)?;
            info!("Initialized repository {}", repo);
        }
        Ok(())
    }

    /// Statistics report for one repository or for all known repositories.
    pub fn run_report(&self, repo: Option<&str>) -> Result<String> {
        let filter = match repo {
            Some(r) => RepoFilter::One(r.to_string()),
            None => RepoFilter::All,
        };

        let descriptors = if filter == RepoFilter::All {
            let registry = ScriptRegistry::new(&self.settings.scripts_dir);
            let mut loaded = Vec::new();
            for path in registry.discover(None)? {
                loaded.push(hooks::load_descriptor(&path)?);
            }
            loaded
        } else {
            Vec::new()
        };

        let aggregator = RepositoryAggregator::new(&self.settings.repositories, &descriptors);
        let repos = aggregator.collect(&filter);
        Reporter::new(self.engine).stats_blocks(&repos)
    }

    /// Load descriptors for every discovered script. A script whose top level
    /// fails to source is recorded and left out; it neither runs nor
    /// contributes repositories.
    fn load_descriptors(
        &self,
        registry: &ScriptRegistry,
        errors: &mut ErrorCollector,
    ) -> Result<Vec<ScriptDescriptor>> {
        let mut descriptors = Vec::new();
        for path in registry.discover(None)? {
            match hooks::load_descriptor(&path) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    errors.record(&name, &e.to_string());
                }
            }
        }
        Ok(descriptors)
    }

    /// One forget per aggregated repository; failures are recorded like
    /// backup failures.
    fn run_retention(&self, repos: &[String], errors: &mut ErrorCollector) {
        for repo in repos {
            if self.dry_run {
                info!(
                    "[dry-run] would forget --keep-last {} on {}",
                    self.settings.keep_last, repo
                );
                continue;
            }
            info!("Applying retention (keep last {}) on {}", self.settings.keep_last, repo);
            if let Err(e) = self.engine.forget(repo, self.settings.keep_last) {
                errors.record(repo, &format!("retention failed: {}", e));
            }
        }
    }

    /// Best-effort notification on a fatal abort, carrying whatever errors
    /// were logged before the run stopped.
    fn send_fatal_notification(&self, errors: &ErrorCollector, fatal: &VaultrunError) {
        let body = if errors.is_empty() {
            format!("Backup run aborted: {}", fatal)
        } else {
            format!("Backup run aborted: {}\n\nErrors:\n{}", fatal, errors.to_report())
        };
        if let Err(e) = self.notifier.send("vaultrun: backup FAILED", &body) {
            warn!("Failed to send failure notification: {}", e);
        }
    }
}

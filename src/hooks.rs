//! Hook script loading and execution.
//!
//! A backup script is plain shell: it may define `before` and `after`
//! functions and `files` / `repository` variables. vaultrun never sources a
//! script into its own process. Instead a small driver runs in a throwaway
//! bash subprocess: it pre-seeds no-op defaults, sources the script, and then
//! either emits the declared variables as `key=value` lines (describe phase)
//! or invokes one hook function. Each phase is its own subprocess, so nothing
//! a script defines leaks into the orchestrator or into other scripts, and a
//! script's top level is evaluated exactly once per run for its descriptor.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::engine::Engine;
use crate::error::{Result, VaultrunError};
use crate::process_guard::run_tracked;
use crate::report::ErrorCollector;

/// Driver sourced scripts run under. `$1` = script path, `$2` = phase,
/// `$3` = hook mode (`x` trace, `n` no-exec echo).
///
/// stderr is folded into stdout up front so the captured buffer keeps the
/// order the script wrote in, trace lines included. The describe parser
/// ignores anything that is not a `key=value` line, so the merge is safe
/// there too.
///
/// In no-exec mode the hook body is printed with `declare -f` instead of
/// being invoked, so a dry run surfaces the commands without side effects.
const HOOK_DRIVER: &str = r#"
set -u
exec 2>&1
script="$1"
phase="$2"
mode="${3:-x}"
before() { :; }
after() { :; }
files=""
repository=""
. "$script" || exit 65
case "$phase" in
    describe)
        printf 'files=%s\n' "$files"
        printf 'repository=%s\n' "$repository"
        ;;
    before|after)
        if [ "$mode" = n ]; then
            declare -f "$phase"
        else
            set -x
            "$phase"
        fi
        ;;
    *)
        exit 64
        ;;
esac
"#;

/// How hook commands are surfaced to the captured-output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Fully-traced execution (`set -x`).
    Trace,
    /// Non-mutating command echo: print the hook body, execute nothing.
    Echo,
}

impl HookMode {
    fn flag(self) -> &'static str {
        match self {
            HookMode::Trace => "x",
            HookMode::Echo => "n",
        }
    }
}

/// Phases the driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Describe,
    Before,
    After,
}

impl HookPhase {
    fn as_str(self) -> &'static str {
        match self {
            HookPhase::Describe => "describe",
            HookPhase::Before => "before",
            HookPhase::After => "after",
        }
    }
}

/// Output from one driver invocation.
#[derive(Debug, Clone)]
pub struct HookOutput {
    /// Both streams as one buffer, in write order. The driver redirects
    /// stderr into stdout before anything runs.
    pub combined: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the phase exited successfully (exit code 0).
    pub success: bool,
}

/// Run one phase of a script through the hook driver.
pub fn run_hook(script: &Path, phase: HookPhase, mode: HookMode) -> Result<HookOutput> {
    debug!(
        "Running hook driver: script={} phase={} mode={:?}",
        script.display(),
        phase.as_str(),
        mode
    );

    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(HOOK_DRIVER)
        .arg("vaultrun-hook")
        .arg(script)
        .arg(phase.as_str())
        .arg(mode.flag())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = run_tracked(&mut cmd, &format!("hook driver for {}", script.display()))?;

    // The driver merges stderr into stdout; its stderr pipe only ever sees
    // bash startup failures, which belong in the buffer too.
    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(HookOutput {
        combined,
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Declarative view of one backup script, produced by the describe phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub path: PathBuf,
    /// Basename used for error attribution.
    pub name: String,
    /// Paths/globs to back up; empty means "skip backup for this script".
    pub files: Vec<String>,
    /// Declared target repositories; empty means "use the global default".
    pub repositories: Vec<String>,
}

impl ScriptDescriptor {
    /// Repositories this script backs up to, falling back to the defaults.
    pub fn repositories_or<'a>(&'a self, default_repos: &'a [String]) -> &'a [String] {
        if self.repositories.is_empty() {
            default_repos
        } else {
            &self.repositories
        }
    }
}

/// Load a script's descriptor by running its describe phase once.
pub fn load_descriptor(path: &Path) -> Result<ScriptDescriptor> {
    let name = script_name(path);
    let output = run_hook(path, HookPhase::Describe, HookMode::Trace)?;
    if !output.success {
        return Err(VaultrunError::script(format!(
            "Failed to load {}: {}",
            name,
            output.combined.trim()
        )));
    }

    let (files, repositories) = parse_describe_output(&output.combined);
    Ok(ScriptDescriptor {
        path: path.to_path_buf(),
        name,
        files,
        repositories,
    })
}

/// Extract `files=` / `repository=` lines from describe output. Any other
/// line (a chatty script top level) is ignored; the last occurrence of a
/// key wins.
fn parse_describe_output(output: &str) -> (Vec<String>, Vec<String>) {
    let mut files = Vec::new();
    let mut repositories = Vec::new();
    for line in output.lines() {
        if let Some(value) = line.strip_prefix("files=") {
            files = value.split_whitespace().map(String::from).collect();
        } else if let Some(value) = line.strip_prefix("repository=") {
            repositories = value.split_whitespace().map(String::from).collect();
        }
    }
    (files, repositories)
}

fn script_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Per-script lifecycle states.
///
/// `Failed` is absorbing: a non-zero `before` skips the backup and `after`
/// phases, and a non-zero `after` ends the script failed. Either way the run
/// itself continues with the next script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Loaded,
    BeforeRunning,
    BeforeDone,
    BackupRunning,
    AfterRunning,
    Finished,
    Failed,
}

/// Drives one script through before -> backup -> after.
pub struct HookRunner<'a, E: Engine + ?Sized> {
    engine: &'a E,
    excludes: &'a [String],
    default_repos: &'a [String],
    dry_run: bool,
}

impl<'a, E: Engine + ?Sized> HookRunner<'a, E> {
    pub fn new(
        engine: &'a E,
        excludes: &'a [String],
        default_repos: &'a [String],
        dry_run: bool,
    ) -> Self {
        Self {
            engine,
            excludes,
            default_repos,
            dry_run,
        }
    }

    fn hook_mode(&self) -> HookMode {
        if self.dry_run {
            HookMode::Echo
        } else {
            HookMode::Trace
        }
    }

    /// Run the full lifecycle for one script.
    ///
    /// Hook failures and per-repository backup failures are recorded in
    /// `errors` and never abort the run. The captured hook output buffer is
    /// owned by this call: it ends up in the error report on failure and is
    /// dropped otherwise.
    pub fn run_script(&self, script: &ScriptDescriptor, errors: &mut ErrorCollector) -> HookStage {
        let mut captured = String::new();

        info!("Running backup script {}", script.name);
        debug!("{}: entering {:?}", script.name, HookStage::Loaded);

        // Before
        let stage = self.run_phase(script, HookPhase::Before, &mut captured);
        if stage == HookStage::Failed {
            errors.record(&script.name, captured.trim());
            return HookStage::Failed;
        }

        // Backup, one repository at a time
        debug!("{}: entering {:?}", script.name, HookStage::BackupRunning);
        if script.files.is_empty() {
            debug!("{} declares no files, skipping backup step", script.name);
        } else {
            for repo in script.repositories_or(self.default_repos) {
                if self.dry_run {
                    info!(
                        "[dry-run] would back up {:?} from {} to {}",
                        script.files, script.name, repo
                    );
                    continue;
                }
                info!("Backing up {} to {}", script.name, repo);
                if let Err(e) = self.engine.backup(repo, &script.files, self.excludes) {
                    errors.record(&script.name, &format!("backup to {} failed: {}", repo, e));
                }
            }
        }

        // After
        let stage = self.run_phase(script, HookPhase::After, &mut captured);
        if stage == HookStage::Failed {
            errors.record(&script.name, captured.trim());
            return HookStage::Failed;
        }

        HookStage::Finished
    }

    /// Run one hook phase, appending its output to the shared buffer.
    fn run_phase(
        &self,
        script: &ScriptDescriptor,
        phase: HookPhase,
        captured: &mut String,
    ) -> HookStage {
        let running = match phase {
            HookPhase::Before => HookStage::BeforeRunning,
            HookPhase::After => HookStage::AfterRunning,
            HookPhase::Describe => unreachable!("describe is not a lifecycle phase"),
        };
        debug!("{}: entering {:?}", script.name, running);

        match run_hook(&script.path, phase, self.hook_mode()) {
            Ok(output) => {
                captured.push_str(&output.combined);
                if output.success {
                    match running {
                        HookStage::BeforeRunning => HookStage::BeforeDone,
                        _ => running,
                    }
                } else {
                    debug!(
                        "{}: hook {} exited with {:?}",
                        script.name,
                        phase.as_str(),
                        output.exit_code
                    );
                    HookStage::Failed
                }
            }
            Err(e) => {
                captured.push_str(&format!("hook {} did not run: {}\n", phase.as_str(), e));
                HookStage::Failed
            }
        }
    }
}

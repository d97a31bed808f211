//! Process lifecycle management for child processes
//!
//! Every external call vaultrun makes (hook drivers, engine invocations, the
//! mail transport) is a blocking subprocess with no timeout. If the
//! orchestrator is interrupted mid-run, a half-finished `restic backup` or a
//! user hook must not keep running as an orphan.
//!
//! The scheme:
//! - children are spawned in their own process group
//! - every child PID is tracked in a global registry
//! - on SIGINT/SIGTERM/SIGHUP the whole group gets SIGTERM, then SIGKILL
//!   after a grace period

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::error::{Result, VaultrunError};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking all in-flight child processes.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a newly spawned child
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        log::debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child that exited normally
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        log::debug!("Unregistered child process PID {}", pid);
    }

    /// Number of tracked children
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked process groups: SIGTERM first, then SIGKILL for
    /// whatever is still alive after `grace_period`.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.pids.is_empty() {
            return;
        }
        log::info!("Terminating {} child process(es)...", self.pids.len());

        let pids: Vec<u32> = self.pids.drain().collect();
        for &pid in &pids {
            // Signal the group so the engine/hook's own children get it too
            if signal_group(pid, Signal::SIGTERM).is_err() {
                let _ = signal_pid(pid, Signal::SIGTERM);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if !pids.iter().any(|&pid| is_alive(pid)) {
                log::info!("All child processes terminated gracefully");
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_alive(pid) {
                log::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                if signal_group(pid, Signal::SIGKILL).is_err() {
                    let _ = signal_pid(pid, Signal::SIGKILL);
                }
            }
        }
    }
}

fn signal_pid(pid: u32, sig: Signal) -> std::result::Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), sig)
}

/// Negative PID signals every process in the group.
fn signal_group(pgid: u32, sig: Signal) -> std::result::Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), sig)
}

fn is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Initialize global signal handlers for graceful shutdown.
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP. Call once at program start.
pub fn init_signal_handlers() -> std::result::Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            log::info!("Received signal {}, cleaning up children...", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to set up process groups.
pub trait CommandProcessGroup {
    /// Run the command in its own process group, with a parent-death signal
    /// so the child tree dies if vaultrun crashes outright.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

/// Spawn a command in a tracked process group and wait for it.
///
/// All subprocess execution in vaultrun goes through this function so the
/// registry sees every child. `what` names the operation for error messages.
pub fn run_tracked(cmd: &mut Command, what: &str) -> Result<Output> {
    cmd.in_new_process_group();

    let child = cmd
        .spawn()
        .map_err(|e| VaultrunError::general(format!("Failed to spawn {}: {}", what, e)))?;
    let pid = child.id();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let output = child
        .wait_with_output()
        .map_err(|e| VaultrunError::general(format!("Failed waiting for {}: {}", what, e)));

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);

        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_kills_real_process() {
        let child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("Failed to spawn sleep");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        assert!(is_alive(pid));

        registry.terminate_all(Duration::from_millis(500));

        // Reap and confirm it is gone
        let start = Instant::now();
        let mut dead = false;
        let mut child = child;
        while start.elapsed() < Duration::from_secs(2) {
            if let Ok(Some(_)) = child.try_wait() {
                dead = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(dead, "sleep process should be dead after terminate_all");
    }

    #[test]
    fn test_terminate_all_handles_already_dead_process() {
        let mut child = Command::new("true").spawn().expect("Failed to spawn true");
        let pid = child.id();
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        // Must not panic on a reaped PID
        registry.terminate_all(Duration::from_millis(100));
    }

    #[test]
    fn test_run_tracked_captures_output() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello").stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = run_tracked(&mut cmd, "echo test").unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn test_run_tracked_spawn_failure() {
        let mut cmd = Command::new("/nonexistent/binary-xyz");
        let err = run_tracked(&mut cmd, "bogus binary").unwrap_err();
        assert!(err.to_string().contains("bogus binary"));
    }
}

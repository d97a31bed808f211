//! vaultrun library
//!
//! Core functionality for the vaultrun backup-run orchestrator: script
//! discovery, hook execution, repository aggregation, and run-level
//! reporting around an external restic-style backup engine.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod process_guard;
pub mod registry;
pub mod report;

// Re-export main types for convenience
pub use aggregate::{RepoFilter, RepositoryAggregator};
pub use config::Settings;
pub use coordinator::{RunCoordinator, RunSummary};
pub use engine::{Engine, ResticEngine};
pub use error::{Result, VaultrunError};
pub use hooks::{load_descriptor, HookMode, HookOutput, HookRunner, HookStage, ScriptDescriptor};
pub use notify::{MailNotifier, Notify};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use registry::ScriptRegistry;
pub use report::{format_duration, ErrorCollector, Reporter};

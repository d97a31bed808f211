//! Error handling module for vaultrun
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the application should use these types for consistency.

use thiserror::Error;

/// Main error type for vaultrun
#[derive(Error, Debug)]
pub enum VaultrunError {
    /// IO errors (file operations, subprocess spawning, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backup-script errors (discovery, descriptor loading, hook execution)
    #[error("Script error: {0}")]
    Script(String),

    /// Backup-engine errors (init, backup, stats, forget invocations)
    #[error("Engine error: {0}")]
    Engine(String),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for vaultrun operations
pub type Result<T> = std::result::Result<T, VaultrunError>;

// Convenient error constructors
impl VaultrunError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a backup-script error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Create a backup-engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

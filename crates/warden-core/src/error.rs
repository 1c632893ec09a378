//! Error types shared across the Taskwarden crates.

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Top-level error type.
///
/// The scheduler core swallows recoverable failures at the lowest level and
/// reports status booleans to its driver, so this enum mostly surfaces at
/// construction and configuration boundaries.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Malformed configuration (bad duration string, unparsable config file).
    #[error("config error: {0}")]
    Config(String),

    /// A task name could not be resolved by the runtime.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A condition watchdog could not be scheduled.
    #[error("watchdog error: {0}")]
    Watchdog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

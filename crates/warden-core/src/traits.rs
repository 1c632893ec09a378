//! Task-runtime collaborator traits.
//!
//! The scheduler never runs a task itself. It asks a [`TaskRuntime`] to
//! resolve names into handles, to request starts and stops (fire-and-forget,
//! the runtime owns the execution context), and to answer `is_running`
//! polls. Nothing in the scheduler blocks waiting for a task state change.

use std::fmt;

/// Opaque identity of a resolved task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    /// Runtime-internal identifier.
    pub id: String,
    /// Human-readable task name (what schedule entries are keyed on).
    pub name: String,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The runtime that hosts managed tasks.
///
/// `request_start`, `request_stop`, and `kill` are asynchronous
/// fire-and-forget: they enqueue work on the runtime's own execution context
/// and return immediately. The scheduler observes the outcome only by
/// polling [`TaskRuntime::is_running`].
pub trait TaskRuntime: Send + Sync {
    /// Resolve a task by name. `None` if the runtime knows no such task.
    fn resolve(&self, name: &str) -> Option<TaskHandle>;

    /// Whether the task is enabled in the runtime (distinct from the
    /// schedule entry's own enabled flag).
    fn is_enabled(&self, task: &TaskHandle) -> bool;

    /// Whether the task is currently executing.
    fn is_running(&self, task: &TaskHandle) -> bool;

    /// Request an asynchronous launch.
    fn request_start(&self, task: &TaskHandle);

    /// Signal the task to wind down cooperatively (soft stop).
    fn request_stop(&self, task: &TaskHandle);

    /// Forcibly terminate the task (hard stop).
    fn kill(&self, task: &TaskHandle);

    /// Last-resort process-level shutdown, invoked when a task ignores both
    /// soft and hard stops for three times the hard-stop timeout.
    ///
    /// The default implementation ends the process with a non-zero status.
    fn emergency_shutdown(&self) {
        tracing::error!("🛑 Emergency shutdown: unresponsive task, terminating process");
        std::process::exit(1);
    }
}

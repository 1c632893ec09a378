//! # Warden Core
//!
//! Shared foundation for the Taskwarden scheduler: error types, the
//! scheduler configuration file, and the task-runtime collaborator traits.
//!
//! The scheduler itself lives in `warden-scheduler`; everything here is the
//! contract between the scheduler and the outside world (config on disk,
//! the runtime that actually starts and stops tasks).

pub mod config;
pub mod error;
pub mod traits;

pub use config::SchedulerConfig;
pub use error::{Result, WardenError};
pub use traits::{TaskHandle, TaskRuntime};

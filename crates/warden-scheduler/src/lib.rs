//! # Warden Scheduler
//!
//! Per-task scheduling lifecycle engine: condition-gated starts, monitored
//! stops with bounded escalation, and watchdog reconciliation of
//! task-supplied condition structures.
//!
//! - [`condition`] — the [`Condition`] contract, time-based variants,
//!   AND/OR composition, and the dual-sided [`ConditionManager`]
//! - [`escalation`] — the soft/hard/emergency stop ladder as pure rules
//! - [`entry`] — [`ScheduleEntry`], the orchestrator the external driver
//!   talks to
//!
//! The scheduler never executes tasks itself; it drives a
//! [`TaskRuntime`](warden_core::TaskRuntime) collaborator and polls it for
//! run state.

pub mod condition;
pub mod entry;
pub mod escalation;

pub use condition::logical::{LogicalCondition, Node, Operator, UpdateMode};
pub use condition::manager::{ConditionManager, ConditionSupplier, Gate, WatchdogHandle};
pub use condition::time::{
    DayOfWeekCondition, IntervalCondition, RepeatCycle, SingleTriggerCondition,
    TimeWindowCondition,
};
pub use condition::{Condition, FlagCondition, FlagHandle};
pub use entry::{
    EntryState, SchedulableTask, SchedulerRuntime, ScheduleEntry, StopCallback, StopOutcome,
    StopReason,
};
pub use escalation::{decide, StopAction, StopPhase, StopPolicy};

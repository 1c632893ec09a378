//! Condition system — satisfaction predicates that gate task starts and stops.
//!
//! A [`Condition`] is a small stateful predicate. Conditions compose into
//! [`LogicalCondition`](logical::LogicalCondition) trees, which in turn sit
//! behind a [`ConditionManager`](manager::ConditionManager) that splits them
//! into a user-owned side and a task-owned side.
//!
//! Evaluation is pure; consumption is explicit. `is_satisfied` never mutates
//! anything, and progress toward repeat caps or one-time consumption only
//! advances when the owner calls `reset` after acting on a satisfied
//! condition.

pub mod logical;
pub mod manager;
pub mod time;

use chrono::{DateTime, Duration as TimeDelta, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A predicate over world state, owned by a condition tree.
///
/// Implementors keep their own state (next trigger instants, consumption
/// flags, run counters) and advance it only in [`reset`](Condition::reset)
/// and [`hard_reset`](Condition::hard_reset).
pub trait Condition: Send + Sync {
    /// Human-readable description, used in diagnostics and logs.
    fn description(&self) -> String;

    /// Stable identity used for matching during watchdog reconciliation.
    ///
    /// Two conditions with the same identity are considered the same
    /// logical condition regardless of their runtime state.
    fn identity(&self) -> String {
        self.description()
    }

    /// Whether the condition holds right now. Must not mutate state.
    fn is_satisfied(&self) -> bool;

    /// Progress toward satisfaction in percent, 0.0 to 100.0.
    fn progress_percent(&self) -> f64 {
        if self.is_satisfied() { 100.0 } else { 0.0 }
    }

    /// Earliest future instant at which satisfaction could newly become
    /// true. `None` if already satisfied or unknowable.
    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Whether this condition fires at most once and then stays consumed
    /// until a [`hard_reset`](Condition::hard_reset).
    fn is_one_time(&self) -> bool {
        false
    }

    /// Whether the condition can still become satisfied in the future.
    fn can_trigger_again(&self) -> bool {
        true
    }

    /// Consume the current satisfaction and arm the next cycle.
    fn reset(&mut self);

    /// Reset everything, including one-time consumption and repeat caps.
    fn hard_reset(&mut self) {
        self.reset();
    }

    /// Shift all internal reference instants forward by `delta`. Used to
    /// compensate for pause intervals.
    fn shift_by(&mut self, delta: TimeDelta);

    /// Whether the condition is driven purely by the clock.
    fn is_time_based(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn Condition>;
}

impl Clone for Box<dyn Condition> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for Box<dyn Condition> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Condition({})", self.description())
    }
}

/// A condition backed by a shared boolean flag.
///
/// The task (or a test) holds the [`FlagHandle`] and raises it when its own
/// criterion is met; the scheduler reads it through the condition tree.
/// `reset` lowers the flag. Clones share the same flag, so watchdog
/// reconciliation preserves state across structure updates.
#[derive(Clone)]
pub struct FlagCondition {
    name: String,
    flag: Arc<AtomicBool>,
}

/// Writer side of a [`FlagCondition`].
#[derive(Clone)]
pub struct FlagHandle {
    flag: Arc<AtomicBool>,
}

impl FlagHandle {
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn lower(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl FlagCondition {
    pub fn new(name: impl Into<String>) -> (Self, FlagHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = FlagHandle { flag: Arc::clone(&flag) };
        (Self { name: name.into(), flag }, handle)
    }
}

impl Condition for FlagCondition {
    fn description(&self) -> String {
        format!("flag '{}'", self.name)
    }

    fn identity(&self) -> String {
        format!("flag:{}", self.name)
    }

    fn is_satisfied(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn shift_by(&mut self, _delta: TimeDelta) {}

    fn clone_box(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

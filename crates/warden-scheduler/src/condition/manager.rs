//! Dual-sided condition bookkeeping and watchdog reconciliation.
//!
//! A [`ConditionManager`] holds two [`Gate`]s: the user side (edited by the
//! operator) and the plugin side (supplied by the task itself). The overall
//! verdict is the conjunction of both sides, with an absent side vacuously
//! true.
//!
//! A condition watchdog periodically re-asks the task for its current
//! condition structure and reconciles it into the plugin side, preserving
//! the state of every condition that survives the update.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::logical::{LogicalCondition, UpdateMode};
use super::Condition;

/// One side of a condition manager.
///
/// `Unconstrained` means "no opinion" and is distinct from an empty tree in
/// intent, though both evaluate as vacuously satisfied. Structural updates
/// that empty a tree collapse it back to `Unconstrained`.
#[derive(Clone, Debug)]
pub enum Gate {
    Unconstrained,
    Tree(LogicalCondition),
}

impl Gate {
    pub fn is_satisfied(&self) -> bool {
        match self {
            Gate::Unconstrained => true,
            Gate::Tree(t) => t.is_empty() || t.is_satisfied(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Gate::Unconstrained => 0,
            Gate::Tree(t) => t.leaf_count(),
        }
    }

    pub fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Gate::Unconstrained => None,
            Gate::Tree(t) => t.current_trigger_time(),
        }
    }

    pub fn progress_percent(&self) -> Option<f64> {
        match self {
            Gate::Unconstrained => None,
            Gate::Tree(t) => Some(t.progress_percent()),
        }
    }

    fn signature(&self) -> String {
        match self {
            Gate::Unconstrained => "*".to_string(),
            Gate::Tree(t) => t.signature(),
        }
    }

    fn reset(&mut self) {
        if let Gate::Tree(t) = self {
            t.reset();
        }
    }

    fn hard_reset(&mut self) {
        if let Gate::Tree(t) = self {
            t.hard_reset();
        }
    }

    fn shift_by(&mut self, delta: TimeDelta) {
        if let Gate::Tree(t) = self {
            t.shift_by(delta);
        }
    }

    /// Reconcile a task-supplied structure into this gate.
    fn update(&mut self, incoming: &LogicalCondition, mode: UpdateMode) -> bool {
        match self {
            Gate::Unconstrained => match mode {
                UpdateMode::RemoveOnly => false,
                UpdateMode::Sync | UpdateMode::AddOnly => {
                    if incoming.is_empty() {
                        false
                    } else {
                        *self = Gate::Tree(incoming.clone());
                        true
                    }
                }
            },
            Gate::Tree(t) => {
                let changed = match mode {
                    UpdateMode::Sync => t.sync_with(incoming),
                    UpdateMode::AddOnly => t.merge_add(incoming),
                    UpdateMode::RemoveOnly => t.merge_remove(incoming),
                };
                if t.is_empty() {
                    *self = Gate::Unconstrained;
                }
                changed
            }
        }
    }
}

struct ManagerState {
    user: Gate,
    plugin: Gate,
    paused: bool,
    paused_at: Option<DateTime<Utc>>,
}

pub(crate) fn relock<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

/// Task-supplied source of the current condition structure. `Ok(None)` means
/// "nothing to report this tick"; errors are logged and the tick skipped.
pub type ConditionSupplier = Arc<dyn Fn() -> anyhow::Result<Option<LogicalCondition>> + Send + Sync>;

/// Cancellable handle to a running condition watchdog. Clones share the
/// underlying task; `close` is idempotent.
#[derive(Clone)]
pub struct WatchdogHandle {
    inner: Arc<WatchdogInner>,
}

struct WatchdogInner {
    task: Mutex<Option<JoinHandle<()>>>,
    // Shared with the spawned loop so pause/resume reach the ticking task.
    paused: Arc<AtomicBool>,
}

impl WatchdogHandle {
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        relock(self.inner.task.lock()).as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Abort the watchdog task. Safe to call more than once.
    pub fn close(&self) {
        if let Some(task) = relock(self.inner.task.lock()).take() {
            task.abort();
        }
    }
}

/// Shared handle over the two-sided condition state of one schedule entry
/// side (start or stop). Clones observe and mutate the same state.
#[derive(Clone)]
pub struct ConditionManager {
    state: Arc<Mutex<ManagerState>>,
    watchdog: Arc<Mutex<Option<WatchdogHandle>>>,
}

impl Default for ConditionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState {
                user: Gate::Unconstrained,
                plugin: Gate::Unconstrained,
                paused: false,
                paused_at: None,
            })),
            watchdog: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        relock(self.state.lock())
    }

    /// Install a user-side tree wholesale, replacing any existing one.
    pub fn set_user_tree(&self, tree: LogicalCondition) {
        let mut s = self.lock();
        s.user = if tree.is_empty() { Gate::Unconstrained } else { Gate::Tree(tree) };
    }

    /// Add one user condition. An unconstrained user side becomes an ANY
    /// group around the new condition.
    pub fn add_user_condition(&self, condition: Box<dyn Condition>) {
        let mut s = self.lock();
        match &mut s.user {
            Gate::Unconstrained => {
                s.user = Gate::Tree(LogicalCondition::any().with_condition(condition));
            }
            Gate::Tree(t) => t.add_condition(condition),
        }
    }

    /// Install a plugin-side tree wholesale, bypassing reconciliation.
    pub fn set_plugin_tree(&self, tree: LogicalCondition) {
        let mut s = self.lock();
        s.plugin = if tree.is_empty() { Gate::Unconstrained } else { Gate::Tree(tree) };
    }

    pub fn remove_user_condition(&self, identity: &str) -> bool {
        let mut s = self.lock();
        let Gate::Tree(t) = &mut s.user else { return false };
        let removed = t.remove_by_identity(identity);
        if t.is_empty() {
            s.user = Gate::Unconstrained;
        }
        removed
    }

    pub fn user_condition_count(&self) -> usize {
        self.lock().user.leaf_count()
    }

    pub fn plugin_condition_count(&self) -> usize {
        self.lock().plugin.leaf_count()
    }

    pub fn condition_count(&self) -> usize {
        let s = self.lock();
        s.user.leaf_count() + s.plugin.leaf_count()
    }

    pub fn has_conditions(&self) -> bool {
        self.condition_count() > 0
    }

    pub fn are_user_conditions_met(&self) -> bool {
        self.lock().user.is_satisfied()
    }

    pub fn are_plugin_conditions_met(&self) -> bool {
        self.lock().plugin.is_satisfied()
    }

    pub fn are_all_conditions_met(&self) -> bool {
        let s = self.lock();
        s.user.is_satisfied() && s.plugin.is_satisfied()
    }

    /// Reconcile a task-supplied structure into the plugin side. Returns
    /// whether the structure changed.
    pub fn update_plugin_conditions(&self, incoming: &LogicalCondition, mode: UpdateMode) -> bool {
        self.lock().plugin.update(incoming, mode)
    }

    pub fn reset(&self) {
        let mut s = self.lock();
        s.user.reset();
        s.plugin.reset();
    }

    pub fn reset_user_conditions(&self) {
        self.lock().user.reset();
    }

    pub fn reset_plugin_conditions(&self) {
        self.lock().plugin.reset();
    }

    pub fn hard_reset(&self) {
        let mut s = self.lock();
        s.user.hard_reset();
        s.plugin.hard_reset();
    }

    pub fn hard_reset_user_conditions(&self) {
        self.lock().user.hard_reset();
    }

    /// Freeze time accounting. Returns false if already paused.
    pub fn pause(&self) -> bool {
        let mut s = self.lock();
        if s.paused {
            return false;
        }
        s.paused = true;
        s.paused_at = Some(Utc::now());
        true
    }

    /// Unfreeze, shifting every stored instant forward by the pause
    /// duration so no time elapses from the conditions' point of view.
    pub fn resume(&self) -> bool {
        let mut s = self.lock();
        if !s.paused {
            return false;
        }
        if let Some(paused_at) = s.paused_at.take() {
            let delta = Utc::now() - paused_at;
            s.user.shift_by(delta);
            s.plugin.shift_by(delta);
        }
        s.paused = false;
        true
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Earliest forecast instant across both sides, treating them as an
    /// implicit ALL.
    pub fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        let s = self.lock();
        [s.user.current_trigger_time(), s.plugin.current_trigger_time()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Time until the combined gates could be satisfied. Zero if already
    /// satisfied, `None` if unknowable.
    pub fn estimated_duration_until_satisfied(&self) -> Option<Duration> {
        if self.are_all_conditions_met() {
            return Some(Duration::ZERO);
        }
        let trigger = self.current_trigger_time()?;
        (trigger - Utc::now()).to_std().ok().or(Some(Duration::ZERO))
    }

    /// Like [`estimated_duration_until_satisfied`](Self::estimated_duration_until_satisfied)
    /// but for the user side alone.
    pub fn estimated_duration_until_user_satisfied(&self) -> Option<Duration> {
        let s = self.lock();
        if s.user.is_satisfied() {
            return Some(Duration::ZERO);
        }
        let trigger = s.user.current_trigger_time()?;
        (trigger - Utc::now()).to_std().ok().or(Some(Duration::ZERO))
    }

    pub fn progress_percent(&self) -> f64 {
        let s = self.lock();
        match (s.user.progress_percent(), s.plugin.progress_percent()) {
            (Some(u), Some(p)) => u.min(p),
            (Some(x), None) | (None, Some(x)) => x,
            (None, None) => 0.0,
        }
    }

    /// Whether both sides can still become satisfied in the future
    /// (one-time conditions may have been consumed).
    pub fn can_trigger_again(&self) -> bool {
        let s = self.lock();
        let side = |g: &Gate| match g {
            Gate::Unconstrained => true,
            Gate::Tree(t) => t.can_trigger_again(),
        };
        side(&s.user) && side(&s.plugin)
    }

    pub fn has_only_time_conditions(&self) -> bool {
        let s = self.lock();
        let side_ok = |g: &Gate| match g {
            Gate::Unconstrained => true,
            Gate::Tree(t) => t.has_only_time_conditions(),
        };
        side_ok(&s.user) && side_ok(&s.plugin)
    }

    /// Detached manager holding only the time-based conditions, for
    /// forecasts that must ignore task state.
    pub fn time_only_manager(&self) -> ConditionManager {
        let s = self.lock();
        let project = |g: &Gate| match g {
            Gate::Unconstrained => Gate::Unconstrained,
            Gate::Tree(t) => {
                let projected = t.time_only();
                if projected.is_empty() { Gate::Unconstrained } else { Gate::Tree(projected) }
            }
        };
        ConditionManager {
            state: Arc::new(Mutex::new(ManagerState {
                user: project(&s.user),
                plugin: project(&s.plugin),
                paused: false,
                paused_at: None,
            })),
            watchdog: Arc::new(Mutex::new(None)),
        }
    }

    /// Structural fingerprint of both sides, used for entry equality.
    pub fn signature(&self) -> String {
        let s = self.lock();
        format!("user={};plugin={}", s.user.signature(), s.plugin.signature())
    }

    pub fn describe(&self) -> String {
        let s = self.lock();
        let side = |g: &Gate| match g {
            Gate::Unconstrained => "(unconstrained)\n".to_string(),
            Gate::Tree(t) => t.describe(),
        };
        format!("user:\n{}plugin:\n{}", side(&s.user), side(&s.plugin))
    }

    /// Spawn a watchdog that periodically pulls the task's condition
    /// structure through `supplier` and reconciles it into the plugin side.
    /// Replaces (and closes) any watchdog previously scheduled here.
    ///
    /// Must be called from within a tokio runtime; the watchdog task is
    /// spawned on the ambient runtime.
    pub fn schedule_watchdog(
        &self,
        supplier: ConditionSupplier,
        interval: Duration,
        mode: UpdateMode,
    ) -> WatchdogHandle {
        let state = Arc::clone(&self.state);
        let paused = Arc::new(AtomicBool::new(false));
        let paused_flag = Arc::clone(&paused);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if paused_flag.load(Ordering::SeqCst) {
                    continue;
                }
                match supplier() {
                    Ok(Some(incoming)) => {
                        let changed =
                            relock(state.lock()).plugin.update(&incoming, mode);
                        if changed {
                            tracing::debug!("🔔 Watchdog reconciled plugin conditions");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("⚠️ Condition watchdog supplier failed: {e}");
                    }
                }
            }
        });
        let handle = WatchdogHandle {
            inner: Arc::new(WatchdogInner { task: Mutex::new(Some(task)), paused }),
        };
        let mut slot = relock(self.watchdog.lock());
        if let Some(old) = slot.replace(handle.clone()) {
            old.close();
        }
        handle
    }

    pub fn has_active_watchdog(&self) -> bool {
        relock(self.watchdog.lock()).as_ref().is_some_and(WatchdogHandle::is_active)
    }

    pub fn pause_watchdog(&self) {
        if let Some(w) = relock(self.watchdog.lock()).as_ref() {
            w.pause();
        }
    }

    pub fn resume_watchdog(&self) {
        if let Some(w) = relock(self.watchdog.lock()).as_ref() {
            w.resume();
        }
    }

    pub fn close_watchdog(&self) {
        if let Some(w) = relock(self.watchdog.lock()).take() {
            w.close();
        }
    }
}

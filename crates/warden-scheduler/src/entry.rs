//! Schedule entries — the per-task lifecycle orchestrator.
//!
//! A [`ScheduleEntry`] binds a task name to two [`ConditionManager`]s (the
//! start gate and the stop gate) and drives the start / soft-stop /
//! hard-stop state machine. While a stop is in flight a monitor task polls
//! the runtime and walks the escalation ladder in
//! [`escalation`](crate::escalation) until the task is confirmed down.
//!
//! Entries are cheap-clone handles over shared state; the external driver,
//! the stop monitor, and the condition watchdogs all operate on the same
//! entry concurrently.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use warden_core::{Result, SchedulerConfig, TaskHandle, TaskRuntime};

use crate::condition::logical::{LogicalCondition, UpdateMode};
use crate::condition::manager::{relock, ConditionManager, ConditionSupplier};
use crate::condition::time::{parse_hh_mm, IntervalCondition, SingleTriggerCondition};
use crate::condition::Condition;
use crate::escalation::{self, StopAction, StopPhase, StopPolicy};

/// Why a stop was (or is being) performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    None,
    ManualStop,
    PluginFinished,
    Error,
    ScheduledStop,
    Interrupted,
    HardStop,
    ClientShutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::None => "none",
            StopReason::ManualStop => "manual stop",
            StopReason::PluginFinished => "task finished",
            StopReason::Error => "error",
            StopReason::ScheduledStop => "scheduled stop",
            StopReason::Interrupted => "interrupted",
            StopReason::HardStop => "hard stop",
            StopReason::ClientShutdown => "client shutdown",
        };
        f.write_str(s)
    }
}

/// Coarse lifecycle state, derived on demand for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    /// Launch requested, runtime has not yet reported the task running.
    Starting,
    Running,
    SoftStopping,
    HardStopping,
}

/// Optional capability a task may implement to participate in scheduling
/// beyond being started and stopped: supplying its own condition structures
/// and declaring whether it tolerates a hard stop.
pub trait SchedulableTask: Send + Sync {
    fn start_conditions(&self) -> Option<LogicalCondition> {
        None
    }

    fn stop_conditions(&self) -> Option<LogicalCondition> {
        None
    }

    fn allows_hard_stop(&self) -> bool {
        false
    }

    /// Hint toggled on while the task runs under schedule control.
    fn on_schedule_mode(&self, _active: bool) {}
}

/// Runtime that can additionally surface the [`SchedulableTask`] capability
/// of its tasks. The capability lookup happens once per entry.
pub trait SchedulerRuntime: TaskRuntime {
    fn schedulable(&self, _task: &TaskHandle) -> Option<Arc<dyn SchedulableTask>> {
        None
    }
}

/// Outcome handed to the stop-completion callback, exactly once per stop
/// cycle.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub entry: String,
    pub successful: bool,
    pub reason: StopReason,
    pub message: String,
}

pub type StopCallback = Box<dyn Fn(&StopOutcome) -> anyhow::Result<()> + Send + Sync>;

struct Book {
    enabled: bool,
    paused: bool,
    has_started: bool,
    stop_initiated: bool,
    stop_phase: Option<StopPhase>,
    stop_initiated_at: Option<DateTime<Utc>>,
    last_stop_attempt_at: Option<DateTime<Utc>>,
    last_run_started_at: Option<DateTime<Utc>>,
    last_run_ended_at: Option<DateTime<Utc>>,
    last_run_duration: TimeDelta,
    run_count: u32,
    last_stop_reason: StopReason,
    last_stop_message: String,
    last_run_successful: bool,
    user_stop_met_at_last_stop: bool,
    plugin_stop_met_at_last_stop: bool,
    monitoring: bool,
    allow_continue: bool,
    policy: StopPolicy,
    priority: i32,
    is_default: bool,
    allow_random_scheduling: bool,
    watchdogs_enabled: bool,
    watchdog_interval: Duration,
}

impl Book {
    fn new(enabled: bool, config: &SchedulerConfig) -> Self {
        Self {
            enabled,
            paused: false,
            has_started: false,
            stop_initiated: false,
            stop_phase: None,
            stop_initiated_at: None,
            last_stop_attempt_at: None,
            last_run_started_at: None,
            last_run_ended_at: None,
            last_run_duration: TimeDelta::zero(),
            run_count: 0,
            last_stop_reason: StopReason::None,
            last_stop_message: String::new(),
            last_run_successful: false,
            user_stop_met_at_last_stop: false,
            plugin_stop_met_at_last_stop: false,
            monitoring: false,
            allow_continue: false,
            policy: StopPolicy::from_config(config),
            priority: 0,
            is_default: false,
            allow_random_scheduling: true,
            watchdogs_enabled: config.watchdogs_enabled,
            watchdog_interval: config.watchdog_interval(),
        }
    }
}

struct EntryInner {
    name: String,
    runtime: Arc<dyn SchedulerRuntime>,
    capability: OnceLock<Option<Arc<dyn SchedulableTask>>>,
    start_conditions: ConditionManager,
    stop_conditions: ConditionManager,
    book: Mutex<Book>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    on_stop: Mutex<Option<StopCallback>>,
}

/// Cheap-clone handle over one scheduled task's lifecycle state.
#[derive(Clone)]
pub struct ScheduleEntry {
    inner: Arc<EntryInner>,
}

impl ScheduleEntry {
    /// Entry with no initial start condition. It will never be auto-due
    /// until conditions are added.
    pub fn new(name: impl Into<String>, runtime: Arc<dyn SchedulerRuntime>, enabled: bool) -> Self {
        Self::build(name.into(), runtime, None, enabled, false)
    }

    /// Entry due every `every` (fixed interval). Intervals of one second or
    /// less mark the entry as a low-priority default filler.
    pub fn with_interval(
        name: impl Into<String>,
        runtime: Arc<dyn SchedulerRuntime>,
        every: Duration,
        enabled: bool,
    ) -> Self {
        let is_default = every <= Duration::from_secs(1);
        Self::build(
            name.into(),
            runtime,
            Some(Box::new(IntervalCondition::new(every))),
            enabled,
            is_default,
        )
    }

    /// Entry due every `"HH:MM"`.
    pub fn with_duration_str(
        name: impl Into<String>,
        runtime: Arc<dyn SchedulerRuntime>,
        every: &str,
        enabled: bool,
    ) -> Result<Self> {
        Ok(Self::with_interval(name, runtime, parse_hh_mm(every)?, enabled))
    }

    /// Entry due exactly once at `at`.
    pub fn one_time(
        name: impl Into<String>,
        runtime: Arc<dyn SchedulerRuntime>,
        at: DateTime<Utc>,
        enabled: bool,
    ) -> Self {
        Self::build(
            name.into(),
            runtime,
            Some(Box::new(SingleTriggerCondition::new(at))),
            enabled,
            false,
        )
    }

    /// Entry with an arbitrary initial start condition.
    pub fn with_start_condition(
        name: impl Into<String>,
        runtime: Arc<dyn SchedulerRuntime>,
        condition: Box<dyn Condition>,
        enabled: bool,
    ) -> Self {
        Self::build(name.into(), runtime, Some(condition), enabled, false)
    }

    fn build(
        name: String,
        runtime: Arc<dyn SchedulerRuntime>,
        initial: Option<Box<dyn Condition>>,
        enabled: bool,
        is_default: bool,
    ) -> Self {
        let start_conditions = ConditionManager::new();
        if let Some(condition) = initial {
            start_conditions.add_user_condition(condition);
        }
        let mut book = Book::new(enabled, &SchedulerConfig::default());
        book.is_default = is_default;
        if is_default {
            book.priority = 0;
        }
        Self {
            inner: Arc::new(EntryInner {
                name,
                runtime,
                capability: OnceLock::new(),
                start_conditions,
                stop_conditions: ConditionManager::new(),
                book: Mutex::new(book),
                monitor: Mutex::new(None),
                on_stop: Mutex::new(None),
            }),
        }
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        relock(self.inner.book.lock())
    }

    fn resolve(&self) -> Option<TaskHandle> {
        self.inner.runtime.resolve(&self.inner.name)
    }

    fn capability(&self) -> Option<Arc<dyn SchedulableTask>> {
        self.inner
            .capability
            .get_or_init(|| {
                self.resolve().and_then(|t| self.inner.runtime.schedulable(&t))
            })
            .clone()
    }

    fn supports_hard_stop(&self) -> bool {
        self.capability().is_some_and(|c| c.allows_hard_stop())
    }

    // --- configuration ---

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn apply_config(&self, config: &SchedulerConfig) {
        let mut book = self.book();
        book.policy = StopPolicy::from_config(config);
        book.watchdogs_enabled = config.watchdogs_enabled;
        book.watchdog_interval = config.watchdog_interval();
    }

    pub fn set_stop_policy(&self, policy: StopPolicy) {
        self.book().policy = policy;
    }

    pub fn set_allow_continue(&self, allow: bool) {
        self.book().allow_continue = allow;
    }

    pub fn allow_continue(&self) -> bool {
        self.book().allow_continue
    }

    pub fn set_priority(&self, priority: i32) {
        self.book().priority = priority;
    }

    pub fn priority(&self) -> i32 {
        self.book().priority
    }

    pub fn is_default(&self) -> bool {
        self.book().is_default
    }

    pub fn set_allow_random_scheduling(&self, allow: bool) {
        self.book().allow_random_scheduling = allow;
    }

    pub fn allow_random_scheduling(&self) -> bool {
        self.book().allow_random_scheduling
    }

    /// Register the stop-completion callback. Errors from the callback are
    /// logged and swallowed.
    pub fn set_on_stop(&self, callback: StopCallback) {
        *relock(self.inner.on_stop.lock()) = Some(callback);
    }

    pub fn start_conditions(&self) -> &ConditionManager {
        &self.inner.start_conditions
    }

    pub fn stop_conditions(&self) -> &ConditionManager {
        &self.inner.stop_conditions
    }

    // --- state queries ---

    pub fn is_enabled(&self) -> bool {
        self.book().enabled
    }

    /// Enabling clears last-stop bookkeeping; disabling zeroes the run
    /// count and pauses both condition watchdogs.
    pub fn set_enabled(&self, enabled: bool) {
        let watchdogs_enabled = {
            let mut book = self.book();
            if book.enabled == enabled {
                return;
            }
            book.enabled = enabled;
            if enabled {
                book.last_stop_reason = StopReason::None;
                book.last_stop_message.clear();
                book.last_run_successful = false;
            } else {
                book.run_count = 0;
            }
            book.watchdogs_enabled
        };
        if enabled {
            if watchdogs_enabled {
                self.inner.start_conditions.resume_watchdog();
            }
        } else {
            self.inner.start_conditions.pause_watchdog();
            self.inner.stop_conditions.pause_watchdog();
        }
    }

    pub fn is_running(&self) -> bool {
        self.book().has_started
            && self.resolve().is_some_and(|t| self.inner.runtime.is_running(&t))
    }

    pub fn is_stopping(&self) -> bool {
        self.book().stop_initiated
    }

    pub fn is_stopped(&self) -> bool {
        !self.is_running() && !self.is_stopping()
    }

    pub fn state(&self) -> EntryState {
        let running = self.is_running();
        let book = self.book();
        if book.stop_initiated {
            match book.stop_phase {
                Some(StopPhase::Hard) => EntryState::HardStopping,
                _ => EntryState::SoftStopping,
            }
        } else if running {
            EntryState::Running
        } else if book.has_started {
            EntryState::Starting
        } else {
            EntryState::Idle
        }
    }

    pub fn run_count(&self) -> u32 {
        self.book().run_count
    }

    pub fn last_stop_reason(&self) -> StopReason {
        self.book().last_stop_reason
    }

    pub fn last_stop_message(&self) -> String {
        self.book().last_stop_message.clone()
    }

    pub fn last_run_successful(&self) -> bool {
        self.book().last_run_successful
    }

    pub fn last_run_duration(&self) -> TimeDelta {
        self.book().last_run_duration
    }

    pub fn last_run_started_at(&self) -> Option<DateTime<Utc>> {
        self.book().last_run_started_at
    }

    pub fn last_run_ended_at(&self) -> Option<DateTime<Utc>> {
        self.book().last_run_ended_at
    }

    /// True iff idle, enabled, and the whole start gate permits a launch.
    pub fn can_be_started(&self) -> bool {
        !self.is_running()
            && self.book().enabled
            && self.inner.start_conditions.are_all_conditions_met()
    }

    /// True iff idle, at least one start condition exists, and all are met.
    /// An entry with no start conditions is never automatically due.
    pub fn is_due_to_run(&self) -> bool {
        if self.book().paused {
            return false;
        }
        !self.is_running()
            && self.inner.start_conditions.condition_count() > 0
            && self.inner.start_conditions.are_all_conditions_met()
    }

    /// Whether the driver should initiate a scheduled stop. Requires at
    /// least one user-defined stop condition: a task with none must finish
    /// on its own or be stopped manually.
    pub fn should_be_stopped(&self) -> bool {
        if self.book().paused {
            return false;
        }
        let running = self.is_running();
        if running && !self.book().enabled {
            return true;
        }
        running
            && self.inner.stop_conditions.user_condition_count() > 0
            && self.inner.stop_conditions.are_all_conditions_met()
    }

    fn allowed_to_be_stopped(&self) -> bool {
        (self.is_running() && !self.book().enabled)
            || self.inner.stop_conditions.are_plugin_conditions_met()
    }

    // --- lifecycle ---

    /// Request an asynchronous launch. Returns whether the launch was
    /// requested, not whether the task is confirmed running.
    pub fn start(&self, log_conditions: bool) -> bool {
        let Some(task) = self.resolve() else {
            tracing::warn!("⚠️ Cannot start '{}': task not resolvable", self.inner.name);
            return false;
        };
        if !self.book().enabled {
            tracing::debug!("'{}' is disabled, not starting", self.inner.name);
            return false;
        }

        // Stop-condition reset policy: a normal start begins a fresh stop
        // cycle; continuing after an interruption preserves accumulated
        // stop-condition progress.
        {
            let book = self.book();
            let continuing =
                book.allow_continue && book.last_stop_reason == StopReason::Interrupted;
            if !continuing {
                self.inner.stop_conditions.reset();
            } else {
                self.inner.stop_conditions.reset_plugin_conditions();
                if !book.user_stop_met_at_last_stop
                    && self.inner.stop_conditions.are_user_conditions_met()
                {
                    // The user stop gate opened while we were down; its
                    // satisfaction belongs to the interrupted cycle.
                    self.inner.stop_conditions.reset_user_conditions();
                }
            }
        }

        {
            let mut book = self.book();
            book.last_stop_message.clear();
            book.last_stop_reason = StopReason::None;
            book.last_run_successful = false;
            book.user_stop_met_at_last_stop = false;
            book.plugin_stop_met_at_last_stop = false;
            book.stop_initiated = false;
            book.stop_phase = None;
            book.stop_initiated_at = None;
            book.last_stop_attempt_at = None;
            book.has_started = true;
            book.last_run_duration = TimeDelta::zero();
            book.last_run_started_at = Some(Utc::now());
        }

        if let Some(cap) = self.capability() {
            cap.on_schedule_mode(true);
        }
        self.inner.runtime.request_start(&task);

        // While running, only the stop side is worth watching.
        self.inner.start_conditions.pause_watchdog();
        self.inner.stop_conditions.resume_watchdog();

        if log_conditions {
            tracing::info!(
                "📅 Starting '{}'\nstart gate:\n{}stop gate:\n{}",
                self.inner.name,
                self.inner.start_conditions.describe(),
                self.inner.stop_conditions.describe()
            );
        } else {
            tracing::info!("📅 Start requested for '{}'", self.inner.name);
        }
        true
    }

    /// Initiate (or continue) a stop. Returns whether a stop is in
    /// progress after the call.
    ///
    /// Must be called from within a tokio runtime; the stop monitor is
    /// spawned on the ambient runtime.
    pub fn stop(&self, successful: bool, reason: StopReason) -> bool {
        self.stop_with_message(successful, reason, None)
    }

    pub fn stop_with_message(
        &self,
        successful: bool,
        reason: StopReason,
        message: Option<&str>,
    ) -> bool {
        let allowed = self.allowed_to_be_stopped()
            || reason == StopReason::HardStop
            || reason == StopReason::PluginFinished;
        if !allowed {
            tracing::debug!(
                "Stop of '{}' not permitted right now ({reason})",
                self.inner.name
            );
            return self.is_stopping();
        }

        let first = {
            let mut book = self.book();
            let first = !book.stop_initiated;
            if first {
                let now = Utc::now();
                book.stop_initiated_at = Some(now);
                book.last_stop_attempt_at = Some(now);
                book.last_run_successful = successful;
                book.last_stop_reason = reason;
                book.last_stop_message =
                    message.map(str::to_string).unwrap_or_else(|| reason.to_string());
                book.user_stop_met_at_last_stop =
                    self.inner.stop_conditions.are_user_conditions_met();
                book.plugin_stop_met_at_last_stop =
                    self.inner.stop_conditions.are_plugin_conditions_met();
            } else if reason == StopReason::HardStop {
                // Forced hard stop arriving mid-monitor; the escalation
                // ladder picks it up on the next tick.
                book.last_stop_reason = StopReason::HardStop;
            }
            first
        };

        if first {
            if reason == StopReason::HardStop {
                self.hard_stop(successful);
            } else {
                self.soft_stop(successful);
            }
        }
        self.is_stopping()
    }

    /// Driver convenience: stop when the stop gate says so, or clear stale
    /// stop state when the task vanished under an in-flight stop.
    pub fn check_conditions_and_stop(&self, successful: bool) -> bool {
        if self.should_be_stopped() {
            self.stop(successful, StopReason::ScheduledStop);
        } else if !self.is_running() && self.is_stopping() {
            tracing::debug!(
                "Clearing stale stop state for '{}' (no longer running)",
                self.inner.name
            );
            self.cancel_stop();
        }
        self.is_stopping()
    }

    /// Abort an in-flight stop: discard the monitor and clear the in-flight
    /// stop bookkeeping without touching run state. The recorded stop reason
    /// survives, so an interrupted cycle stays eligible for continuation.
    /// No completion callback fires.
    pub fn cancel_stop(&self) {
        if let Some(handle) = relock(self.inner.monitor.lock()).take() {
            handle.abort();
        }
        let mut book = self.book();
        book.stop_initiated = false;
        book.stop_phase = None;
        book.stop_initiated_at = None;
        book.last_stop_attempt_at = None;
        book.monitoring = false;
        drop(book);
        tracing::info!("✅ Stop cancelled for '{}'", self.inner.name);
    }

    /// Pause time-condition accounting on both gates. Returns false if
    /// already paused.
    pub fn pause(&self) -> bool {
        {
            let mut book = self.book();
            if book.paused {
                return false;
            }
            book.paused = true;
        }
        self.inner.start_conditions.pause();
        self.inner.stop_conditions.pause();
        tracing::info!("⏸️ '{}' paused", self.inner.name);
        true
    }

    /// Resume after a pause, shifting time conditions by the pause
    /// duration. Returns false if not paused.
    pub fn resume(&self) -> bool {
        {
            let mut book = self.book();
            if !book.paused {
                return false;
            }
            book.paused = false;
        }
        self.inner.start_conditions.resume();
        self.inner.stop_conditions.resume();
        tracing::info!("▶️ '{}' resumed", self.inner.name);
        true
    }

    pub fn is_paused(&self) -> bool {
        self.book().paused
    }

    /// Release every background resource owned by this entry: the stop
    /// monitor and both condition watchdogs. Safe to call more than once.
    pub fn close(&self) {
        if let Some(handle) = relock(self.inner.monitor.lock()).take() {
            handle.abort();
        }
        self.inner.start_conditions.close_watchdog();
        self.inner.stop_conditions.close_watchdog();
    }

    // --- watchdogs ---

    /// Schedule the condition watchdogs that keep both gates in sync with
    /// the task's own condition structures. No-op without the
    /// [`SchedulableTask`] capability or when watchdogs are disabled.
    ///
    /// Must be called from within a tokio runtime; the watchdog tasks are
    /// spawned on the ambient runtime.
    pub fn schedule_condition_watchdogs(&self, mode: UpdateMode) -> bool {
        let interval = {
            let book = self.book();
            if !book.watchdogs_enabled {
                return false;
            }
            book.watchdog_interval
        };
        let Some(cap) = self.capability() else {
            return false;
        };
        let start_cap = Arc::clone(&cap);
        let start_supplier: ConditionSupplier = Arc::new(move || Ok(start_cap.start_conditions()));
        let stop_supplier: ConditionSupplier = Arc::new(move || Ok(cap.stop_conditions()));
        self.inner.start_conditions.schedule_watchdog(start_supplier, interval, mode);
        self.inner.stop_conditions.schedule_watchdog(stop_supplier, interval, mode);
        true
    }

    /// Coarse switch over both watchdogs, independent of the start/stop
    /// side flip performed by the lifecycle.
    pub fn set_watchdogs_enabled(&self, enabled: bool) {
        self.book().watchdogs_enabled = enabled;
        if enabled {
            self.inner.start_conditions.resume_watchdog();
            self.inner.stop_conditions.resume_watchdog();
        } else {
            self.inner.start_conditions.pause_watchdog();
            self.inner.stop_conditions.pause_watchdog();
        }
    }

    // --- stop internals ---

    fn soft_stop(&self, successful: bool) {
        let Some(task) = self.resolve() else {
            return;
        };
        tracing::info!("🛑 Soft stop requested for '{}'", self.inner.name);
        // The start side becomes relevant again once this stop lands.
        self.inner.start_conditions.resume_watchdog();
        self.inner.stop_conditions.pause_watchdog();
        self.inner.runtime.request_stop(&task);
        {
            let mut book = self.book();
            let now = Utc::now();
            book.stop_initiated = true;
            book.stop_phase = Some(StopPhase::Soft);
            if book.stop_initiated_at.is_none() {
                book.stop_initiated_at = Some(now);
            }
            book.last_stop_attempt_at = Some(now);
            if let Some(started) = book.last_run_started_at {
                book.last_run_duration = now - started;
            }
            book.last_run_ended_at = Some(now);
        }
        self.spawn_stop_monitor(successful);
    }

    fn hard_stop(&self, successful: bool) {
        let Some(task) = self.resolve() else {
            return;
        };
        tracing::warn!("🛑 Hard stop issued for '{}'", self.inner.name);
        self.inner.start_conditions.resume_watchdog();
        self.inner.stop_conditions.pause_watchdog();
        self.inner.runtime.kill(&task);
        {
            let mut book = self.book();
            let now = Utc::now();
            book.stop_initiated = true;
            book.stop_phase = Some(StopPhase::Hard);
            if book.stop_initiated_at.is_none() {
                book.stop_initiated_at = Some(now);
            }
            book.last_stop_attempt_at = Some(now);
            if let Some(started) = book.last_run_started_at {
                book.last_run_duration = now - started;
            }
            book.last_run_ended_at = Some(now);
        }
        self.spawn_stop_monitor(successful);
    }

    /// At most one monitor per entry; re-entry while one is active is a
    /// no-op.
    fn spawn_stop_monitor(&self, successful: bool) {
        let poll = {
            let mut book = self.book();
            if book.monitoring {
                return;
            }
            book.monitoring = true;
            book.policy.monitor_poll
        };
        let entry = self.clone();
        let handle = tokio::spawn(async move {
            tracing::debug!("🔍 Stop monitor started for '{}'", entry.inner.name);
            loop {
                tokio::time::sleep(poll).await;
                if entry.monitor_tick(successful) {
                    break;
                }
            }
        });
        let mut slot = relock(self.inner.monitor.lock());
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// One stop-monitor poll. Returns true when monitoring should end.
    fn monitor_tick(&self, successful: bool) -> bool {
        let running = self.resolve().is_some_and(|t| self.inner.runtime.is_running(&t));
        if !running {
            self.finish_stop(successful);
            return true;
        }

        let supports_hard = self.supports_hard_stop();
        let action = {
            let book = self.book();
            if !book.stop_initiated {
                // Cancelled out from under us.
                return true;
            }
            let now = Utc::now();
            let since = |t: Option<DateTime<Utc>>| {
                t.map(|t| (now - t).to_std().unwrap_or_default()).unwrap_or_default()
            };
            escalation::decide(
                book.stop_phase.unwrap_or(StopPhase::Soft),
                book.last_stop_reason == StopReason::HardStop,
                since(book.stop_initiated_at),
                since(book.last_stop_attempt_at),
                &book.policy,
                supports_hard,
            )
        };

        match action {
            StopAction::Wait => {}
            StopAction::RetrySoft => {
                tracing::info!("⏰ Soft stop retry for '{}'", self.inner.name);
                self.soft_stop(successful);
            }
            StopAction::EscalateHard => {
                tracing::warn!(
                    "⚠️ '{}' ignored soft stop, escalating to hard stop",
                    self.inner.name
                );
                self.book().last_stop_reason = StopReason::HardStop;
                self.hard_stop(successful);
            }
            StopAction::EmergencyShutdown => {
                tracing::error!(
                    "🛑 '{}' unresponsive to all stops, emergency shutdown",
                    self.inner.name
                );
                self.inner.runtime.emergency_shutdown();
                return true;
            }
        }
        false
    }

    /// The task is confirmed down: close the cycle, fire the completion
    /// callback once, and prepare the next cycle.
    fn finish_stop(&self, successful: bool) {
        if let Some(cap) = self.capability() {
            cap.on_schedule_mode(false);
        }
        let outcome = {
            let mut book = self.book();
            let reason = book.last_stop_reason;
            if successful {
                let continuing = book.allow_continue && reason == StopReason::Interrupted;
                if continuing {
                    self.inner.start_conditions.reset_plugin_conditions();
                } else {
                    self.inner.start_conditions.reset();
                    book.run_count += 1;
                }
            }
            book.stop_initiated = false;
            book.stop_phase = None;
            book.has_started = false;
            book.monitoring = false;
            StopOutcome {
                entry: self.inner.name.clone(),
                successful,
                reason,
                message: book.last_stop_message.clone(),
            }
        };
        if successful {
            self.inner.start_conditions.resume_watchdog();
            self.inner.stop_conditions.pause_watchdog();
        } else {
            // A failed run disables the entry until an operator intervenes.
            self.set_enabled(false);
        }
        if let Some(cb) = relock(self.inner.on_stop.lock()).as_ref() {
            if let Err(e) = cb(&outcome) {
                tracing::error!("⚠️ Stop callback failed for '{}': {e}", self.inner.name);
            }
        }
        tracing::info!("✅ '{}' stopped ({})", self.inner.name, outcome.reason);
    }

    // --- forecasts & diagnostics ---

    pub fn estimated_time_until_start(&self) -> Option<Duration> {
        self.inner.start_conditions.estimated_duration_until_satisfied()
    }

    pub fn estimated_time_until_stop(&self) -> Option<Duration> {
        self.inner.stop_conditions.estimated_duration_until_satisfied()
    }

    /// Would this entry run based on its schedule alone, ignoring task
    /// state conditions?
    pub fn is_due_by_schedule_alone(&self) -> bool {
        let projected = self.inner.start_conditions.time_only_manager();
        projected.condition_count() > 0 && projected.are_all_conditions_met()
    }

    pub fn next_run_display(&self) -> String {
        if self.is_running() {
            return "Running".to_string();
        }
        if !self.book().enabled {
            return "Disabled".to_string();
        }
        if self.is_due_to_run() {
            return "Due to run".to_string();
        }
        match self.inner.start_conditions.current_trigger_time() {
            Some(t) => format!("Next run at {}", t.format("%Y-%m-%d %H:%M:%S")),
            None => "Waiting on conditions".to_string(),
        }
    }

    /// Whether the start gate can ever open again (one-time start
    /// conditions may be spent).
    pub fn has_fulfillable_start_conditions(&self) -> bool {
        self.inner.start_conditions.can_trigger_again()
    }

    pub fn has_fulfillable_stop_conditions(&self) -> bool {
        self.inner.stop_conditions.can_trigger_again()
    }

    /// Restore fireability of every condition, including consumed one-time
    /// triggers and repeat caps.
    pub fn hard_reset_conditions(&self) {
        self.inner.start_conditions.hard_reset();
        self.inner.stop_conditions.hard_reset();
    }

    pub fn diagnose_start_conditions(&self) -> String {
        Self::diagnose(self.start_conditions(), "start")
    }

    pub fn diagnose_stop_conditions(&self) -> String {
        Self::diagnose(self.stop_conditions(), "stop")
    }

    fn diagnose(mgr: &ConditionManager, side: &str) -> String {
        let mut out = format!(
            "{side} gate: {} condition(s), {:.0}% progress, met={}\n{}",
            mgr.condition_count(),
            mgr.progress_percent(),
            mgr.are_all_conditions_met(),
            mgr.describe()
        );
        if let Some(t) = mgr.current_trigger_time() {
            out.push_str(&format!("next trigger: {}\n", t.format("%Y-%m-%d %H:%M:%S")));
        }
        out
    }

    pub fn describe_conditions(&self) -> String {
        format!(
            "start gate:\n{}stop gate:\n{}",
            self.inner.start_conditions.describe(),
            self.inner.stop_conditions.describe()
        )
    }

    /// Machine-consumable status snapshot for UIs and persistence layers.
    pub fn snapshot(&self) -> serde_json::Value {
        let book = self.book();
        serde_json::json!({
            "name": self.inner.name,
            "enabled": book.enabled,
            "paused": book.paused,
            "runCount": book.run_count,
            "priority": book.priority,
            "default": book.is_default,
            "allowContinue": book.allow_continue,
            "lastStopReason": book.last_stop_reason,
            "lastRunSuccessful": book.last_run_successful,
            "startProgress": self.inner.start_conditions.progress_percent(),
            "stopProgress": self.inner.stop_conditions.progress_percent(),
            "nextTrigger": self
                .inner
                .start_conditions
                .current_trigger_time()
                .map(|t| t.to_rfc3339()),
        })
    }
}

// De-duplication identity when reloading persisted schedules: the name plus
// both condition structures, never the handle address.
impl PartialEq for ScheduleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
            && self.inner.start_conditions.signature() == other.inner.start_conditions.signature()
            && self.inner.stop_conditions.signature() == other.inner.stop_conditions.signature()
    }
}

impl Eq for ScheduleEntry {}

impl std::hash::Hash for ScheduleEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
        self.inner.start_conditions.signature().hash(state);
        self.inner.stop_conditions.signature().hash(state);
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}, runs={}]", self.inner.name, self.state(), self.run_count())
    }
}

impl fmt::Debug for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleEntry")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::FlagCondition;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeTask {
        hard_ok: bool,
        stop_tree: Mutex<Option<LogicalCondition>>,
        schedule_mode: AtomicBool,
    }

    impl FakeTask {
        fn new(hard_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                hard_ok,
                stop_tree: Mutex::new(None),
                schedule_mode: AtomicBool::new(false),
            })
        }
    }

    impl SchedulableTask for FakeTask {
        fn stop_conditions(&self) -> Option<LogicalCondition> {
            self.stop_tree.lock().unwrap().clone()
        }

        fn allows_hard_stop(&self) -> bool {
            self.hard_ok
        }

        fn on_schedule_mode(&self, active: bool) {
            self.schedule_mode.store(active, Ordering::SeqCst);
        }
    }

    struct FakeRuntime {
        running: AtomicBool,
        starts: AtomicU32,
        soft_stops: AtomicU32,
        kills: AtomicU32,
        emergencies: AtomicU32,
        cooperative: bool,
        killable: bool,
        task: Option<Arc<FakeTask>>,
    }

    impl FakeRuntime {
        fn new(cooperative: bool, killable: bool, task: Option<Arc<FakeTask>>) -> Arc<Self> {
            Arc::new(Self {
                running: AtomicBool::new(false),
                starts: AtomicU32::new(0),
                soft_stops: AtomicU32::new(0),
                kills: AtomicU32::new(0),
                emergencies: AtomicU32::new(0),
                cooperative,
                killable,
                task,
            })
        }
    }

    impl TaskRuntime for FakeRuntime {
        fn resolve(&self, name: &str) -> Option<TaskHandle> {
            Some(TaskHandle::new("1", name))
        }

        fn is_enabled(&self, _task: &TaskHandle) -> bool {
            true
        }

        fn is_running(&self, _task: &TaskHandle) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn request_start(&self, _task: &TaskHandle) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
        }

        fn request_stop(&self, _task: &TaskHandle) {
            self.soft_stops.fetch_add(1, Ordering::SeqCst);
            if self.cooperative {
                self.running.store(false, Ordering::SeqCst);
            }
        }

        fn kill(&self, _task: &TaskHandle) {
            self.kills.fetch_add(1, Ordering::SeqCst);
            if self.killable {
                self.running.store(false, Ordering::SeqCst);
            }
        }

        fn emergency_shutdown(&self) {
            self.emergencies.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl SchedulerRuntime for FakeRuntime {
        fn schedulable(&self, _task: &TaskHandle) -> Option<Arc<dyn SchedulableTask>> {
            self.task.clone().map(|t| t as Arc<dyn SchedulableTask>)
        }
    }

    fn fast_policy() -> StopPolicy {
        StopPolicy {
            soft_retry_interval: Duration::from_millis(40),
            hard_stop_timeout: Duration::from_millis(120),
            monitor_poll: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_start_requires_enabled() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt.clone(), false);
        assert!(!entry.start(false));
        assert_eq!(rt.starts.load(Ordering::SeqCst), 0);
        entry.set_enabled(true);
        assert!(entry.start(false));
        assert_eq!(rt.starts.load(Ordering::SeqCst), 1);
        assert!(entry.is_running());
    }

    #[test]
    fn test_running_entry_is_never_due() {
        let rt = FakeRuntime::new(true, true, None);
        let entry =
            ScheduleEntry::with_interval("miner", rt.clone(), Duration::from_millis(10), true);
        assert!(!entry.is_due_to_run());
        std::thread::sleep(Duration::from_millis(30));
        assert!(entry.is_due_to_run());
        assert!(entry.start(false));
        assert!(entry.is_running());
        assert!(!entry.is_due_to_run());
    }

    #[test]
    fn test_no_start_conditions_never_auto_due() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        assert!(!entry.is_due_to_run());
        // But a manual start is still allowed.
        assert!(entry.can_be_started());
    }

    #[test]
    fn test_auto_stop_requires_user_stop_condition() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.start(false);
        // Plugin side satisfied, no user conditions: never auto-stopped.
        assert!(!entry.should_be_stopped());
        let (cond, handle) = FlagCondition::new("quota");
        entry.stop_conditions().add_user_condition(Box::new(cond));
        assert!(!entry.should_be_stopped());
        handle.raise();
        assert!(entry.should_be_stopped());
    }

    #[test]
    fn test_short_interval_marks_default_entry() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::with_interval("filler", rt.clone(), Duration::from_secs(1), true);
        assert!(entry.is_default());
        assert_eq!(entry.priority(), 0);
        let entry = ScheduleEntry::with_interval("real", rt, Duration::from_secs(300), true);
        assert!(!entry.is_default());
    }

    #[test]
    fn test_duration_str_construction() {
        let rt = FakeRuntime::new(true, true, None);
        assert!(ScheduleEntry::with_duration_str("miner", rt.clone(), "01:30", true).is_ok());
        assert!(ScheduleEntry::with_duration_str("miner", rt, "9000", true).is_err());
    }

    #[tokio::test]
    async fn test_cooperative_stop_completes_and_fires_callback() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(fast_policy());
        let fired = Arc::new(AtomicU32::new(0));
        let fired_in = Arc::clone(&fired);
        entry.set_on_stop(Box::new(move |outcome| {
            assert!(outcome.successful);
            assert_eq!(outcome.reason, StopReason::ManualStop);
            fired_in.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        entry.start(false);
        assert!(entry.stop(true, StopReason::ManualStop));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(entry.is_stopped());
        assert_eq!(entry.run_count(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(rt.soft_stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schedule_mode_hint_follows_lifecycle() {
        let task = FakeTask::new(false);
        let rt = FakeRuntime::new(true, true, Some(task.clone()));
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.set_stop_policy(fast_policy());
        entry.start(false);
        assert!(task.schedule_mode.load(Ordering::SeqCst));
        entry.stop(true, StopReason::ManualStop);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!task.schedule_mode.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_escalates_to_hard_stop_after_timeout() {
        let task = FakeTask::new(true);
        let rt = FakeRuntime::new(false, true, Some(task));
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(StopPolicy {
            soft_retry_interval: Duration::from_secs(10),
            hard_stop_timeout: Duration::from_millis(60),
            monitor_poll: Duration::from_millis(10),
        });
        entry.start(false);
        entry.stop(true, StopReason::ManualStop);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rt.kills.load(Ordering::SeqCst) >= 1);
        assert_eq!(entry.last_stop_reason(), StopReason::HardStop);
        assert!(entry.is_stopped());
        assert_eq!(entry.run_count(), 1);
    }

    #[tokio::test]
    async fn test_soft_retries_without_hard_support() {
        let rt = FakeRuntime::new(false, false, None);
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(StopPolicy {
            soft_retry_interval: Duration::from_millis(30),
            hard_stop_timeout: Duration::ZERO,
            monitor_poll: Duration::from_millis(10),
        });
        entry.start(false);
        entry.stop(true, StopReason::ManualStop);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rt.soft_stops.load(Ordering::SeqCst) >= 3);
        assert_eq!(rt.kills.load(Ordering::SeqCst), 0);
        assert_eq!(rt.emergencies.load(Ordering::SeqCst), 0);
        assert!(entry.is_stopping());
        entry.cancel_stop();
        assert!(!entry.is_stopping());
        let after_cancel = rt.soft_stops.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(rt.soft_stops.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_emergency_shutdown_when_hard_stop_ignored() {
        let task = FakeTask::new(true);
        let rt = FakeRuntime::new(false, false, Some(task));
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(StopPolicy {
            soft_retry_interval: Duration::from_secs(10),
            hard_stop_timeout: Duration::from_millis(30),
            monitor_poll: Duration::from_millis(10),
        });
        entry.start(false);
        entry.stop(true, StopReason::ManualStop);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rt.kills.load(Ordering::SeqCst) >= 1);
        assert!(rt.emergencies.load(Ordering::SeqCst) >= 1);
        entry.close();
    }

    #[tokio::test]
    async fn test_hard_stop_reason_kills_immediately() {
        let task = FakeTask::new(true);
        let rt = FakeRuntime::new(false, true, Some(task));
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(fast_policy());
        entry.start(false);
        entry.stop(true, StopReason::HardStop);
        assert_eq!(rt.kills.load(Ordering::SeqCst), 1);
        assert_eq!(rt.soft_stops.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(entry.is_stopped());
    }

    #[tokio::test]
    async fn test_forced_hard_stop_mid_monitor_without_capability() {
        let task = FakeTask::new(false);
        let rt = FakeRuntime::new(false, true, Some(task));
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(StopPolicy {
            soft_retry_interval: Duration::from_secs(10),
            hard_stop_timeout: Duration::from_secs(10),
            monitor_poll: Duration::from_millis(10),
        });
        entry.start(false);
        entry.stop(true, StopReason::ManualStop);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(entry.is_stopping());
        // Operator forces a hard stop mid-monitor; the escalation ladder
        // must honor it even though the task declares no hard-stop support.
        entry.stop(true, StopReason::HardStop);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rt.kills.load(Ordering::SeqCst) >= 1);
        assert!(entry.is_stopped());
        assert_eq!(entry.last_stop_reason(), StopReason::HardStop);
    }

    #[tokio::test]
    async fn test_stale_stop_clear_keeps_reason() {
        let rt = FakeRuntime::new(false, true, None);
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        entry.set_stop_policy(StopPolicy {
            soft_retry_interval: Duration::from_secs(10),
            hard_stop_timeout: Duration::from_secs(10),
            monitor_poll: Duration::from_secs(10),
        });
        entry.start(false);
        entry.stop(true, StopReason::Interrupted);
        assert!(entry.is_stopping());
        // The task vanishes out from under the in-flight stop.
        rt.running.store(false, Ordering::SeqCst);
        entry.check_conditions_and_stop(true);
        assert!(!entry.is_stopping());
        // The reason survives the stale clear, keeping the interrupted
        // cycle eligible for continuation on the next start.
        assert_eq!(entry.last_stop_reason(), StopReason::Interrupted);
    }

    #[tokio::test]
    async fn test_failed_run_disables_entry() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.set_stop_policy(fast_policy());
        entry.start(false);
        entry.stop(false, StopReason::Error);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!entry.is_enabled());
        assert_eq!(entry.run_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_with_continue_preserves_stop_progress() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.set_stop_policy(fast_policy());
        entry.set_allow_continue(true);
        let (cond, handle) = FlagCondition::new("quota");
        entry.stop_conditions().add_user_condition(Box::new(cond));

        entry.start(false);
        // Interrupted with the user stop gate unmet.
        entry.stop(true, StopReason::Interrupted);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(entry.is_stopped());
        // A continuation does not count as a completed run.
        assert_eq!(entry.run_count(), 0);
        assert_eq!(entry.last_stop_reason(), StopReason::Interrupted);

        // The gate opens while the task is down; that satisfaction belongs
        // to the interrupted cycle and is consumed by the next start.
        handle.raise();
        assert!(entry.start(false));
        assert!(!handle.is_raised());
    }

    #[tokio::test]
    async fn test_interrupted_with_continue_keeps_met_user_conditions() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.set_stop_policy(fast_policy());
        entry.set_allow_continue(true);
        let (cond, handle) = FlagCondition::new("quota");
        entry.stop_conditions().add_user_condition(Box::new(cond));

        entry.start(false);
        // The gate was already open when the interruption hit.
        handle.raise();
        entry.stop(true, StopReason::Interrupted);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(entry.is_stopped());
        assert!(entry.start(false));
        // Progress survives the restart.
        assert!(handle.is_raised());
    }

    #[tokio::test]
    async fn test_check_conditions_and_stop_drives_scheduled_stop() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        entry.set_stop_policy(fast_policy());
        let (cond, handle) = FlagCondition::new("quota");
        entry.stop_conditions().add_user_condition(Box::new(cond));
        entry.start(false);
        assert!(!entry.check_conditions_and_stop(true));
        handle.raise();
        assert!(entry.check_conditions_and_stop(true));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(entry.is_stopped());
        assert_eq!(entry.last_stop_reason(), StopReason::ScheduledStop);
    }

    #[tokio::test]
    async fn test_watchdog_pulls_task_stop_conditions() {
        let task = FakeTask::new(false);
        let (cond, _h) = FlagCondition::new("supplied");
        *task.stop_tree.lock().unwrap() =
            Some(LogicalCondition::any().with_condition(Box::new(cond)));
        let rt = FakeRuntime::new(true, true, Some(task));
        let entry = ScheduleEntry::new("miner", rt, true);
        {
            let mut cfg = SchedulerConfig::default();
            cfg.watchdog_interval_millis = 20;
            entry.apply_config(&cfg);
        }
        assert!(entry.schedule_condition_watchdogs(UpdateMode::Sync));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(entry.stop_conditions().plugin_condition_count(), 1);
        entry.close();
    }

    #[test]
    fn test_watchdogs_require_capability() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt, true);
        assert!(!entry.schedule_condition_watchdogs(UpdateMode::Sync));
    }

    #[test]
    fn test_pause_resume_reentrancy() {
        let rt = FakeRuntime::new(true, true, None);
        let entry =
            ScheduleEntry::with_interval("miner", rt, Duration::from_millis(10), true);
        assert!(entry.pause());
        assert!(!entry.pause());
        std::thread::sleep(Duration::from_millis(30));
        // A paused entry is never due, even with its interval elapsed.
        assert!(!entry.is_due_to_run());
        assert!(entry.resume());
        assert!(!entry.resume());
    }

    #[test]
    fn test_one_time_entry_fulfillability() {
        let rt = FakeRuntime::new(true, true, None);
        let entry =
            ScheduleEntry::one_time("miner", rt, Utc::now() + TimeDelta::milliseconds(10), true);
        assert!(entry.has_fulfillable_start_conditions());
        std::thread::sleep(Duration::from_millis(30));
        assert!(entry.is_due_to_run());
        entry.start_conditions().reset();
        assert!(!entry.has_fulfillable_start_conditions());
        entry.hard_reset_conditions();
        assert!(entry.has_fulfillable_start_conditions());
    }

    #[test]
    fn test_state_reports_starting_before_runtime_confirms() {
        let rt = FakeRuntime::new(true, true, None);
        let entry = ScheduleEntry::new("miner", rt.clone(), true);
        assert_eq!(entry.state(), EntryState::Idle);
        entry.start(false);
        assert_eq!(entry.state(), EntryState::Running);
        // Runtime has not confirmed the launch yet.
        rt.running.store(false, Ordering::SeqCst);
        assert_eq!(entry.state(), EntryState::Starting);
    }

    #[test]
    fn test_equality_by_name_and_conditions() {
        let rt = FakeRuntime::new(true, true, None);
        let a = ScheduleEntry::with_interval(
            "miner",
            rt.clone(),
            Duration::from_secs(300),
            true,
        );
        let b = ScheduleEntry::with_interval(
            "miner",
            rt.clone(),
            Duration::from_secs(300),
            false,
        );
        let c =
            ScheduleEntry::with_interval("miner", rt.clone(), Duration::from_secs(600), true);
        let d = ScheduleEntry::with_interval("other", rt, Duration::from_secs(300), true);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_snapshot_reports_core_fields() {
        let rt = FakeRuntime::new(true, true, None);
        let entry =
            ScheduleEntry::with_interval("miner", rt, Duration::from_secs(300), true);
        let snap = entry.snapshot();
        assert_eq!(snap["name"], "miner");
        assert_eq!(snap["enabled"], true);
        assert_eq!(snap["runCount"], 0);
        assert!(snap["nextTrigger"].is_string());
    }

    #[test]
    fn test_next_run_display_transitions() {
        let rt = FakeRuntime::new(true, true, None);
        let entry =
            ScheduleEntry::with_interval("miner", rt, Duration::from_millis(10), true);
        assert!(entry.next_run_display().starts_with("Next run at"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(entry.next_run_display(), "Due to run");
        entry.start(false);
        assert_eq!(entry.next_run_display(), "Running");
    }
}

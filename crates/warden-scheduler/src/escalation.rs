//! Stop-escalation policy.
//!
//! The stop monitor periodically asks [`decide`] what to do about a task
//! that is still running after a stop was initiated. The function is pure;
//! all clock reads happen in the caller. Rule order matters: a due hard
//! escalation always wins over a due soft retry.

use std::time::Duration;
use warden_core::SchedulerConfig;

/// Which kind of stop is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPhase {
    /// Cooperative stop requested; the task may still wind down on its own.
    Soft,
    /// Forcible stop issued; only the emergency backstop remains.
    Hard,
}

/// What the stop monitor should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    Wait,
    RetrySoft,
    EscalateHard,
    EmergencyShutdown,
}

/// Timing knobs for the escalation ladder.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    /// Minimum spacing between repeated soft-stop requests.
    pub soft_retry_interval: Duration,
    /// Time after stop initiation before escalating to a hard stop. Zero
    /// disables hard escalation and, with it, the emergency backstop.
    pub hard_stop_timeout: Duration,
    /// Stop-monitor polling cadence.
    pub monitor_poll: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl StopPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            soft_retry_interval: config.soft_stop_retry_interval(),
            hard_stop_timeout: config.hard_stop_timeout(),
            monitor_poll: config.monitor_poll_interval(),
        }
    }
}

/// Pick the next escalation step for a task that is still running.
///
/// `since_initiated` is measured from the first stop attempt of this cycle,
/// `since_last_attempt` from the most recent one. `hard_requested` is true
/// when the stop was demanded as a hard stop from the outset.
pub fn decide(
    phase: StopPhase,
    hard_requested: bool,
    since_initiated: Duration,
    since_last_attempt: Duration,
    policy: &StopPolicy,
    supports_hard_stop: bool,
) -> StopAction {
    match phase {
        StopPhase::Hard => {
            if !policy.hard_stop_timeout.is_zero()
                && since_initiated >= policy.hard_stop_timeout * 3
            {
                StopAction::EmergencyShutdown
            } else {
                StopAction::Wait
            }
        }
        StopPhase::Soft => {
            if supports_hard_stop
                && !policy.hard_stop_timeout.is_zero()
                && since_initiated >= policy.hard_stop_timeout
            {
                return StopAction::EscalateHard;
            }
            // A forced hard stop is honored regardless of the task's
            // hard-stop capability declaration.
            if hard_requested {
                return StopAction::EscalateHard;
            }
            if since_last_attempt >= policy.soft_retry_interval {
                return StopAction::RetrySoft;
            }
            // Reachable when hard stop is unsupported: the task has ignored
            // soft stops for three full hard-stop timeouts.
            if !policy.hard_stop_timeout.is_zero()
                && since_initiated >= policy.hard_stop_timeout * 3
            {
                return StopAction::EmergencyShutdown;
            }
            StopAction::Wait
        }
    }
}

//! Supervision: what happens when an actor's invocation panics.
//!
//! The mailbox/context boundary converts the panic into a `Failure` system
//! message to the parent, with the child's mailbox suspended in the
//! meantime. The parent's supervisor strategy then picks a directive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::context::Context;
use crate::system_message::Failure;

/// Supervisor decision for a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep the current incarnation and resume its mailbox.
    Resume,
    /// Replace the actor with a fresh incarnation, then resume.
    Restart,
    /// Stop the child.
    Stop,
    /// Pass the failure up to the grandparent.
    Escalate,
}

pub type Decider = Arc<dyn Fn(&str) -> Directive + Send + Sync>;

pub trait SupervisorStrategy: Send + Sync + 'static {
    fn handle_failure(&self, supervisor: &mut Context, failure: &Failure);
}

/// Failure history of a single actor, shared between the actor and whichever
/// supervisor ends up deciding its fate.
#[derive(Debug, Default)]
pub struct RestartStatistics {
    failures: Mutex<Vec<Instant>>,
}

impl RestartStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    /// Record a failure and decide whether another restart is allowed:
    /// more than `max_retries` failures inside `within` means no.
    pub fn request_restart_permission(&self, max_retries: usize, within: Duration) -> bool {
        let mut failures = self.failures.lock();
        let now = Instant::now();
        failures.push(now);
        if max_retries == 0 {
            return false;
        }
        let recent = failures
            .iter()
            .filter(|at| now.duration_since(**at) < within)
            .count();
        recent <= max_retries
    }

    pub fn reset(&self) {
        self.failures.lock().clear();
    }
}

/// Restart the failing child only, up to `max_retries` failures within the
/// sliding window.
pub struct OneForOneStrategy {
    max_retries: usize,
    within: Duration,
    decider: Decider,
}

impl OneForOneStrategy {
    pub fn new(max_retries: usize, within: Duration) -> Self {
        Self {
            max_retries,
            within,
            decider: Arc::new(|_| Directive::Restart),
        }
    }

    pub fn with_decider(mut self, decider: Decider) -> Self {
        self.decider = decider;
        self
    }
}

impl Default for OneForOneStrategy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(10))
    }
}

impl SupervisorStrategy for OneForOneStrategy {
    fn handle_failure(&self, supervisor: &mut Context, failure: &Failure) {
        match (self.decider)(&failure.reason) {
            Directive::Resume => {
                tracing::debug!(child = %failure.who, reason = %failure.reason, "resuming failed child");
                supervisor.resume_child(&failure.who);
            }
            Directive::Restart => {
                if failure
                    .stats
                    .request_restart_permission(self.max_retries, self.within)
                {
                    tracing::debug!(child = %failure.who, reason = %failure.reason, "restarting failed child");
                    supervisor.restart_child(&failure.who);
                } else {
                    tracing::warn!(child = %failure.who, reason = %failure.reason, "child failed too often, stopping it");
                    supervisor.stop(&failure.who);
                }
            }
            Directive::Stop => {
                tracing::debug!(child = %failure.who, reason = %failure.reason, "stopping failed child");
                supervisor.stop(&failure.who);
            }
            Directive::Escalate => {
                supervisor.escalate_failure(failure.reason.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_permission_respects_window() {
        let stats = RestartStatistics::new();
        let within = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(stats.request_restart_permission(3, within));
        }
        // fourth failure inside the window exceeds max_retries
        assert!(!stats.request_restart_permission(3, within));
    }

    #[test]
    fn zero_retries_never_allows_restart() {
        let stats = RestartStatistics::new();
        assert!(!stats.request_restart_permission(0, Duration::from_secs(1)));
    }

    #[test]
    fn reset_clears_history() {
        let stats = RestartStatistics::new();
        let within = Duration::from_secs(60);
        for _ in 0..4 {
            stats.request_restart_permission(3, within);
        }
        stats.reset();
        assert_eq!(stats.failure_count(), 0);
        assert!(stats.request_restart_permission(3, within));
    }
}

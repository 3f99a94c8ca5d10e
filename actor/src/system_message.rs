//! System messages.
//!
//! Delivered on the mailbox's system channel, ahead of any queued user
//! messages, and never dropped by backpressure. `SuspendMailbox` and
//! `ResumeMailbox` are consumed by the mailbox itself; everything else is
//! handled by the actor context.

use std::sync::Arc;

use crate::pid::Pid;
use crate::supervision::RestartStatistics;

#[derive(Debug, Clone)]
pub enum SystemMessage {
    /// First message every process receives.
    Started,
    /// Begin a cooperative stop.
    Stop,
    /// Lifecycle notification: the process is about to stop.
    Stopping,
    /// Lifecycle notification: the process has fully stopped.
    Stopped,
    /// Supervisor directive: replace the actor with a fresh incarnation.
    Restart,
    /// Lifecycle notification: the process is about to restart.
    Restarting,
    /// A supervised child failed; carries the escalation details.
    Failure(Failure),
    /// Register the given pid as a watcher of this process.
    Watch(Pid),
    /// Remove the given pid from this process's watchers.
    Unwatch(Pid),
    /// A watched (or child) process terminated.
    Terminated(Pid),
    /// Pause user-message delivery; system messages keep flowing.
    SuspendMailbox,
    /// Undo a previous `SuspendMailbox`.
    ResumeMailbox,
    /// Forwarded to the dead-letter monitor for every dropped envelope.
    DeadLetter { target: Pid },
}

/// Escalation record sent to a parent when a child's invocation panics.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The failing process.
    pub who: Pid,
    /// Rendered panic payload.
    pub reason: String,
    /// The child's failure history, shared so the supervisor strategy can
    /// count restarts across escalations.
    pub stats: Arc<RestartStatistics>,
}

/// Marker sent back to the sender of an envelope that was routed to the
/// dead-letter process. Completes any correlated request future with
/// [`ActorError::DeadLetter`](crate::ActorError::DeadLetter).
#[derive(Debug, Clone)]
pub struct DeadLetterResponse {
    /// The pid the original envelope was addressed to.
    pub target: Pid,
}

//! The actor trait.

use crate::context::Context;
use crate::message::MessageEnvelope;
use crate::pid::Pid;

/// An isolated unit of computation that processes one envelope at a time.
///
/// `receive` is called for user messages; the lifecycle hooks default to
/// no-ops. The context is only valid for the duration of one invocation —
/// the borrow makes retaining it impossible, which is the point.
pub trait Actor: Send + 'static {
    fn receive(&mut self, ctx: &mut Context, envelope: &MessageEnvelope);

    /// First callback after the process is registered.
    fn started(&mut self, _ctx: &mut Context) {}

    /// The process is about to stop; children are still alive.
    fn stopping(&mut self, _ctx: &mut Context) {}

    /// The process has been removed from the registry.
    fn stopped(&mut self, _ctx: &mut Context) {}

    /// A supervisor decided to restart this actor; called on the old
    /// incarnation before it is replaced.
    fn restarting(&mut self, _ctx: &mut Context) {}

    /// A watched process (or a child) terminated.
    fn terminated(&mut self, _ctx: &mut Context, _who: &Pid) {}
}

/// Adapter so a plain closure can act as a stateless actor.
pub(crate) struct FnActor<F>(pub(crate) F);

impl<F> Actor for FnActor<F>
where
    F: Fn(&mut Context, &MessageEnvelope) + Send + 'static,
{
    fn receive(&mut self, ctx: &mut Context, envelope: &MessageEnvelope) {
        (self.0)(ctx, envelope)
    }
}

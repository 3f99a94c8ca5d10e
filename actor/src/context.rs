//! Per-actor execution context.
//!
//! The context is the message invoker registered on the mailbox: it owns the
//! actor instance, drives the lifecycle state machine, and exposes the API
//! user code calls from inside `receive`. Exclusive execution is guaranteed
//! by the mailbox's scheduling flag; the internal mutex only exists so the
//! invoker can be shared as a trait object.
//!
//! Panics inside actor code are caught here, turned into a `Failure` system
//! message to the parent, and the actor's mailbox is suspended until the
//! supervisor decides what to do. The envelope that failed is not replayed.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::actor::Actor;
use crate::error::ActorError;
use crate::future::ActorFuture;
use crate::mailbox::MessageInvoker;
use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::process::{ActorProcess, Process};
use crate::props::Props;
use crate::supervision::RestartStatistics;
use crate::system::ActorSystem;
use crate::system_message::{Failure, SystemMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Alive,
    Restarting,
    Stopping,
    Stopped,
}

/// Handle passed to actor code for the duration of one invocation.
pub struct Context {
    system: Arc<ActorSystem>,
    props: Arc<Props>,
    self_pid: Pid,
    parent: Option<Pid>,
    children: HashSet<Pid>,
    watchers: HashSet<Pid>,
    envelope: Option<MessageEnvelope>,
    state: LifecycleState,
    restart_stats: Arc<RestartStatistics>,
}

impl Context {
    pub fn system(&self) -> &Arc<ActorSystem> {
        &self.system
    }

    pub fn self_pid(&self) -> &Pid {
        &self.self_pid
    }

    pub fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> impl Iterator<Item = &Pid> {
        self.children.iter()
    }

    /// The envelope currently being processed.
    pub fn envelope(&self) -> Option<&MessageEnvelope> {
        self.envelope.as_ref()
    }

    pub fn sender(&self) -> Option<&Pid> {
        self.envelope.as_ref()?.sender.as_ref()
    }

    /// Fire-and-forget send through this actor's sender middleware.
    pub fn send(&self, target: &Pid, envelope: MessageEnvelope) {
        (self.props.sender_chain())(self, target, envelope);
    }

    /// Send with an ephemeral future as the reply target.
    pub fn request(&self, target: &Pid, envelope: MessageEnvelope) -> ActorFuture {
        self.request_with_timeout(target, envelope, self.system.config().request_timeout)
    }

    pub fn request_with_timeout(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
        timeout: Duration,
    ) -> ActorFuture {
        let future = ActorFuture::new(&self.system, timeout);
        let envelope = envelope.with_sender(future.pid().clone());
        self.send(target, envelope);
        future
    }

    /// Reply to the sender of the current envelope. Without a sender the
    /// reply has nowhere to go and is dropped with a log record.
    pub fn respond(&self, envelope: MessageEnvelope) {
        match self.sender().cloned() {
            Some(sender) => {
                let envelope = envelope.with_sender(self.self_pid.clone());
                self.send(&sender, envelope);
            }
            None => {
                tracing::warn!(pid = %self.self_pid, "respond called without a sender");
            }
        }
    }

    /// Spawn a child with a generated id.
    pub fn spawn(&mut self, props: impl Into<Arc<Props>>) -> Result<Pid, ActorError> {
        let segment = self.system.registry().next_id();
        self.spawn_child(props.into(), &segment)
    }

    /// Spawn a child under `self-id/name`.
    pub fn spawn_named(
        &mut self,
        props: impl Into<Arc<Props>>,
        name: &str,
    ) -> Result<Pid, ActorError> {
        self.spawn_child(props.into(), name)
    }

    fn spawn_child(&mut self, props: Arc<Props>, segment: &str) -> Result<Pid, ActorError> {
        let id = format!("{}/{}", self.self_pid.id, segment);
        let pid = props.spawn(&self.system, &id, Some(&self.self_pid))?;
        self.children.insert(pid.clone());
        Ok(pid)
    }

    pub fn stop(&self, pid: &Pid) {
        self.system.stop(pid);
    }

    pub fn stop_self(&self) {
        self.system.stop(&self.self_pid);
    }

    /// Ask to be notified with `terminated` when `pid` stops.
    pub fn watch(&self, pid: &Pid) {
        self.send_system(pid, SystemMessage::Watch(self.self_pid.clone()));
    }

    pub fn unwatch(&self, pid: &Pid) {
        self.send_system(pid, SystemMessage::Unwatch(self.self_pid.clone()));
    }

    /// Supervisor directive: resume a suspended child as-is.
    pub fn resume_child(&self, pid: &Pid) {
        self.send_system(pid, SystemMessage::ResumeMailbox);
    }

    /// Supervisor directive: replace the child's actor instance.
    pub fn restart_child(&self, pid: &Pid) {
        self.send_system(pid, SystemMessage::Restart);
    }

    /// Suspend this actor and pass a failure up to the parent. At the root
    /// the failure is terminal: the actor is stopped.
    pub fn escalate_failure(&mut self, reason: String) {
        self.send_system(&self.self_pid, SystemMessage::SuspendMailbox);
        match self.parent.clone() {
            Some(parent) => {
                let failure = Failure {
                    who: self.self_pid.clone(),
                    reason,
                    stats: Arc::clone(&self.restart_stats),
                };
                self.send_system(&parent, SystemMessage::Failure(failure));
            }
            None => {
                tracing::error!(pid = %self.self_pid, %reason, "failure escalated to the root, stopping actor");
                self.stop_self();
            }
        }
    }

    fn send_system(&self, pid: &Pid, message: SystemMessage) {
        self.system.registry().get(pid).send_system_message(pid, message);
    }
}

struct ContextCell {
    actor: Option<Box<dyn Actor>>,
    ctx: Context,
}

/// The invoker registered on the mailbox; shared `Arc<dyn MessageInvoker>`.
pub(crate) struct ContextHandle {
    cell: Mutex<ContextCell>,
}

impl ContextHandle {
    pub(crate) fn new(
        system: Arc<ActorSystem>,
        props: Arc<Props>,
        self_pid: Pid,
        parent: Option<Pid>,
    ) -> Self {
        let actor = props.produce();
        Self {
            cell: Mutex::new(ContextCell {
                actor: Some(actor),
                ctx: Context {
                    system,
                    props,
                    self_pid,
                    parent,
                    children: HashSet::new(),
                    watchers: HashSet::new(),
                    envelope: None,
                    state: LifecycleState::Alive,
                    restart_stats: Arc::new(RestartStatistics::new()),
                },
            }),
        }
    }

    fn with_actor(cell: &mut ContextCell, f: impl FnOnce(&mut dyn Actor, &mut Context)) {
        if let Some(mut actor) = cell.actor.take() {
            f(actor.as_mut(), &mut cell.ctx);
            cell.actor = Some(actor);
        }
    }

    fn handle_system(&self, cell: &mut ContextCell, message: SystemMessage) {
        match message {
            SystemMessage::Started => Self::with_actor(cell, |actor, ctx| actor.started(ctx)),
            SystemMessage::Stopping => Self::with_actor(cell, |actor, ctx| actor.stopping(ctx)),
            SystemMessage::Stopped => Self::with_actor(cell, |actor, ctx| actor.stopped(ctx)),
            SystemMessage::Restarting => {
                Self::with_actor(cell, |actor, ctx| actor.restarting(ctx))
            }
            SystemMessage::Stop => self.handle_stop(cell),
            SystemMessage::Restart => self.handle_restart(cell),
            SystemMessage::Terminated(who) => self.handle_terminated(cell, who),
            SystemMessage::Watch(watcher) => {
                if matches!(
                    cell.ctx.state,
                    LifecycleState::Stopping | LifecycleState::Stopped
                ) {
                    let self_pid = cell.ctx.self_pid.clone();
                    cell.ctx
                        .send_system(&watcher, SystemMessage::Terminated(self_pid));
                } else {
                    cell.ctx.watchers.insert(watcher);
                }
            }
            SystemMessage::Unwatch(watcher) => {
                cell.ctx.watchers.remove(&watcher);
            }
            SystemMessage::Failure(failure) => {
                let strategy = cell.ctx.props.supervisor();
                strategy.handle_failure(&mut cell.ctx, &failure);
            }
            message @ SystemMessage::DeadLetter { .. } => {
                // surfaced to the monitor actor as a regular envelope
                let envelope = MessageEnvelope::new(message);
                Self::with_actor(cell, |actor, ctx| actor.receive(ctx, &envelope));
            }
            SystemMessage::SuspendMailbox | SystemMessage::ResumeMailbox => {
                // consumed by the mailbox, never reaches the invoker
            }
        }
    }

    fn handle_stop(&self, cell: &mut ContextCell) {
        if matches!(
            cell.ctx.state,
            LifecycleState::Stopping | LifecycleState::Stopped
        ) {
            return;
        }
        cell.ctx.state = LifecycleState::Stopping;
        self.handle_system(cell, SystemMessage::Stopping);

        let children: Vec<Pid> = cell.ctx.children.iter().cloned().collect();
        for child in &children {
            cell.ctx.stop(child);
        }
        self.try_finish(cell);
    }

    fn handle_restart(&self, cell: &mut ContextCell) {
        if cell.ctx.state != LifecycleState::Alive {
            return;
        }
        cell.ctx.state = LifecycleState::Restarting;
        self.handle_system(cell, SystemMessage::Restarting);

        let children: Vec<Pid> = cell.ctx.children.iter().cloned().collect();
        for child in &children {
            cell.ctx.stop(child);
        }
        self.try_finish(cell);
    }

    fn handle_terminated(&self, cell: &mut ContextCell, who: Pid) {
        cell.ctx.children.remove(&who);
        Self::with_actor(cell, |actor, ctx| actor.terminated(ctx, &who));
        self.try_finish(cell);
    }

    /// Stop and restart both wait for all children to terminate first.
    fn try_finish(&self, cell: &mut ContextCell) {
        if !cell.ctx.children.is_empty() {
            return;
        }
        match cell.ctx.state {
            LifecycleState::Stopping => self.finalize_stop(cell),
            LifecycleState::Restarting => self.complete_restart(cell),
            _ => {}
        }
    }

    fn finalize_stop(&self, cell: &mut ContextCell) {
        let self_pid = cell.ctx.self_pid.clone();
        cell.ctx.system.registry().remove(&self_pid);
        self.handle_system(cell, SystemMessage::Stopped);
        cell.ctx.state = LifecycleState::Stopped;

        let watchers: Vec<Pid> = cell.ctx.watchers.drain().collect();
        for watcher in watchers {
            cell.ctx
                .send_system(&watcher, SystemMessage::Terminated(self_pid.clone()));
        }
        if let Some(parent) = cell.ctx.parent.clone() {
            cell.ctx
                .send_system(&parent, SystemMessage::Terminated(self_pid));
        }
    }

    fn complete_restart(&self, cell: &mut ContextCell) {
        cell.actor = Some(cell.ctx.props.produce());
        cell.ctx.state = LifecycleState::Alive;
        let self_pid = cell.ctx.self_pid.clone();
        cell.ctx
            .send_system(&self_pid, SystemMessage::ResumeMailbox);
        self.handle_system(cell, SystemMessage::Started);
    }
}

impl MessageInvoker for ContextHandle {
    fn invoke_system_message(&self, message: SystemMessage) {
        let mut cell = self.cell.lock();
        let cell_ref = &mut *cell;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.handle_system(cell_ref, message)));
        if let Err(payload) = outcome {
            let reason = panic_message(payload);
            tracing::warn!(pid = %cell.ctx.self_pid, %reason, "actor panicked in lifecycle handling");
            cell.ctx.escalate_failure(reason);
        }
    }

    fn invoke_user_message(&self, envelope: MessageEnvelope) {
        let mut cell = self.cell.lock();
        if cell.ctx.state == LifecycleState::Stopped {
            // finalized while the envelope was in flight
            let pid = cell.ctx.self_pid.clone();
            let dead_letter = Arc::clone(cell.ctx.system.registry().dead_letter());
            drop(cell);
            dead_letter.send_user_message(&pid, envelope);
            return;
        }

        cell.ctx.envelope = Some(envelope.clone());
        let chain = cell.ctx.props.receiver_chain();

        let mut actor = match cell.actor.take() {
            Some(actor) => actor,
            None => return,
        };
        let cell_ref = &mut *cell;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            chain(&mut cell_ref.ctx, actor.as_mut(), &envelope)
        }));
        cell.actor = Some(actor);
        cell.ctx.envelope = None;

        if let Err(payload) = outcome {
            let reason = panic_message(payload);
            tracing::warn!(pid = %cell.ctx.self_pid, %reason, "actor panicked, escalating to supervisor");
            cell.ctx.escalate_failure(reason);
        }
    }
}

/// The default spawner: allocate the mailbox, bind the process, wire the
/// invoker and deliver `Started` before any user message.
pub(crate) fn default_spawn(
    system: &Arc<ActorSystem>,
    id: &str,
    props: &Arc<Props>,
    parent: Option<&Pid>,
) -> Result<Pid, ActorError> {
    let mailbox = props.produce_mailbox();
    let process: Arc<dyn Process> = Arc::new(ActorProcess::new(Arc::clone(&mailbox)));
    let (pid, inserted) = system.registry().add(process, id);
    if !inserted {
        return Err(ActorError::NameExists(id.to_string()));
    }

    let invoker = Arc::new(ContextHandle::new(
        Arc::clone(system),
        Arc::clone(props),
        pid.clone(),
        parent.cloned(),
    ));
    mailbox.register_handlers(invoker, props.dispatcher_or(system.dispatcher()));
    mailbox.post_system_message(SystemMessage::Started);
    mailbox.start();
    Ok(pid)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

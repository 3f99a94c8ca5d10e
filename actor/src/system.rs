//! The actor system: registry, dead letter and root context.
//!
//! Everything global lives on this value and is passed around explicitly;
//! there is no module-level mutable state. Creating a system captures the
//! current tokio runtime, which then executes every mailbox run, future
//! timer and dispatcher job.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::SystemConfig;
use crate::dead_letter::DeadLetterProcess;
use crate::dispatch::{Dispatcher, TokioDispatcher};
use crate::error::ActorError;
use crate::future::ActorFuture;
use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::process::Process;
use crate::props::Props;
use crate::registry::ProcessRegistry;

pub struct ActorSystem {
    config: SystemConfig,
    registry: ProcessRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
    dead_letter_monitor: OnceLock<Pid>,
}

impl ActorSystem {
    /// Must be called from within a tokio runtime context.
    pub fn new() -> Arc<Self> {
        Self::with_config(SystemConfig::default())
    }

    pub fn with_config(config: SystemConfig) -> Arc<Self> {
        let runtime = Handle::current();
        Arc::new_cyclic(|weak| {
            let dead_letter: Arc<dyn Process> = Arc::new(DeadLetterProcess {
                system: weak.clone(),
            });
            ActorSystem {
                registry: ProcessRegistry::new("local", dead_letter),
                dispatcher: Arc::new(TokioDispatcher::with_handle(
                    runtime.clone(),
                    config.throughput,
                )),
                runtime,
                config,
                dead_letter_monitor: OnceLock::new(),
            }
        })
    }

    pub fn root(self: &Arc<Self>) -> RootContext {
        RootContext {
            system: Arc::clone(self),
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn address(&self) -> &str {
        self.registry.address()
    }

    /// Resolve and send without going through any context middleware.
    pub fn send(&self, pid: &Pid, envelope: MessageEnvelope) {
        self.registry.get(pid).send_user_message(pid, envelope);
    }

    pub fn stop(&self, pid: &Pid) {
        self.registry.get(pid).stop(pid);
    }

    /// Register the pid that receives a `SystemMessage::DeadLetter` for
    /// every dropped envelope. First caller wins.
    pub fn watch_dead_letters(&self, monitor: Pid) {
        if self.dead_letter_monitor.set(monitor).is_err() {
            tracing::warn!("dead-letter monitor is already registered");
        }
    }

    pub(crate) fn dead_letter_monitor(&self) -> Option<&Pid> {
        self.dead_letter_monitor.get()
    }
}

/// Entry point for spawning and messaging from outside any actor.
#[derive(Clone)]
pub struct RootContext {
    system: Arc<ActorSystem>,
}

impl RootContext {
    pub fn system(&self) -> &Arc<ActorSystem> {
        &self.system
    }

    /// Spawn a top-level actor under a generated id.
    pub fn spawn(&self, props: impl Into<Arc<Props>>) -> Result<Pid, ActorError> {
        let id = self.system.registry.next_id();
        props.into().spawn(&self.system, &id, None)
    }

    /// Spawn a top-level actor under the given id. Root ids are unique
    /// within the system.
    pub fn spawn_named(&self, props: impl Into<Arc<Props>>, id: &str) -> Result<Pid, ActorError> {
        props.into().spawn(&self.system, id, None)
    }

    pub fn send(&self, pid: &Pid, envelope: MessageEnvelope) {
        self.system.send(pid, envelope);
    }

    /// Send with an ephemeral future as the reply target.
    pub fn request(&self, pid: &Pid, envelope: MessageEnvelope) -> ActorFuture {
        self.request_with_timeout(pid, envelope, self.system.config.request_timeout)
    }

    pub fn request_with_timeout(
        &self,
        pid: &Pid,
        envelope: MessageEnvelope,
        timeout: Duration,
    ) -> ActorFuture {
        let future = ActorFuture::new(&self.system, timeout);
        let envelope = envelope.with_sender(future.pid().clone());
        self.system.send(pid, envelope);
        future
    }

    pub fn stop(&self, pid: &Pid) {
        self.system.stop(pid);
    }
}

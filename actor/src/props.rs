//! Spawn configuration.
//!
//! `Props` bundles everything needed to bring a process to life: the actor
//! producer, the mailbox producer, the supervisor strategy for its children
//! and the middleware chains. Middleware composes outermost-first; the
//! composed chains are cached on first use, after which the props are
//! effectively immutable.

use std::sync::{Arc, OnceLock};

use crate::actor::{Actor, FnActor};
use crate::context::{default_spawn, Context};
use crate::error::ActorError;
use crate::mailbox::Mailbox;
use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::process::Process;
use crate::supervision::{OneForOneStrategy, SupervisorStrategy};
use crate::system::ActorSystem;
use crate::Dispatcher;

pub type ActorProducer = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;
pub type MailboxProducer = Arc<dyn Fn() -> Arc<Mailbox> + Send + Sync>;

pub type ReceiverFn = Arc<dyn Fn(&mut Context, &mut dyn Actor, &MessageEnvelope) + Send + Sync>;
pub type ReceiverMiddleware = Arc<dyn Fn(ReceiverFn) -> ReceiverFn + Send + Sync>;

pub type SenderFn = Arc<dyn Fn(&Context, &Pid, MessageEnvelope) + Send + Sync>;
pub type SenderMiddleware = Arc<dyn Fn(SenderFn) -> SenderFn + Send + Sync>;

pub type SpawnFn = Arc<
    dyn Fn(&Arc<ActorSystem>, &str, &Arc<Props>, Option<&Pid>) -> Result<Pid, ActorError>
        + Send
        + Sync,
>;
pub type SpawnMiddleware = Arc<dyn Fn(SpawnFn) -> SpawnFn + Send + Sync>;

pub struct Props {
    producer: ActorProducer,
    mailbox_producer: MailboxProducer,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    supervisor: Arc<dyn SupervisorStrategy>,
    sender_middleware: Vec<SenderMiddleware>,
    receiver_middleware: Vec<ReceiverMiddleware>,
    spawn_middleware: Vec<SpawnMiddleware>,
    spawner: Option<SpawnFn>,
    sender_chain: OnceLock<SenderFn>,
    receiver_chain: OnceLock<ReceiverFn>,
    spawn_chain: OnceLock<SpawnFn>,
}

impl Props {
    pub fn from_producer(
        producer: impl Fn() -> Box<dyn Actor> + Send + Sync + 'static,
    ) -> Self {
        Self {
            producer: Arc::new(producer),
            mailbox_producer: Arc::new(|| Arc::new(Mailbox::new())),
            dispatcher: None,
            supervisor: Arc::new(OneForOneStrategy::default()),
            sender_middleware: Vec::new(),
            receiver_middleware: Vec::new(),
            spawn_middleware: Vec::new(),
            spawner: None,
            sender_chain: OnceLock::new(),
            receiver_chain: OnceLock::new(),
            spawn_chain: OnceLock::new(),
        }
    }

    /// Props for a stateless receive closure.
    pub fn from_fn(
        receive: impl Fn(&mut Context, &MessageEnvelope) + Send + Sync + Clone + 'static,
    ) -> Self {
        Self::from_producer(move || Box::new(FnActor(receive.clone())))
    }

    pub fn with_mailbox_producer(
        mut self,
        producer: impl Fn() -> Arc<Mailbox> + Send + Sync + 'static,
    ) -> Self {
        self.mailbox_producer = Arc::new(producer);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_supervisor(mut self, strategy: Arc<dyn SupervisorStrategy>) -> Self {
        self.supervisor = strategy;
        self
    }

    pub fn with_sender_middleware(mut self, middleware: SenderMiddleware) -> Self {
        self.sender_middleware.push(middleware);
        self
    }

    pub fn with_receiver_middleware(mut self, middleware: ReceiverMiddleware) -> Self {
        self.receiver_middleware.push(middleware);
        self
    }

    pub fn with_spawn_middleware(mut self, middleware: SpawnMiddleware) -> Self {
        self.spawn_middleware.push(middleware);
        self
    }

    pub fn with_spawner(mut self, spawner: SpawnFn) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub(crate) fn produce(&self) -> Box<dyn Actor> {
        (self.producer)()
    }

    pub(crate) fn produce_mailbox(&self) -> Arc<Mailbox> {
        (self.mailbox_producer)()
    }

    pub(crate) fn dispatcher_or(&self, fallback: &Arc<dyn Dispatcher>) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone().unwrap_or_else(|| Arc::clone(fallback))
    }

    pub(crate) fn supervisor(&self) -> Arc<dyn SupervisorStrategy> {
        Arc::clone(&self.supervisor)
    }

    /// Composed receiver chain, innermost call being `actor.receive`.
    pub(crate) fn receiver_chain(&self) -> ReceiverFn {
        self.receiver_chain
            .get_or_init(|| {
                let base: ReceiverFn =
                    Arc::new(|ctx: &mut Context, actor: &mut dyn Actor, env: &MessageEnvelope| {
                        actor.receive(ctx, env)
                    });
                self.receiver_middleware
                    .iter()
                    .rev()
                    .fold(base, |next, middleware| middleware(next))
            })
            .clone()
    }

    /// Composed sender chain, innermost call resolving the pid and posting.
    pub(crate) fn sender_chain(&self) -> SenderFn {
        self.sender_chain
            .get_or_init(|| {
                let base: SenderFn = Arc::new(|ctx: &Context, target: &Pid, env: MessageEnvelope| {
                    ctx.system().registry().get(target).send_user_message(target, env);
                });
                self.sender_middleware
                    .iter()
                    .rev()
                    .fold(base, |next, middleware| middleware(next))
            })
            .clone()
    }

    pub(crate) fn spawn(
        self: &Arc<Self>,
        system: &Arc<ActorSystem>,
        id: &str,
        parent: Option<&Pid>,
    ) -> Result<Pid, ActorError> {
        let chain = self
            .spawn_chain
            .get_or_init(|| {
                let base: SpawnFn = match &self.spawner {
                    Some(spawner) => Arc::clone(spawner),
                    None => Arc::new(default_spawn),
                };
                self.spawn_middleware
                    .iter()
                    .rev()
                    .fold(base, |next, middleware| middleware(next))
            })
            .clone();
        chain(system, id, self, parent)
    }
}

//! Actor runtime for the dynamo session framework.
//!
//! Location-transparent message passing with supervision, modeled after the
//! classic process/mailbox design:
//!
//! - every process is addressed by a [`Pid`] resolved through the sharded
//!   [`ProcessRegistry`]; undeliverable messages go to the dead-letter
//!   process,
//! - a [`Mailbox`] couples two FIFO queues (system, user) to a dispatcher;
//!   the scheduling flag guarantees at most one concurrent run per actor,
//! - [`Props`] describe how to spawn an actor (producer, mailbox,
//!   supervisor, middleware), and the per-invocation [`Context`] is what
//!   actor code talks to,
//! - [`ActorFuture`] is a one-shot addressable sink backing request/response,
//!   with guaranteed timeout cleanup.
//!
//! Systems must be created inside a tokio runtime; mailbox runs, future
//! timers and everything else execute on that runtime.
//!
//! ```ignore
//! let system = ActorSystem::new();
//! let root = system.root();
//! let echo = root.spawn_named(
//!     Props::from_fn(|ctx, env| {
//!         if env.message_as::<String>().is_some() {
//!             ctx.respond(MessageEnvelope::from_arc(env.message.clone()));
//!         }
//!     }),
//!     "echo",
//! )?;
//! let reply = root.request(&echo, MessageEnvelope::new("ping".to_string()));
//! let envelope = reply.result().await?;
//! ```

pub mod actor;
pub mod config;
pub mod context;
mod dead_letter;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod mailbox;
pub mod message;
pub mod pid;
pub mod process;
pub mod props;
pub mod queue;
pub mod registry;
pub mod supervision;
pub mod system;
pub mod system_message;

pub use actor::Actor;
pub use config::SystemConfig;
pub use context::Context;
pub use dispatch::{Dispatcher, TokioDispatcher};
pub use error::ActorError;
pub use future::ActorFuture;
pub use mailbox::{Mailbox, MessageInvoker};
pub use message::{AnyMessage, MessageEnvelope};
pub use pid::Pid;
pub use process::{ActorProcess, Process};
pub use props::Props;
pub use queue::RingQueue;
pub use registry::ProcessRegistry;
pub use supervision::{
    Decider, Directive, OneForOneStrategy, RestartStatistics, SupervisorStrategy,
};
pub use system::{ActorSystem, RootContext};
pub use system_message::{DeadLetterResponse, Failure, SystemMessage};

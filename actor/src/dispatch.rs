//! Mailbox dispatchers.
//!
//! A dispatcher decides where a mailbox processing run executes and how many
//! user messages it may invoke before yielding. The default hands runs to the
//! tokio runtime the actor system was created on.

use tokio::runtime::Handle;

pub trait Dispatcher: Send + Sync + 'static {
    /// Run a mailbox processing job. The job is self-contained and
    /// re-schedules itself through this dispatcher if work remains.
    fn schedule(&self, job: Box<dyn FnOnce() + Send>);

    /// User-message quota per processing run.
    fn throughput(&self) -> usize;
}

/// Schedules mailbox runs as tasks on a captured tokio runtime handle.
pub struct TokioDispatcher {
    handle: Handle,
    throughput: usize,
}

impl TokioDispatcher {
    /// Captures the current runtime. Must be called from within a tokio
    /// runtime context.
    pub fn new(throughput: usize) -> Self {
        Self::with_handle(Handle::current(), throughput)
    }

    pub fn with_handle(handle: Handle, throughput: usize) -> Self {
        Self { handle, throughput }
    }
}

impl Dispatcher for TokioDispatcher {
    fn schedule(&self, job: Box<dyn FnOnce() + Send>) {
        self.handle.spawn(async move { job() });
    }

    fn throughput(&self) -> usize {
        self.throughput
    }
}

//! Request/response futures.
//!
//! A future is a one-shot addressable sink: it registers an ephemeral
//! process in the registry, and whoever replies to that pid completes it.
//! Completion happens exactly once, from whichever fires first of result
//! delivery, timeout, or a dead-letter response; everything after that is
//! dropped. Completion also fans the outcome out to any `pipe_to` targets
//! and unregisters the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::ActorError;
use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::process::Process;
use crate::system::ActorSystem;
use crate::system_message::{DeadLetterResponse, SystemMessage};

pub struct ActorFuture {
    inner: Arc<FutureInner>,
}

struct FutureInner {
    pid: Pid,
    system: Arc<ActorSystem>,
    done: AtomicBool,
    state: Mutex<FutureState>,
    notify: Notify,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct FutureState {
    result: Option<Result<MessageEnvelope, ActorError>>,
    pipes: Vec<Pid>,
}

impl ActorFuture {
    /// Register a new future process with the given timeout.
    pub fn new(system: &Arc<ActorSystem>, timeout: Duration) -> Self {
        let id = system.registry().next_id();
        let pid = Pid::new(system.registry().address(), id.clone());

        let inner = Arc::new(FutureInner {
            pid,
            system: Arc::clone(system),
            done: AtomicBool::new(false),
            state: Mutex::new(FutureState {
                result: None,
                pipes: Vec::new(),
            }),
            notify: Notify::new(),
            timer: Mutex::new(None),
        });

        let process: Arc<dyn Process> = Arc::new(FutureProcess {
            inner: Arc::clone(&inner),
        });
        system.registry().add(process, &id);

        let timer_inner = Arc::clone(&inner);
        let timer = system.runtime().spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_inner.complete(Err(ActorError::Timeout));
        });
        *inner.timer.lock() = Some(timer);

        Self { inner }
    }

    /// The addressable pid; sending an envelope here delivers the result.
    pub fn pid(&self) -> &Pid {
        &self.inner.pid
    }

    /// Record a completion sink. An already-completed future forwards the
    /// stored outcome immediately.
    pub fn pipe_to(&self, target: Pid) {
        let ready = {
            let mut state = self.inner.state.lock();
            match &state.result {
                Some(result) => Some(result.clone()),
                None => {
                    state.pipes.push(target.clone());
                    None
                }
            }
        };
        if let Some(result) = ready {
            self.inner.deliver(&target, FutureInner::result_envelope(&result));
        }
    }

    /// Block until completion. Idempotent afterwards.
    pub async fn result(&self) -> Result<MessageEnvelope, ActorError> {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.done.load(Ordering::Acquire) {
                if let Some(result) = self.inner.state.lock().result.clone() {
                    return result;
                }
            }
            notified.await;
        }
    }

    /// As `result`, discarding the value.
    pub async fn wait(&self) -> Result<(), ActorError> {
        self.result().await.map(|_| ())
    }

    #[cfg(test)]
    fn pipe_count(&self) -> usize {
        self.inner.state.lock().pipes.len()
    }
}

impl FutureInner {
    fn result_envelope(result: &Result<MessageEnvelope, ActorError>) -> MessageEnvelope {
        match result {
            Ok(envelope) => envelope.clone(),
            Err(error) => MessageEnvelope::new(error.clone()),
        }
    }

    fn deliver(&self, target: &Pid, envelope: MessageEnvelope) {
        self.system
            .registry()
            .get(target)
            .send_user_message(target, envelope);
    }

    fn complete(&self, result: Result<MessageEnvelope, ActorError>) {
        let pipes = {
            let mut state = self.state.lock();
            if state.result.is_some() {
                // late arrival after completion
                return;
            }
            state.result = Some(result.clone());
            self.done.store(true, Ordering::Release);
            std::mem::take(&mut state.pipes)
        };

        let envelope = Self::result_envelope(&result);
        for target in &pipes {
            self.deliver(target, envelope.clone());
        }

        self.system.registry().remove(&self.pid);
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.notify.notify_waiters();
    }
}

struct FutureProcess {
    inner: Arc<FutureInner>,
}

impl Process for FutureProcess {
    fn send_user_message(&self, _pid: &Pid, envelope: MessageEnvelope) {
        if envelope.message_as::<DeadLetterResponse>().is_some() {
            self.inner.complete(Err(ActorError::DeadLetter));
        } else {
            self.inner.complete(Ok(envelope));
        }
    }

    fn send_system_message(&self, _pid: &Pid, message: SystemMessage) {
        if matches!(message, SystemMessage::Stop) {
            self.inner.complete(Err(ActorError::DeadLetter));
        }
    }

    fn stop(&self, _pid: &Pid) {
        self.inner.complete(Err(ActorError::DeadLetter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::ActorSystem;

    struct CaptureProcess {
        received: Mutex<Vec<MessageEnvelope>>,
    }

    impl CaptureProcess {
        fn register(system: &Arc<ActorSystem>, id: &str) -> (Pid, Arc<CaptureProcess>) {
            let capture = Arc::new(CaptureProcess {
                received: Mutex::new(Vec::new()),
            });
            let process: Arc<dyn Process> = Arc::clone(&capture) as Arc<dyn Process>;
            let (pid, inserted) = system.registry().add(process, id);
            assert!(inserted);
            (pid, capture)
        }

        fn messages(&self) -> Vec<MessageEnvelope> {
            self.received.lock().clone()
        }
    }

    impl Process for CaptureProcess {
        fn send_user_message(&self, _pid: &Pid, envelope: MessageEnvelope) {
            self.received.lock().push(envelope);
        }
        fn send_system_message(&self, _pid: &Pid, _message: SystemMessage) {}
        fn stop(&self, _pid: &Pid) {}
    }

    #[tokio::test]
    async fn pipes_receive_the_result() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_secs(1));

        let (p1, c1) = CaptureProcess::register(&system, "p1");
        let (p2, c2) = CaptureProcess::register(&system, "p2");
        let (p3, c3) = CaptureProcess::register(&system, "p3");
        future.pipe_to(p1);
        future.pipe_to(p2);
        future.pipe_to(p3);

        let pid = future.pid().clone();
        system
            .registry()
            .get(&pid)
            .send_user_message(&pid, MessageEnvelope::new("hello".to_string()));

        for capture in [&c1, &c2, &c3] {
            let messages = capture.messages();
            assert_eq!(messages.len(), 1);
            assert_eq!(
                messages[0].message_as::<String>().map(String::as_str),
                Some("hello")
            );
        }
        assert_eq!(future.pipe_count(), 0, "pipes were not cleared");

        let result = future.result().await.unwrap();
        assert_eq!(result.message_as::<String>().map(String::as_str), Some("hello"));
    }

    #[tokio::test]
    async fn pipes_receive_timeout_error() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_millis(10));

        let (p1, c1) = CaptureProcess::register(&system, "p1");
        let (p2, c2) = CaptureProcess::register(&system, "p2");
        future.pipe_to(p1);
        future.pipe_to(p2);

        assert_eq!(future.wait().await, Err(ActorError::Timeout));

        for capture in [&c1, &c2] {
            let messages = capture.messages();
            assert_eq!(messages.len(), 1);
            assert_eq!(
                messages[0].message_as::<ActorError>(),
                Some(&ActorError::Timeout)
            );
        }
        assert_eq!(future.pipe_count(), 0, "pipes were not cleared");
    }

    #[tokio::test]
    async fn dead_letter_response_completes_with_error() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_secs(1));

        let pid = future.pid().clone();
        system.registry().get(&pid).send_user_message(
            &pid,
            MessageEnvelope::new(DeadLetterResponse { target: pid.clone() }),
        );

        assert_eq!(future.result().await, Err(ActorError::DeadLetter));
    }

    #[tokio::test]
    async fn result_times_out_without_reply() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_millis(20));
        assert_eq!(future.result().await, Err(ActorError::Timeout));
        // idempotent after completion
        assert_eq!(future.result().await, Err(ActorError::Timeout));
    }

    #[tokio::test]
    async fn late_arrivals_are_dropped() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_secs(1));

        let pid = future.pid().clone();
        let process = system.registry().get(&pid);
        process.send_user_message(&pid, MessageEnvelope::new("first".to_string()));
        process.send_user_message(&pid, MessageEnvelope::new("second".to_string()));

        let result = future.result().await.unwrap();
        assert_eq!(result.message_as::<String>().map(String::as_str), Some("first"));
    }

    #[tokio::test]
    async fn completion_unregisters_the_process() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_millis(10));
        let id = future.pid().id.clone();
        assert!(system.registry().get_local(&id).is_some());

        let _ = future.wait().await;
        assert!(system.registry().get_local(&id).is_none());
    }

    #[tokio::test]
    async fn pipe_after_completion_forwards_immediately() {
        let system = ActorSystem::new();
        let future = ActorFuture::new(&system, Duration::from_secs(1));

        let pid = future.pid().clone();
        system
            .registry()
            .get(&pid)
            .send_user_message(&pid, MessageEnvelope::new(7u32));
        let _ = future.result().await;

        let (p1, c1) = CaptureProcess::register(&system, "late-pipe");
        future.pipe_to(p1);
        assert_eq!(c1.messages().len(), 1);
        assert_eq!(c1.messages()[0].message_as::<u32>(), Some(&7));
    }
}

//! The mailbox couples an actor to its dispatcher.
//!
//! Two ring queues (system, user) feed a processing loop that is guaranteed
//! to run on at most one worker at a time: every post tries to flip the
//! `scheduled` flag 0→1 with a compare-and-swap, and only the winner hands a
//! run to the dispatcher. The run drains system messages first (re-checking
//! the system queue on every iteration), skips user messages while
//! suspended, and gives the worker back after `throughput` user messages,
//! re-dispatching itself if either queue is still non-empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::message::MessageEnvelope;
use crate::queue::RingQueue;
use crate::system_message::SystemMessage;
use crate::Dispatcher;

/// Receives the messages a mailbox run pops. Implemented by the actor
/// context; must catch its own panics and turn them into failure escalation.
pub trait MessageInvoker: Send + Sync + 'static {
    fn invoke_system_message(&self, message: SystemMessage);
    fn invoke_user_message(&self, envelope: MessageEnvelope);
}

pub struct Mailbox {
    user_queue: RingQueue<MessageEnvelope>,
    system_queue: RingQueue<SystemMessage>,
    scheduled: AtomicBool,
    suspended: AtomicBool,
    invoker: OnceLock<Arc<dyn MessageInvoker>>,
    dispatcher: OnceLock<Arc<dyn Dispatcher>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            user_queue: RingQueue::new(),
            system_queue: RingQueue::new(),
            scheduled: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            invoker: OnceLock::new(),
            dispatcher: OnceLock::new(),
        }
    }

    /// Wire the mailbox to its consumer. Must happen before the first post;
    /// later calls are ignored.
    pub fn register_handlers(&self, invoker: Arc<dyn MessageInvoker>, dispatcher: Arc<dyn Dispatcher>) {
        let _ = self.invoker.set(invoker);
        let _ = self.dispatcher.set(dispatcher);
    }

    pub fn post_user_message(self: &Arc<Self>, envelope: MessageEnvelope) {
        self.user_queue.push(envelope);
        self.schedule();
    }

    pub fn post_system_message(self: &Arc<Self>, message: SystemMessage) {
        self.system_queue.push(message);
        self.schedule();
    }

    pub fn start(self: &Arc<Self>) {
        self.schedule();
    }

    fn schedule(self: &Arc<Self>) {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let (Some(dispatcher), Some(_)) = (self.dispatcher.get(), self.invoker.get()) else {
                // not wired up yet; the spawner schedules again via start()
                self.scheduled.store(false, Ordering::SeqCst);
                return;
            };
            let mailbox = Arc::clone(self);
            dispatcher.schedule(Box::new(move || mailbox.process_messages()));
        }
    }

    fn process_messages(self: Arc<Self>) {
        self.run();

        self.scheduled.store(false, Ordering::SeqCst);
        let has_system = !self.system_queue.is_empty();
        let has_user = !self.suspended.load(Ordering::SeqCst) && !self.user_queue.is_empty();
        if has_system || has_user {
            // yield the worker between runs; the CAS keeps exclusivity
            self.schedule();
        }
    }

    fn run(&self) {
        let (Some(invoker), Some(dispatcher)) = (self.invoker.get(), self.dispatcher.get()) else {
            return;
        };
        let throughput = dispatcher.throughput().max(1);

        let mut processed = 0;
        loop {
            // system messages preempt user work on every iteration
            if let Some(message) = self.system_queue.pop() {
                match message {
                    SystemMessage::SuspendMailbox => {
                        self.suspended.store(true, Ordering::SeqCst);
                    }
                    SystemMessage::ResumeMailbox => {
                        self.suspended.store(false, Ordering::SeqCst);
                    }
                    other => invoker.invoke_system_message(other),
                }
                continue;
            }

            if self.suspended.load(Ordering::SeqCst) {
                return;
            }

            if processed >= throughput {
                return;
            }

            match self.user_queue.pop() {
                Some(envelope) => {
                    processed += 1;
                    invoker.invoke_user_message(envelope);
                }
                None => return,
            }
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recording {
        order: Mutex<Vec<String>>,
        running: AtomicUsize,
        overlapped: AtomicBool,
    }

    struct RecordingInvoker(Arc<Recording>);

    impl MessageInvoker for RecordingInvoker {
        fn invoke_system_message(&self, message: SystemMessage) {
            self.0.order.lock().unwrap().push(format!("sys:{:?}", std::mem::discriminant(&message)));
        }

        fn invoke_user_message(&self, envelope: MessageEnvelope) {
            if self.0.running.fetch_add(1, Ordering::SeqCst) != 0 {
                self.0.overlapped.store(true, Ordering::SeqCst);
            }
            // widen the window in which a second worker could overlap
            std::thread::sleep(Duration::from_micros(50));
            let label = envelope
                .message_as::<String>()
                .cloned()
                .unwrap_or_default();
            self.0.order.lock().unwrap().push(label);
            self.0.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn recording_mailbox(throughput: usize) -> (Arc<Mailbox>, Arc<Recording>) {
        let mailbox = Arc::new(Mailbox::new());
        let recording = Arc::new(Recording {
            order: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        });
        mailbox.register_handlers(
            Arc::new(RecordingInvoker(Arc::clone(&recording))),
            Arc::new(crate::TokioDispatcher::new(throughput)),
        );
        (mailbox, recording)
    }

    async fn settle(mailbox: &Arc<Mailbox>, recording: &Recording, expected: usize) {
        for _ in 0..500 {
            if recording.order.lock().unwrap().len() >= expected
                && mailbox.user_queue.is_empty()
                && mailbox.system_queue.is_empty()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("mailbox did not settle");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn invocations_never_overlap() {
        let (mailbox, recording) = recording_mailbox(5);

        let mut handles = Vec::new();
        for p in 0..4 {
            let mailbox = Arc::clone(&mailbox);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    mailbox.post_user_message(MessageEnvelope::new(format!("{p}:{i}")));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        settle(&mailbox, &recording, 400).await;
        assert!(!recording.overlapped.load(Ordering::SeqCst));
        assert_eq!(recording.order.lock().unwrap().len(), 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn per_sender_fifo_is_preserved() {
        let (mailbox, recording) = recording_mailbox(300);

        for i in 0..200 {
            mailbox.post_user_message(MessageEnvelope::new(format!("a:{i}")));
        }
        settle(&mailbox, &recording, 200).await;

        let order = recording.order.lock().unwrap();
        let expected: Vec<String> = (0..200).map(|i| format!("a:{i}")).collect();
        assert_eq!(*order, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn suspend_holds_user_messages_but_not_system() {
        let (mailbox, recording) = recording_mailbox(300);

        mailbox.post_system_message(SystemMessage::SuspendMailbox);
        mailbox.post_user_message(MessageEnvelope::new("held".to_string()));
        mailbox.post_system_message(SystemMessage::Started);
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let order = recording.order.lock().unwrap();
            assert_eq!(order.len(), 1, "only the system message should land: {order:?}");
        }

        mailbox.post_system_message(SystemMessage::ResumeMailbox);
        settle(&mailbox, &recording, 2).await;
        assert_eq!(recording.order.lock().unwrap().last().map(String::as_str), Some("held"));
    }
}

//! The base contract every addressable process implements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::mailbox::Mailbox;
use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::system_message::SystemMessage;

pub trait Process: Send + Sync + 'static {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope);
    fn send_system_message(&self, pid: &Pid, message: SystemMessage);
    fn stop(&self, pid: &Pid);

    /// Flagged by the registry on removal so stale handles can tell.
    fn set_dead(&self) {}
}

/// An actor-backed process: forwards everything to the mailbox.
pub struct ActorProcess {
    mailbox: Arc<Mailbox>,
    dead: AtomicBool,
}

impl ActorProcess {
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self {
            mailbox,
            dead: AtomicBool::new(false),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }
}

impl Process for ActorProcess {
    fn send_user_message(&self, _pid: &Pid, envelope: MessageEnvelope) {
        self.mailbox.post_user_message(envelope);
    }

    fn send_system_message(&self, _pid: &Pid, message: SystemMessage) {
        self.mailbox.post_system_message(message);
    }

    fn stop(&self, _pid: &Pid) {
        self.dead.store(true, Ordering::SeqCst);
        self.mailbox.post_system_message(SystemMessage::Stop);
    }

    fn set_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}

//! The dead-letter process: terminal destination for undeliverable messages.
//!
//! Every drop is logged. If the dropped envelope names a sender, a
//! `DeadLetterResponse` goes back to it, which is how request futures whose
//! target died resolve instead of waiting out their timeout. A monitor pid
//! registered on the system additionally receives a
//! `SystemMessage::DeadLetter` per drop.

use std::sync::Weak;

use crate::message::MessageEnvelope;
use crate::pid::Pid;
use crate::process::Process;
use crate::system::ActorSystem;
use crate::system_message::{DeadLetterResponse, SystemMessage};

pub(crate) struct DeadLetterProcess {
    pub(crate) system: Weak<ActorSystem>,
}

impl DeadLetterProcess {
    fn notify_monitor(&self, system: &ActorSystem, target: &Pid) {
        if let Some(monitor) = system.dead_letter_monitor() {
            system.registry().get(monitor).send_system_message(
                monitor,
                SystemMessage::DeadLetter {
                    target: target.clone(),
                },
            );
        }
    }
}

impl Process for DeadLetterProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        let Some(system) = self.system.upgrade() else {
            return;
        };
        tracing::debug!(target_pid = %pid, sender = ?envelope.sender, "dead letter");
        self.notify_monitor(&system, pid);

        if let Some(sender) = &envelope.sender {
            let response = MessageEnvelope::new(DeadLetterResponse { target: pid.clone() });
            system
                .registry()
                .get(sender)
                .send_user_message(sender, response);
        }
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        let Some(system) = self.system.upgrade() else {
            return;
        };
        match message {
            // watching a dead process resolves immediately
            SystemMessage::Watch(watcher) => {
                system
                    .registry()
                    .get(&watcher)
                    .send_system_message(&watcher, SystemMessage::Terminated(pid.clone()));
            }
            other => {
                tracing::debug!(target_pid = %pid, message = ?other, "dead letter (system)");
                self.notify_monitor(&system, pid);
            }
        }
    }

    fn stop(&self, _pid: &Pid) {}
}

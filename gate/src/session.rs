//! The session handle given to application handlers.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dynamo_actor::{ActorSystem, MessageEnvelope, Pid};
use dynamo_protocol::{decode_route, MessageType, Route};

use crate::agent::AgentMessage;
use crate::error::GateError;

/// Cloneable handle to a live session's agent actor. Handlers use it to push
/// server-initiated messages, kick misbehaving clients, or close outright.
#[derive(Clone)]
pub struct Session {
    pub(crate) id: u64,
    pub(crate) pid: Pid,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) system: Arc<ActorSystem>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pid of the per-session agent actor.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Server-initiated push on the given route.
    pub fn push(&self, route: &str, data: Vec<u8>) -> Result<(), GateError> {
        let route = decode_route(route)?;
        self.system.send(
            &self.pid,
            MessageEnvelope::new(AgentMessage::Push { route, data }),
        );
        Ok(())
    }

    /// Send a kick packet and close the session.
    pub fn kick(&self) {
        self.system
            .send(&self.pid, MessageEnvelope::new(AgentMessage::Kick));
    }

    /// Close the session without a kick.
    pub fn close(&self) {
        self.system
            .send(&self.pid, MessageEnvelope::new(AgentMessage::Close));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// Delivered to every registered service when a session finishes its
/// handshake and enters the working state.
#[derive(Debug, Clone)]
pub struct SessionBound {
    pub session: Session,
}

/// Delivered to every registered service when a session closes.
#[derive(Debug, Clone)]
pub struct SessionClosed {
    pub session_id: u64,
}

/// A decoded client message, routed to the handler registered for
/// `route.service`. For requests the envelope's sender is an ephemeral
/// future; reply with `ctx.respond(MessageEnvelope::new(bytes))` where the
/// payload is `Vec<u8>`, or an
/// [`ErrorPayload`](dynamo_protocol::ErrorPayload) for an error reply.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub session: Session,
    pub route: Route,
    pub kind: MessageType,
    pub data: Vec<u8>,
}

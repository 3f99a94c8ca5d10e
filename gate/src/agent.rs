//! The per-session agent.
//!
//! Every accepted connection is bound to one agent actor that owns the
//! session state machine: `Handshake → HandshakeAck → Working → Closed`.
//! Three tasks orbit the actor:
//!
//! - the read pump turns wire frames into `PacketIn` messages,
//! - the monitor posts the handshake deadline and heartbeat checks,
//! - the writer drains the bounded outbound queue.
//!
//! The actor itself never blocks: writes go through `try_send`, and frames
//! that do not fit are parked in an overflow queue with a retry timer. If
//! the queue stays full past the write deadline the session is closed — a
//! slow client cannot wedge the gate.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use dynamo_actor::{
    Actor, ActorError, ActorFuture, ActorSystem, Context, DeadLetterResponse, MessageEnvelope, Pid,
};
use dynamo_protocol::{
    packet_codec, ClientHandshake, ErrorPayload, Message, MessageType, Packet, PacketType, Route,
    CODE_GONE, CODE_INTERNAL, CODE_KICKED, CODE_NOT_FOUND, CODE_PROTOCOL, CODE_TIMEOUT,
};

use crate::acceptor::{ConnReader, ConnWriter};
use crate::error::GateError;
use crate::gate::GateShared;
use crate::session::{RoutedMessage, Session, SessionBound, SessionClosed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    Handshake,
    HandshakeAck,
    Working,
    Closed,
}

/// User messages the agent actor understands.
pub(crate) enum AgentMessage {
    PacketIn(Packet),
    ReadFailed(GateError),
    CheckHandshake,
    CheckHeartbeat,
    FlushWrites,
    ResponseOut { mid: u64, data: Vec<u8>, err: bool },
    Push { route: Route, data: Vec<u8> },
    Kick,
    Close,
}

pub(crate) enum WriterCommand {
    Frame(Vec<u8>),
    Close,
}

pub(crate) struct AgentActor {
    shared: Arc<GateShared>,
    session_id: u64,
    remote_addr: SocketAddr,
    reader_slot: Arc<Mutex<Option<Box<dyn ConnReader>>>>,
    writer_tx: mpsc::Sender<WriterCommand>,
    closed: Arc<AtomicBool>,
    state: AgentState,
    session: Option<Session>,
    last_at: Instant,
    /// message id → future pid for in-flight client requests
    pending: HashMap<u64, Pid>,
    overflow: VecDeque<Vec<u8>>,
    write_blocked_since: Option<Instant>,
    flush_scheduled: bool,
}

impl AgentActor {
    pub(crate) fn new(
        shared: Arc<GateShared>,
        session_id: u64,
        remote_addr: SocketAddr,
        reader_slot: Arc<Mutex<Option<Box<dyn ConnReader>>>>,
        writer_tx: mpsc::Sender<WriterCommand>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            session_id,
            remote_addr,
            reader_slot,
            writer_tx,
            closed,
            state: AgentState::Handshake,
            session: None,
            last_at: Instant::now(),
            pending: HashMap::new(),
            overflow: VecDeque::new(),
            write_blocked_since: None,
            flush_scheduled: false,
        }
    }

    fn handle_packet(&mut self, ctx: &mut Context, packet: &Packet) {
        match (self.state, packet.kind) {
            (AgentState::Handshake, PacketType::Handshake) => {
                match ClientHandshake::decode(&packet.data) {
                    Ok(handshake) => {
                        tracing::debug!(
                            session_id = self.session_id,
                            platform = %handshake.sys.platform,
                            version = %handshake.sys.version,
                            "client handshake"
                        );
                        let body = self.shared.handshake_body();
                        match packet_codec::encode(PacketType::Handshake, &body) {
                            Ok(frame) => {
                                self.enqueue(ctx, frame);
                                self.state = AgentState::HandshakeAck;
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "handshake reply encode failed");
                                self.close(ctx, None);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %err,
                            "invalid handshake payload"
                        );
                        self.close(ctx, None);
                    }
                }
            }
            (AgentState::HandshakeAck, PacketType::HandshakeAck) => {
                self.state = AgentState::Working;
                if let Some(session) = self.session.clone() {
                    tracing::info!(
                        session_id = self.session_id,
                        remote = %self.remote_addr,
                        "session bound"
                    );
                    self.shared
                        .broadcast(ctx.system(), MessageEnvelope::new(SessionBound { session }));
                }
            }
            (AgentState::Working, PacketType::Data) => self.handle_data(ctx, &packet.data),
            (AgentState::Working, PacketType::Heartbeat) => {
                // echo so the peer's deadline rolls too
                if let Ok(frame) = packet_codec::encode(PacketType::Heartbeat, &[]) {
                    self.enqueue(ctx, frame);
                }
            }
            (AgentState::Closed, _) => {}
            (state, kind) => {
                tracing::debug!(
                    session_id = self.session_id,
                    state = ?state,
                    kind = ?kind,
                    "unexpected packet for session state"
                );
                self.close(
                    ctx,
                    Some(ErrorPayload::new(
                        CODE_PROTOCOL,
                        "unexpected packet for session state",
                    )),
                );
            }
        }
    }

    fn handle_data(&mut self, ctx: &mut Context, data: &[u8]) {
        let message = match self.shared.codec.decode(data) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(
                    session_id = self.session_id,
                    error = %err,
                    "undecodable data packet"
                );
                self.close(
                    ctx,
                    Some(ErrorPayload::new(CODE_PROTOCOL, "undecodable data packet")),
                );
                return;
            }
        };

        let Message {
            kind, id, route, data, ..
        } = message;
        let Some(route) = route else {
            self.close(
                ctx,
                Some(ErrorPayload::new(CODE_PROTOCOL, "message without a route")),
            );
            return;
        };
        match kind {
            MessageType::Request => self.dispatch_request(ctx, id, route, data),
            MessageType::Notify => self.dispatch_notify(ctx, route, data),
            _ => {
                tracing::debug!(
                    session_id = self.session_id,
                    kind = ?kind,
                    "client sent a server-only message type"
                );
                self.close(
                    ctx,
                    Some(ErrorPayload::new(
                        CODE_PROTOCOL,
                        "client sent a server-only message type",
                    )),
                );
            }
        }
    }

    fn dispatch_request(&mut self, ctx: &mut Context, mid: u64, route: Route, data: Vec<u8>) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let Some(handler) = self.shared.service(&route.service) else {
            tracing::debug!(session_id = self.session_id, %route, "no handler for route");
            let payload = ErrorPayload::new(CODE_NOT_FOUND, format!("no handler for route {route}"));
            let message = Message::response_error(mid, payload.to_bytes());
            self.write_message(ctx, &message);
            return;
        };

        let future = ActorFuture::new(ctx.system(), self.shared.config.request_timeout);
        self.pending.insert(mid, future.pid().clone());

        let envelope = MessageEnvelope::new(RoutedMessage {
            session,
            route,
            kind: MessageType::Request,
            data,
        })
        .with_sender(future.pid().clone());
        ctx.system().send(&handler, envelope);

        // completion task encodes the reply keyed by the original id
        let system = Arc::clone(ctx.system());
        let agent = ctx.self_pid().clone();
        let runtime = system.runtime().clone();
        runtime.spawn(async move {
            let (data, err) = match future.result().await {
                Ok(reply) => {
                    if let Some(bytes) = reply.message_as::<Vec<u8>>() {
                        (bytes.clone(), false)
                    } else if let Some(payload) = reply.message_as::<ErrorPayload>() {
                        (payload.to_bytes(), true)
                    } else {
                        (
                            ErrorPayload::new(CODE_INTERNAL, "unsupported reply payload")
                                .to_bytes(),
                            true,
                        )
                    }
                }
                Err(ActorError::Timeout) => (
                    ErrorPayload::new(CODE_TIMEOUT, "request timed out").to_bytes(),
                    true,
                ),
                Err(_) => (
                    ErrorPayload::new(CODE_GONE, "handler is gone").to_bytes(),
                    true,
                ),
            };
            system.send(
                &agent,
                MessageEnvelope::new(AgentMessage::ResponseOut { mid, data, err }),
            );
        });
    }

    fn dispatch_notify(&mut self, ctx: &mut Context, route: Route, data: Vec<u8>) {
        let Some(session) = self.session.clone() else {
            return;
        };
        match self.shared.service(&route.service) {
            Some(handler) => {
                let envelope = MessageEnvelope::new(RoutedMessage {
                    session,
                    route,
                    kind: MessageType::Notify,
                    data,
                });
                ctx.system().send(&handler, envelope);
            }
            None => {
                tracing::debug!(session_id = self.session_id, %route, "dropping notify with no handler");
            }
        }
    }

    fn write_message(&mut self, ctx: &mut Context, message: &Message) {
        let frame = self
            .shared
            .codec
            .encode(message)
            .and_then(|body| packet_codec::encode(PacketType::Data, &body));
        match frame {
            Ok(frame) => self.enqueue(ctx, frame),
            Err(err) => {
                tracing::error!(
                    session_id = self.session_id,
                    error = %err,
                    "outbound message encode failed"
                );
            }
        }
    }

    fn enqueue(&mut self, ctx: &mut Context, frame: Vec<u8>) {
        if self.state == AgentState::Closed {
            return;
        }
        self.overflow.push_back(frame);
        self.flush(ctx);
    }

    fn flush(&mut self, ctx: &mut Context) {
        while let Some(frame) = self.overflow.pop_front() {
            match self.writer_tx.try_send(WriterCommand::Frame(frame)) {
                Ok(()) => {
                    self.write_blocked_since = None;
                }
                Err(TrySendError::Full(command)) => {
                    if let WriterCommand::Frame(frame) = command {
                        self.overflow.push_front(frame);
                    }
                    let blocked = *self.write_blocked_since.get_or_insert_with(Instant::now);
                    if blocked.elapsed() >= self.shared.config.write_deadline {
                        tracing::warn!(
                            session_id = self.session_id,
                            "{}",
                            GateError::WriteBackpressure
                        );
                        self.close(ctx, None);
                    } else if !self.flush_scheduled {
                        self.flush_scheduled = true;
                        let system = Arc::clone(ctx.system());
                        let agent = ctx.self_pid().clone();
                        let runtime = system.runtime().clone();
                        runtime.spawn(async move {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            system.send(&agent, MessageEnvelope::new(AgentMessage::FlushWrites));
                        });
                    }
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(session_id = self.session_id, "writer task is gone");
                    self.close(ctx, None);
                    return;
                }
            }
        }
    }

    /// Exactly-once transition to `Closed`: optional kick packet carrying
    /// the reason record, writer shutdown, cancellation of in-flight request
    /// futures, `SessionClosed` broadcast, actor stop.
    fn close(&mut self, ctx: &mut Context, kick: Option<ErrorPayload>) {
        if self.state == AgentState::Closed {
            return;
        }
        self.state = AgentState::Closed;
        self.closed.store(true, Ordering::SeqCst);

        if let Some(reason) = kick {
            if let Ok(frame) = packet_codec::encode(PacketType::Kick, &reason.to_bytes()) {
                let _ = self.writer_tx.try_send(WriterCommand::Frame(frame));
            }
        }
        let _ = self.writer_tx.try_send(WriterCommand::Close);

        for (_, future_pid) in self.pending.drain() {
            ctx.system().send(
                &future_pid,
                MessageEnvelope::new(DeadLetterResponse {
                    target: future_pid.clone(),
                }),
            );
        }

        tracing::info!(
            session_id = self.session_id,
            remote = %self.remote_addr,
            "session closed"
        );
        self.shared.broadcast(
            ctx.system(),
            MessageEnvelope::new(SessionClosed {
                session_id: self.session_id,
            }),
        );
        ctx.stop_self();
    }
}

impl Actor for AgentActor {
    fn started(&mut self, ctx: &mut Context) {
        let pid = ctx.self_pid().clone();
        self.session = Some(Session {
            id: self.session_id,
            pid: pid.clone(),
            remote_addr: self.remote_addr,
            system: Arc::clone(ctx.system()),
        });

        if let Some(reader) = self.reader_slot.lock().take() {
            let system = Arc::clone(ctx.system());
            let agent = pid.clone();
            ctx.system().runtime().spawn(read_pump(reader, system, agent));
        }

        let system = Arc::clone(ctx.system());
        let closed = Arc::clone(&self.closed);
        let handshake_timeout = self.shared.config.handshake_timeout;
        let heartbeat = self.shared.config.heartbeat_interval;
        ctx.system()
            .runtime()
            .spawn(run_monitor(system, pid, closed, handshake_timeout, heartbeat));
    }

    fn receive(&mut self, ctx: &mut Context, envelope: &MessageEnvelope) {
        let Some(message) = envelope.message_as::<AgentMessage>() else {
            return;
        };
        match message {
            AgentMessage::PacketIn(packet) => {
                self.last_at = Instant::now();
                self.handle_packet(ctx, packet);
            }
            AgentMessage::ReadFailed(err) => {
                match err {
                    GateError::ConnectionClosed => {
                        tracing::debug!(session_id = self.session_id, "peer closed the connection");
                    }
                    other => {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %other,
                            "session read failed"
                        );
                    }
                }
                self.close(ctx, None);
            }
            AgentMessage::CheckHandshake => {
                if !matches!(self.state, AgentState::Working | AgentState::Closed) {
                    tracing::debug!(
                        session_id = self.session_id,
                        "{}",
                        GateError::HandshakeFailed("deadline passed".to_string())
                    );
                    self.close(ctx, None);
                }
            }
            AgentMessage::CheckHeartbeat => {
                if self.state == AgentState::Working
                    && self.last_at.elapsed() > self.shared.config.heartbeat_interval * 2
                {
                    tracing::debug!(session_id = self.session_id, "heartbeat missed, closing");
                    self.close(ctx, None);
                }
            }
            AgentMessage::FlushWrites => {
                self.flush_scheduled = false;
                if self.state != AgentState::Closed {
                    self.flush(ctx);
                }
            }
            AgentMessage::ResponseOut { mid, data, err } => {
                self.pending.remove(mid);
                if self.state == AgentState::Working {
                    let message = if *err {
                        Message::response_error(*mid, data.clone())
                    } else {
                        Message::response(*mid, data.clone())
                    };
                    self.write_message(ctx, &message);
                }
            }
            AgentMessage::Push { route, data } => {
                if self.state == AgentState::Working {
                    let message = Message::push(route.clone(), data.clone());
                    self.write_message(ctx, &message);
                }
            }
            AgentMessage::Kick => self.close(
                ctx,
                Some(ErrorPayload::new(CODE_KICKED, "kicked by the server")),
            ),
            AgentMessage::Close => self.close(ctx, None),
        }
    }

    fn stopped(&mut self, _ctx: &mut Context) {
        tracing::debug!(session_id = self.session_id, "agent stopped");
    }
}

/// Reads frames off the connection and feeds them to the agent's mailbox.
async fn read_pump(mut reader: Box<dyn ConnReader>, system: Arc<ActorSystem>, agent: Pid) {
    loop {
        match reader.get_next_message().await {
            Ok(frame) => match packet_codec::decode(&frame) {
                Ok((packets, _)) => {
                    for packet in packets {
                        system.send(&agent, MessageEnvelope::new(AgentMessage::PacketIn(packet)));
                    }
                }
                Err(err) => {
                    system.send(
                        &agent,
                        MessageEnvelope::new(AgentMessage::ReadFailed(err.into())),
                    );
                    return;
                }
            },
            Err(err) => {
                system.send(&agent, MessageEnvelope::new(AgentMessage::ReadFailed(err)));
                return;
            }
        }
    }
}

/// Posts the handshake-deadline check once, then heartbeat checks forever.
async fn run_monitor(
    system: Arc<ActorSystem>,
    agent: Pid,
    closed: Arc<AtomicBool>,
    handshake_timeout: Duration,
    heartbeat: Duration,
) {
    tokio::time::sleep(handshake_timeout).await;
    if closed.load(Ordering::SeqCst) {
        return;
    }
    system.send(&agent, MessageEnvelope::new(AgentMessage::CheckHandshake));

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if closed.load(Ordering::SeqCst) {
            return;
        }
        system.send(&agent, MessageEnvelope::new(AgentMessage::CheckHeartbeat));
    }
}

/// Drains the session's bounded write queue onto the connection.
pub(crate) async fn run_writer(
    mut writer: Box<dyn ConnWriter>,
    mut commands: mpsc::Receiver<WriterCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Frame(frame) => {
                if let Err(err) = writer.write_frame(&frame).await {
                    tracing::debug!(error = %err, "session write failed");
                    break;
                }
            }
            WriterCommand::Close => break,
        }
    }
    writer.close().await;
}

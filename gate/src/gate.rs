//! The gate wires acceptors, the actor system and the service table
//! together.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use dynamo_actor::{ActorSystem, MessageEnvelope, Pid, Props};
use dynamo_protocol::{MessageCodec, ServerHandshake};

use crate::acceptor::{tcp, tls_acceptor, ws, Connection};
use crate::agent::{run_writer, AgentActor};
use crate::config::{AcceptorKind, GateConfig};
use crate::error::GateError;

/// State shared between the gate handle and every agent.
pub(crate) struct GateShared {
    pub(crate) config: GateConfig,
    pub(crate) codec: MessageCodec,
    services: DashMap<String, Pid>,
    handshake_body: RwLock<Vec<u8>>,
}

impl GateShared {
    fn new(config: GateConfig) -> Result<Self, GateError> {
        let body = ServerHandshake::ok(None, config.heartbeat_interval.as_secs()).encode()?;
        Ok(Self {
            config,
            codec: MessageCodec::new(),
            services: DashMap::new(),
            handshake_body: RwLock::new(body),
        })
    }

    /// Install the route dictionary on the codec and in the advertised
    /// handshake record.
    fn install_dictionary(&self, dict: HashMap<String, u16>) -> Result<(), GateError> {
        let body =
            ServerHandshake::ok(Some(dict.clone()), self.config.heartbeat_interval.as_secs())
                .encode()?;
        self.codec.set_dictionary(dict);
        *self.handshake_body.write() = body;
        Ok(())
    }

    pub(crate) fn handshake_body(&self) -> Vec<u8> {
        self.handshake_body.read().clone()
    }

    pub(crate) fn service(&self, name: &str) -> Option<Pid> {
        self.services.get(name).map(|entry| entry.value().clone())
    }

    /// Deliver an event to every registered service handler.
    pub(crate) fn broadcast(&self, system: &Arc<ActorSystem>, envelope: MessageEnvelope) {
        for entry in self.services.iter() {
            system.send(entry.value(), envelope.clone());
        }
    }
}

/// The session gateway. Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    system: Arc<ActorSystem>,
    shared: Arc<GateShared>,
    next_session_id: AtomicU64,
}

impl Gate {
    pub fn new(system: Arc<ActorSystem>, config: GateConfig) -> Result<Self, GateError> {
        Ok(Self {
            inner: Arc::new(GateInner {
                system,
                shared: Arc::new(GateShared::new(config)?),
                next_session_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn system(&self) -> &Arc<ActorSystem> {
        &self.inner.system
    }

    /// Spawn `props` as the handler actor for `route.service == name`.
    /// The handler receives [`RoutedMessage`](crate::RoutedMessage)
    /// envelopes plus `SessionBound`/`SessionClosed` events.
    pub fn register_service(&self, name: &str, props: impl Into<Arc<Props>>) -> Result<Pid, GateError> {
        let pid = self.inner.system.root().spawn_named(props, name)?;
        self.inner.shared.services.insert(name.to_string(), pid.clone());
        tracing::info!(service = name, %pid, "service registered");
        Ok(pid)
    }

    /// Install the route-compression dictionary advertised to clients during
    /// the handshake.
    pub fn set_dictionary(&self, dict: HashMap<String, u16>) -> Result<(), GateError> {
        self.inner.shared.install_dictionary(dict)
    }

    /// Bind every configured acceptor and start accepting sessions.
    /// Returns the bound addresses (useful with port 0).
    pub async fn start(&self) -> Result<Vec<SocketAddr>, GateError> {
        if self.inner.shared.config.acceptors.is_empty() {
            return Err(GateError::Config("no acceptors configured".to_string()));
        }

        let mut addresses = Vec::new();
        for acceptor in self.inner.shared.config.acceptors.clone() {
            let tls = match &acceptor.tls {
                Some(tls) => Some(tls_acceptor(tls)?),
                None => None,
            };
            let listener = TcpListener::bind(&acceptor.address).await?;
            let local = listener.local_addr()?;
            tracing::info!(address = %local, kind = ?acceptor.kind, tls = tls.is_some(), "acceptor listening");

            let gate = self.clone();
            match acceptor.kind {
                AcceptorKind::Tcp => {
                    tokio::spawn(tcp::serve(listener, tls, gate));
                }
                AcceptorKind::Ws => {
                    tokio::spawn(ws::serve(listener, tls, acceptor.path.clone(), gate));
                }
            }
            addresses.push(local);
        }
        Ok(addresses)
    }

    /// `start`, then serve forever.
    pub async fn run(&self) -> Result<(), GateError> {
        self.start().await?;
        std::future::pending::<()>().await;
        Ok(())
    }

    /// Bind a freshly accepted connection to a new agent actor.
    pub(crate) fn bind_session(&self, connection: Connection) {
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (writer_tx, writer_rx) =
            mpsc::channel(self.inner.shared.config.write_queue_len.max(1));
        self.inner
            .system
            .runtime()
            .spawn(run_writer(connection.writer, writer_rx));

        let reader_slot = Arc::new(parking_lot::Mutex::new(Some(connection.reader)));
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let shared = Arc::clone(&self.inner.shared);
        let remote_addr = connection.remote_addr;

        let props = Props::from_producer(move || {
            Box::new(AgentActor::new(
                Arc::clone(&shared),
                session_id,
                remote_addr,
                Arc::clone(&reader_slot),
                writer_tx.clone(),
                Arc::clone(&closed),
            ))
        });
        match self
            .inner
            .system
            .root()
            .spawn_named(props, &format!("agents/{session_id}"))
        {
            Ok(pid) => {
                tracing::debug!(session_id, %pid, remote = %remote_addr, "session accepted");
            }
            Err(err) => {
                tracing::error!(session_id, error = %err, "failed to spawn session agent");
            }
        }
    }
}

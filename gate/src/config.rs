//! Gate configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorKind {
    Tcp,
    Ws,
}

/// PEM certificate/key pair for a TLS-terminating acceptor.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    pub address: String,
    pub kind: AcceptorKind,
    pub tls: Option<TlsConfig>,
    /// WebSocket upgrade path; `None` accepts any path. Ignored for TCP.
    pub path: Option<String>,
}

impl AcceptorConfig {
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: AcceptorKind::Tcp,
            tls: None,
            path: None,
        }
    }

    pub fn ws(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: AcceptorKind::Ws,
            tls: None,
            path: None,
        }
    }

    pub fn with_tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsConfig {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub acceptors: Vec<AcceptorConfig>,
    /// Interval advertised to clients; silence for twice this long closes
    /// the session.
    pub heartbeat_interval: Duration,
    /// Expiry for the ephemeral future behind each client request.
    pub request_timeout: Duration,
    /// How long a fresh connection may take to reach the working state.
    pub handshake_timeout: Duration,
    /// Outbound frames queued per session before backpressure kicks in.
    pub write_queue_len: usize,
    /// How long the write queue may stay full before the session is closed.
    pub write_deadline: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            acceptors: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            write_queue_len: 256,
            write_deadline: Duration::from_secs(5),
        }
    }
}

impl GateConfig {
    pub fn with_acceptor(mut self, acceptor: AcceptorConfig) -> Self {
        self.acceptors.push(acceptor);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_write_queue_len(mut self, len: usize) -> Self {
        self.write_queue_len = len;
        self
    }

    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = deadline;
        self
    }
}

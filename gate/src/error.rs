use dynamo_actor::ActorError;
use dynamo_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection ended mid-frame")]
    ShortRead,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("write queue congested past the write deadline")]
    WriteBackpressure,

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Actor(#[from] ActorError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

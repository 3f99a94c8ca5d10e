use dynamo_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

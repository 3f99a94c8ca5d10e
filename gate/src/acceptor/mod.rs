//! Acceptors yield connections; connections expose a uniform framed-bytes
//! contract.
//!
//! Both transports present `get_next_message()` returning whole frames: raw
//! TCP reads exactly one packet (header, then body); WebSocket buffers
//! binary frame payloads and slices packets back out, since a packet may
//! straddle frames.

pub mod tcp;
mod tls;
pub mod ws;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::GateError;

pub(crate) use tls::tls_acceptor;

/// Read half of a session connection.
#[async_trait]
pub trait ConnReader: Send {
    /// The next framed chunk off the wire. Every returned buffer starts on
    /// a packet boundary.
    async fn get_next_message(&mut self) -> Result<Vec<u8>, GateError>;
}

/// Write half of a session connection. Driven by a single writer task per
/// session.
#[async_trait]
pub trait ConnWriter: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), GateError>;
    async fn close(&mut self);
}

/// A freshly accepted bidirectional byte stream.
pub struct Connection {
    pub reader: Box<dyn ConnReader>,
    pub writer: Box<dyn ConnWriter>,
    pub remote_addr: SocketAddr,
}

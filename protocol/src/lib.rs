//! Wire protocol for the dynamo session framework.
//!
//! Two framing layers ride on every connection:
//!
//! - [`packet`]: `type:u8 | length:u24be | payload`, with `Handshake`,
//!   `HandshakeAck`, `Heartbeat`, `Data` and `Kick` types,
//! - [`message`]: routed application messages carried in `Data` packets,
//!   with varint ids for request/response correlation and an optional
//!   dictionary-compressed route.
//!
//! Handshake records are JSON with fixed key names and may arrive wrapped in
//! zlib; see [`handshake`] and [`compression`].

pub mod compression;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packet;
pub mod packet_codec;
pub mod route;

pub use error::{
    ErrorPayload, ProtocolError, CODE_GONE, CODE_INTERNAL, CODE_KICKED, CODE_NOT_FOUND,
    CODE_PROTOCOL, CODE_TIMEOUT,
};
pub use handshake::{ClientHandshake, ClientHandshakeSys, HandshakeSys, ServerHandshake};
pub use message::{Message, MessageCodec, MessageType};
pub use packet::{Packet, PacketType, HEAD_LENGTH, MAX_PACKET_SIZE};
pub use packet_codec::{decode, encode, parse_header, PacketBuffer};
pub use route::{decode_route, Route};

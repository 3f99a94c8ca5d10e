//! Packets: the outer framing unit.
//!
//! `type:u8 | length:u24be | payload[length]`.

use crate::error::ProtocolError;

/// Bytes in a packet header.
pub const HEAD_LENGTH: usize = 4;

/// Maximum payload carried by one packet (16 MiB - 1, the u24 ceiling).
pub const MAX_PACKET_SIZE: usize = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 1,
    HandshakeAck = 2,
    Heartbeat = 3,
    Data = 4,
    Kick = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Handshake),
            2 => Ok(PacketType::HandshakeAck),
            3 => Ok(PacketType::Heartbeat),
            4 => Ok(PacketType::Data),
            5 => Ok(PacketType::Kick),
            other => Err(ProtocolError::WrongPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn empty(kind: PacketType) -> Self {
        Self { kind, data: Vec::new() }
    }
}

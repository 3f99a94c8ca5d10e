//! Packet encoder and decoder.
//!
//! The decoder comes in two shapes: a one-shot `decode` over a byte slice
//! that reports how much it consumed, and an accumulating [`PacketBuffer`]
//! for stream readers where packets straddle read boundaries.

use crate::error::ProtocolError;
use crate::packet::{Packet, PacketType, HEAD_LENGTH, MAX_PACKET_SIZE};

/// Frame a payload into a wire packet.
pub fn encode(kind: PacketType, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if data.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketSizeExceeded(data.len()));
    }
    let mut out = Vec::with_capacity(HEAD_LENGTH + data.len());
    out.push(kind as u8);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(data);
    Ok(out)
}

/// Parse a packet header into its type and payload length.
pub fn parse_header(header: &[u8; HEAD_LENGTH]) -> Result<(PacketType, usize), ProtocolError> {
    let kind = PacketType::try_from(header[0])?;
    let length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    Ok((kind, length))
}

/// Decode as many whole packets as `buf` holds. Returns the packets and the
/// number of bytes consumed; a trailing fragment is left for the next call.
/// An unknown packet type is a hard error.
pub fn decode(buf: &[u8]) -> Result<(Vec<Packet>, usize), ProtocolError> {
    let mut packets = Vec::new();
    let mut consumed = 0;

    while buf.len() - consumed >= HEAD_LENGTH {
        let header = [
            buf[consumed],
            buf[consumed + 1],
            buf[consumed + 2],
            buf[consumed + 3],
        ];
        let (kind, length) = parse_header(&header)?;
        if buf.len() - consumed - HEAD_LENGTH < length {
            break;
        }
        let start = consumed + HEAD_LENGTH;
        packets.push(Packet::new(kind, buf[start..start + length].to_vec()));
        consumed = start + length;
    }

    Ok((packets, consumed))
}

/// Accumulates stream bytes and yields complete packets.
///
/// Data arrives in arbitrary chunks; push whatever came off the wire and
/// iterate the complete packets. A decode error (unknown type) poisons the
/// stream: the buffer is cleared and the caller is expected to drop the
/// connection.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<'a>(&'a mut self, data: &[u8]) -> PacketIterator<'a> {
        self.buffer.extend_from_slice(data);
        PacketIterator { buffer: self }
    }

    /// Accumulate bytes without extracting anything yet.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a whole packet is sitting at the front of the buffer.
    pub fn has_packet(&self) -> bool {
        if self.buffer.len() < HEAD_LENGTH {
            return false;
        }
        let length =
            u32::from_be_bytes([0, self.buffer[1], self.buffer[2], self.buffer[3]]) as usize;
        self.buffer.len() >= HEAD_LENGTH + length
    }

    /// Split the leading packet off as raw frame bytes (header included).
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        if !self.has_packet() {
            return None;
        }
        let length =
            u32::from_be_bytes([0, self.buffer[1], self.buffer[2], self.buffer[3]]) as usize;
        let frame: Vec<u8> = self.buffer.drain(..HEAD_LENGTH + length).collect();
        Some(frame)
    }

    fn try_extract(&mut self) -> Option<Result<Packet, ProtocolError>> {
        if self.buffer.len() < HEAD_LENGTH {
            return None;
        }
        let header = [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]];
        let (kind, length) = match parse_header(&header) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.buffer.clear();
                return Some(Err(err));
            }
        };
        if self.buffer.len() < HEAD_LENGTH + length {
            return None;
        }
        let data = self.buffer[HEAD_LENGTH..HEAD_LENGTH + length].to_vec();
        self.buffer.drain(..HEAD_LENGTH + length);
        Some(Ok(Packet::new(kind, data)))
    }
}

pub struct PacketIterator<'a> {
    buffer: &'a mut PacketBuffer,
}

impl Iterator for PacketIterator<'_> {
    type Item = Result<Packet, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::new(PacketType::Handshake, br#"{"sys":{}}"#.to_vec()),
            Packet::empty(PacketType::Heartbeat),
            Packet::new(PacketType::Data, vec![0u8; 300]),
            Packet::new(PacketType::Kick, vec![1]),
        ]
    }

    fn wire_bytes(packets: &[Packet]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in packets {
            out.extend(encode(p.kind, &p.data).unwrap());
        }
        out
    }

    #[test]
    fn encode_layout() {
        let encoded = encode(PacketType::Data, b"abc").unwrap();
        assert_eq!(encoded, vec![4, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let huge = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            encode(PacketType::Data, &huge),
            Err(ProtocolError::PacketSizeExceeded(_))
        ));
    }

    #[test]
    fn single_shot_decode() {
        let packets = sample_packets();
        let bytes = wire_bytes(&packets);
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(decoded, packets);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn decode_leaves_trailing_fragment() {
        let packets = sample_packets();
        let mut bytes = wire_bytes(&packets);
        let fragment = encode(PacketType::Data, b"partial").unwrap();
        bytes.extend_from_slice(&fragment[..5]);

        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(decoded, packets);
        assert_eq!(consumed, bytes.len() - 5);
    }

    #[test]
    fn unknown_type_is_a_hard_error() {
        let bytes = [9u8, 0, 0, 0];
        assert!(matches!(decode(&bytes), Err(ProtocolError::WrongPacketType(9))));
    }

    #[test]
    fn buffered_decode_matches_single_shot_for_any_split() {
        let packets = sample_packets();
        let bytes = wire_bytes(&packets);

        // every split point, including mid-header and mid-payload
        for split in 0..=bytes.len() {
            let mut buffer = PacketBuffer::new();
            let mut reassembled = Vec::new();
            for msg in buffer.push(&bytes[..split]) {
                reassembled.push(msg.unwrap());
            }
            for msg in buffer.push(&bytes[split..]) {
                reassembled.push(msg.unwrap());
            }
            assert_eq!(reassembled, packets, "split at {split}");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn byte_at_a_time_reassembly() {
        let packets = sample_packets();
        let bytes = wire_bytes(&packets);

        let mut buffer = PacketBuffer::new();
        let mut reassembled = Vec::new();
        for b in bytes {
            for msg in buffer.push(&[b]) {
                reassembled.push(msg.unwrap());
            }
        }
        assert_eq!(reassembled, packets);
    }

    #[test]
    fn take_frame_returns_header_and_body() {
        let mut buffer = PacketBuffer::new();
        let frame = encode(PacketType::Data, b"xyz").unwrap();
        // no complete packet yet
        assert!(buffer.take_frame().is_none());
        buffer.push(&frame[..3]);
        assert!(buffer.take_frame().is_none());
        buffer.push(&frame[3..]);
        assert_eq!(buffer.take_frame(), Some(frame));
        assert!(buffer.is_empty());
    }
}

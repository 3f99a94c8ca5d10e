//! Routed messages: the payload of `Data` packets.
//!
//! Wire layout:
//!
//! ```text
//! flag:u8 | id:varint (Request/Response) | route | payload
//! ```
//!
//! The flag byte packs the message type into bits 1..3, the compressed-route
//! bit into bit 0, the route-present bit into bit 4 and the error bit into
//! bit 5. A compressed route is a 2-byte big-endian dictionary code; an
//! uncompressed one is a length byte followed by the UTF-8 route string.
//! Requests and notifies always name a route, responses never do, and a
//! push may omit its route — the route-present bit is what tells the peer
//! which way a push went.
//!
//! The route dictionary is negotiated during the handshake and installed on
//! both peers; it swaps in atomically and is immutable afterwards, so lookups
//! never lock.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::ProtocolError;
use crate::route::{decode_route, Route};

const ROUTE_COMPRESS_MASK: u8 = 0x01;
const TYPE_MASK: u8 = 0x07;
const ROUTE_PRESENT_MASK: u8 = 0x10;
const ERROR_MASK: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl MessageType {
    /// Requests and responses are correlated by a message id.
    pub fn has_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }

    /// Everything but a response may carry a route. For pushes the route is
    /// optional and flagged by the route-present bit.
    pub fn has_route(self) -> bool {
        !matches!(self, MessageType::Response)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Notify),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Push),
            _ => Err(ProtocolError::InvalidMessage("unknown message type")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub id: u64,
    pub route: Option<Route>,
    pub data: Vec<u8>,
    pub err: bool,
}

impl Message {
    pub fn request(id: u64, route: Route, data: Vec<u8>) -> Self {
        Self { kind: MessageType::Request, id, route: Some(route), data, err: false }
    }

    pub fn notify(route: Route, data: Vec<u8>) -> Self {
        Self { kind: MessageType::Notify, id: 0, route: Some(route), data, err: false }
    }

    pub fn response(id: u64, data: Vec<u8>) -> Self {
        Self { kind: MessageType::Response, id, route: None, data, err: false }
    }

    pub fn response_error(id: u64, data: Vec<u8>) -> Self {
        Self { kind: MessageType::Response, id, route: None, data, err: true }
    }

    pub fn push(route: Route, data: Vec<u8>) -> Self {
        Self { kind: MessageType::Push, id: 0, route: Some(route), data, err: false }
    }
}

#[derive(Debug, Default)]
struct RouteDictionary {
    forward: HashMap<String, u16>,
    reverse: HashMap<u16, String>,
}

/// Encodes and decodes messages, applying the route dictionary when one is
/// installed.
pub struct MessageCodec {
    dictionary: ArcSwap<RouteDictionary>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            dictionary: ArcSwap::from_pointee(RouteDictionary::default()),
        }
    }

    /// Install the symmetric forward + reverse table. Replaces any previous
    /// dictionary wholesale.
    pub fn set_dictionary(&self, dict: HashMap<String, u16>) {
        let mut forward = HashMap::with_capacity(dict.len());
        let mut reverse = HashMap::with_capacity(dict.len());
        for (route, code) in dict {
            reverse.insert(code, route.clone());
            forward.insert(route, code);
        }
        self.dictionary.store(Arc::new(RouteDictionary { forward, reverse }));
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let dictionary = self.dictionary.load();

        let mut route_repr: Option<RouteRepr> = None;
        if message.kind.has_route() {
            match &message.route {
                Some(route) => {
                    let name = route.to_string();
                    // encode misses fall back to the string form
                    route_repr = Some(match dictionary.forward.get(&name) {
                        Some(code) => RouteRepr::Code(*code),
                        None => {
                            if name.len() > u8::MAX as usize {
                                return Err(ProtocolError::InvalidRoute(name));
                            }
                            RouteRepr::Name(name)
                        }
                    });
                }
                // only a push may go out without a route
                None if message.kind == MessageType::Push => {}
                None => return Err(ProtocolError::InvalidMessage("route is required")),
            }
        }

        let mut flag = (message.kind as u8) << 1;
        if matches!(route_repr, Some(RouteRepr::Code(_))) {
            flag |= ROUTE_COMPRESS_MASK;
        }
        if message.kind == MessageType::Push && route_repr.is_some() {
            flag |= ROUTE_PRESENT_MASK;
        }
        if message.err {
            flag |= ERROR_MASK;
        }

        let mut out = vec![flag];
        if message.kind.has_id() {
            write_varint(&mut out, message.id);
        }
        match route_repr {
            Some(RouteRepr::Code(code)) => out.extend_from_slice(&code.to_be_bytes()),
            Some(RouteRepr::Name(name)) => {
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
            None => {}
        }
        out.extend_from_slice(&message.data);
        Ok(out)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let flag = *data
            .first()
            .ok_or(ProtocolError::InvalidMessage("empty message"))?;
        let mut offset = 1;

        let kind = MessageType::try_from((flag >> 1) & TYPE_MASK)?;
        let compressed = flag & ROUTE_COMPRESS_MASK != 0;
        let route_present = flag & ROUTE_PRESENT_MASK != 0;
        let err = flag & ERROR_MASK != 0;

        let id = if kind.has_id() {
            read_varint(data, &mut offset)?
        } else {
            0
        };

        let present = match kind {
            MessageType::Push => compressed || route_present,
            other => other.has_route(),
        };
        let route = if present {
            if compressed {
                if data.len() < offset + 2 {
                    return Err(ProtocolError::InvalidMessage("truncated route code"));
                }
                let code = u16::from_be_bytes([data[offset], data[offset + 1]]);
                offset += 2;
                let dictionary = self.dictionary.load();
                let name = dictionary
                    .reverse
                    .get(&code)
                    .ok_or(ProtocolError::RouteNotFound(code))?;
                Some(decode_route(name)?)
            } else {
                let length = *data
                    .get(offset)
                    .ok_or(ProtocolError::InvalidMessage("truncated route length"))?
                    as usize;
                offset += 1;
                let raw = data
                    .get(offset..offset + length)
                    .ok_or(ProtocolError::InvalidMessage("truncated route"))?;
                offset += length;
                let name = std::str::from_utf8(raw)
                    .map_err(|_| ProtocolError::InvalidMessage("route is not utf-8"))?;
                Some(decode_route(name)?)
            }
        } else {
            None
        };

        Ok(Message {
            kind,
            id,
            route,
            data: data[offset..].to_vec(),
            err,
        })
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

enum RouteRepr {
    Code(u16),
    Name(String),
}

/// Little-endian base-128 varint, continuation bit high.
fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
            out.push(byte);
        } else {
            out.push(byte);
            return;
        }
    }
}

fn read_varint(data: &[u8], offset: &mut usize) -> Result<u64, ProtocolError> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*offset)
            .ok_or(ProtocolError::InvalidMessage("truncated message id"))?;
        *offset += 1;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(ProtocolError::InvalidMessage("message id varint too long"));
        }
    }
}

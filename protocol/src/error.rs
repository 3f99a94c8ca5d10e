use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec-level errors. All of these are connection-fatal for the session
/// that produced them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packet type: {0}")]
    WrongPacketType(u8),

    #[error("packet payload exceeds the 16 MiB - 1 limit: {0} bytes")]
    PacketSizeExceeded(usize),

    #[error("malformed message: {0}")]
    InvalidMessage(&'static str),

    #[error("invalid route: {0:?}")]
    InvalidRoute(String),

    #[error("route fields cannot be empty")]
    RouteFieldEmpty,

    #[error("route code {0} not found in dictionary")]
    RouteNotFound(u16),

    #[error("handshake payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("compressed payload: {0}")]
    Compression(#[from] std::io::Error),
}

/// Stable error code carried by `err=true` responses.
pub const CODE_TIMEOUT: &str = "DYN-504";
/// No handler is registered for the requested route.
pub const CODE_NOT_FOUND: &str = "DYN-404";
/// The handler (or its session) went away before answering.
pub const CODE_GONE: &str = "DYN-410";
pub const CODE_INTERNAL: &str = "DYN-500";
/// The session violated the wire protocol; carried as the kick reason.
pub const CODE_PROTOCOL: &str = "DYN-400";
/// The application kicked the session.
pub const CODE_KICKED: &str = "DYN-403";

/// JSON body of an `err=true` response message, and of the reason record a
/// `Kick` packet carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub msg: String,
}

impl ErrorPayload {
    pub fn new(code: &str, msg: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            msg: msg.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_round_trip() {
        let payload = ErrorPayload::new(CODE_TIMEOUT, "request timed out");
        let decoded = ErrorPayload::from_bytes(&payload.to_bytes()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.code, "DYN-504");
    }

    #[test]
    fn codes_are_seven_chars() {
        for code in [
            CODE_TIMEOUT,
            CODE_NOT_FOUND,
            CODE_GONE,
            CODE_INTERNAL,
            CODE_PROTOCOL,
            CODE_KICKED,
        ] {
            assert_eq!(code.len(), 7);
        }
    }
}

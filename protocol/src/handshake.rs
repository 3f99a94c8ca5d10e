//! Handshake payloads.
//!
//! JSON-encoded, exchanged inside `Handshake` packets before any data flows.
//! Key names are part of the wire contract. Both directions tolerate a zlib
//! wrapper on the body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::compression::maybe_inflate;
use crate::error::ProtocolError;

/// `sys` block of the server's handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeSys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dict: Option<HashMap<String, u16>>,
    /// Heartbeat interval in seconds.
    pub heartbeat: u64,
    pub serializer: String,
}

/// Server → client handshake record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandshake {
    pub code: u16,
    pub sys: HandshakeSys,
}

impl ServerHandshake {
    pub fn ok(dict: Option<HashMap<String, u16>>, heartbeat_secs: u64) -> Self {
        Self {
            code: 200,
            sys: HandshakeSys {
                dict,
                heartbeat: heartbeat_secs,
                serializer: "json".to_string(),
            },
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let body = maybe_inflate(data)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// `sys` block of the client's handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHandshakeSys {
    pub platform: String,
    #[serde(rename = "libVersion")]
    pub lib_version: String,
    #[serde(rename = "buildNumber")]
    pub build_number: String,
    pub version: String,
}

/// Client → server handshake record. `user` is opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientHandshake {
    pub sys: ClientHandshakeSys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl ClientHandshake {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let body = maybe_inflate(data)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

//! Optional zlib wrapper for handshake bodies.
//!
//! Peers may compress the JSON handshake; detection is by the two-byte zlib
//! magic (`0x78 0x9C` / `0x78 0xDA`).

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

pub fn is_compressed(data: &[u8]) -> bool {
    data.len() > 2 && data[0] == 0x78 && (data[1] == 0x9C || data[1] == 0xDA)
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Transparently unwrap a possibly-compressed payload.
pub fn maybe_inflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    if is_compressed(data) {
        inflate(data)
    } else {
        Ok(data.to_vec())
    }
}

//! TCP stream format.
//!
//! A client connects to [`PORT`] and sends [`CONNECTION_REQUEST`]; from
//! then on the device sends raw sample blocks, each sample a little-endian
//! `i16`, at most [`MAX_PACKET_BYTES`] per send.

use alloc::vec::Vec;

/// Listening port.
pub const PORT: u16 = 3333;

/// Handshake the client sends after connecting.
pub const CONNECTION_REQUEST: &[u8] = b"connection_request";

/// Largest packet the desktop client reads in one go.
pub const MAX_PACKET_BYTES: usize = 1024;

/// Bytes per encoded sample.
pub const SAMPLE_BYTES: usize = 2;

/// Whether `msg` is the handshake, ignoring trailing NUL / CR / LF.
pub fn is_connection_request(msg: &[u8]) -> bool {
    let end = msg
        .iter()
        .rposition(|b| !matches!(b, 0 | b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &msg[..end] == CONNECTION_REQUEST
}

/// Append `samples` to `out` in wire order.
pub fn encode_samples(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * SAMPLE_BYTES);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
}

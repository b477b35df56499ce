//! Length-prefixed padding frame for fan-out sub-requests
//!
//! Every sub-request in one fan-out is sent at the same on-wire length so
//! that request sizes do not leak the per-shard key distribution. The frame
//! is `[u32 BE payload length][payload][padding zero bytes]`; the fixed-width
//! prefix keeps the total length at exactly `4 + payload + padding`
//! regardless of payload size, and lets the peer truncate the padding.

use crate::error::Error;

/// Width of the payload-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame `payload` with its length prefix and `padding` trailing zero bytes.
pub fn pad(payload: &[u8], padding: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len() + padding);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.resize(LENGTH_PREFIX_SIZE + payload.len() + padding, 0);
    frame
}

/// Recover the payload from a padded frame, discarding the padding.
pub fn unpad(frame: &[u8]) -> Result<&[u8], Error> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::Deserialization(format!(
            "padded frame too short: {} bytes",
            frame.len()
        )));
    }
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let payload_len = u32::from_be_bytes(prefix) as usize;
    let rest = &frame[LENGTH_PREFIX_SIZE..];
    if payload_len > rest.len() {
        return Err(Error::Deserialization(format!(
            "padded frame declares {} payload bytes but carries {}",
            payload_len,
            rest.len()
        )));
    }
    Ok(&rest[..payload_len])
}

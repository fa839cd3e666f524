//! Ack, path and trace decoders.

use serde::{Deserialize, Serialize};

use super::{DecodeFailure, FailureReason, Outcome, le_u16, le_u32};

/// Decoded acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckInfo {
    /// CRC of the acknowledged packet.
    pub crc: u32,
}

/// Decoded returned-path header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    /// Destination hash byte.
    pub dest_hash: u8,
    /// Source hash byte.
    pub src_hash: u8,
    /// Whole payload as hex.
    pub payload_hex: String,
}

/// Decoded trace header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceInfo {
    /// Trace tag.
    pub tag: u32,
    /// Authentication code.
    pub auth_code: u16,
}

/// An ack payload is exactly one little-endian CRC.
pub fn decode_ack(payload: &[u8]) -> Outcome<AckInfo> {
    match <[u8; 4]>::try_from(payload) {
        Ok(bytes) => Outcome::Ok(AckInfo {
            crc: u32::from_le_bytes(bytes),
        }),
        Err(_) => DecodeFailure::new(FailureReason::InvalidAckLength, payload.len()).into(),
    }
}

/// Path payloads start with destination and source hash bytes.
pub fn decode_path(payload: &[u8]) -> Outcome<PathInfo> {
    let [dest_hash, src_hash, ..] = *payload else {
        return DecodeFailure::new(FailureReason::PayloadTooShort, payload.len()).into();
    };
    Outcome::Ok(PathInfo {
        dest_hash,
        src_hash,
        payload_hex: hex::encode(payload),
    })
}

/// Trace payloads start with a u32 tag and a u16 auth code.
pub fn decode_trace(payload: &[u8]) -> Outcome<TraceInfo> {
    match (le_u32(payload, 0), le_u16(payload, 4)) {
        (Some(tag), Some(auth_code)) => Outcome::Ok(TraceInfo { tag, auth_code }),
        _ => DecodeFailure::new(FailureReason::PayloadTooShort, payload.len()).into(),
    }
}

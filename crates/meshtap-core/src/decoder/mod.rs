//! Type-dispatched payload decoding.
//!
//! [`decode`] looks at the payload-type code and hands the payload to the
//! matching field decoder. Decoding is total: short or malformed payloads come
//! back as a [`DecodeFailure`] inside the same variant slot, and codes without a
//! decoder yield [`Decoded::Empty`].
//!
//! On the wire a [`Decoded`] is a JSON object with a single key named after
//! the category (`advert`, `group_text`, `text`, `ack`, `control`, `path`,
//! `trace`) or `{}` when nothing was decoded.

pub mod advert;
pub mod control;
pub mod routing;
pub mod text;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::packet::{Decryption, PayloadType, RawPacket};

pub use advert::{AdvertInfo, Appdata, NodeType};
pub use control::{ControlInfo, ControlKind};
pub use routing::{AckInfo, PathInfo, TraceInfo};
pub use text::{GroupTextInfo, GroupTextMessage, TextInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Failure shape
// ─────────────────────────────────────────────────────────────────────────────

/// Why a field decoder could not extract its fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// An ack payload was not exactly four bytes.
    InvalidAckLength,
    /// The payload is shorter than the fixed part of its layout.
    PayloadTooShort,
    /// The payload is empty where at least one byte is required.
    EmptyPayload,
    /// Advert appdata flags announce more bytes than remain.
    AppdataTruncated,
}

/// Error-shaped decode result: `{ "error": <reason>, "payload_len": n }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    /// Failure reason.
    pub error: FailureReason,
    /// Observed payload length.
    pub payload_len: usize,
}

impl DecodeFailure {
    /// Build a failure for a payload of the given length.
    pub fn new(error: FailureReason, payload_len: usize) -> Self {
        Self { error, payload_len }
    }
}

/// Either the decoded fields or the failure that replaced them.
///
/// Serialised without a wrapper so the variant slot holds the fields or the
/// error object directly.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    /// Fields extracted.
    Ok(T),
    /// Payload could not be decoded.
    Failed(DecodeFailure),
}

impl<T> Outcome<T> {
    /// Decoded fields, if any.
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    /// Failure, if decoding failed.
    pub fn failure(&self) -> Option<&DecodeFailure> {
        match self {
            Self::Ok(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    /// True when the decoder produced fields.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl<T> From<DecodeFailure> for Outcome<T> {
    fn from(f: DecodeFailure) -> Self {
        Self::Failed(f)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoded
// ─────────────────────────────────────────────────────────────────────────────

/// Result of decoding one payload. Exactly one per record.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// Node advertisement.
    Advert(Outcome<AdvertInfo>),
    /// Channel text message.
    GroupText(GroupTextInfo),
    /// Direct text message.
    Text(TextInfo),
    /// Acknowledgement.
    Ack(Outcome<AckInfo>),
    /// Control data.
    Control(Outcome<ControlInfo>),
    /// Returned path.
    Path(Outcome<PathInfo>),
    /// Path trace.
    Trace(Outcome<TraceInfo>),
    /// No decoder for this payload type.
    Empty,
}

impl Decoded {
    /// Category key used on the wire, `None` for [`Decoded::Empty`].
    pub fn category(&self) -> Option<&'static str> {
        match self {
            Self::Advert(_) => Some("advert"),
            Self::GroupText(_) => Some("group_text"),
            Self::Text(_) => Some("text"),
            Self::Ack(_) => Some("ack"),
            Self::Control(_) => Some("control"),
            Self::Path(_) => Some("path"),
            Self::Trace(_) => Some("trace"),
            Self::Empty => None,
        }
    }

    /// The failure carried by this variant, if any.
    pub fn failure(&self) -> Option<&DecodeFailure> {
        match self {
            Self::Advert(o) => o.failure(),
            Self::Ack(o) => o.failure(),
            Self::Control(o) => o.failure(),
            Self::Path(o) => o.failure(),
            Self::Trace(o) => o.failure(),
            Self::GroupText(_) | Self::Text(_) | Self::Empty => None,
        }
    }
}

impl Serialize for Decoded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(key) = self.category() else {
            return serializer.serialize_map(Some(0))?.end();
        };
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Advert(v) => map.serialize_entry(key, v)?,
            Self::GroupText(v) => map.serialize_entry(key, v)?,
            Self::Text(v) => map.serialize_entry(key, v)?,
            Self::Ack(v) => map.serialize_entry(key, v)?,
            Self::Control(v) => map.serialize_entry(key, v)?,
            Self::Path(v) => map.serialize_entry(key, v)?,
            Self::Trace(v) => map.serialize_entry(key, v)?,
            Self::Empty => {}
        }
        map.end()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a payload by its payload-type code.
///
/// `side` carries values the protocol node already decrypted; only the
/// group-text and text decoders look at it.
pub fn decode(payload_type: u8, payload: &[u8], side: Option<&Decryption>) -> Decoded {
    let Some(kind) = PayloadType::from_code(payload_type) else {
        return Decoded::Empty;
    };
    match kind {
        PayloadType::Advert => Decoded::Advert(advert::decode_advert(payload)),
        PayloadType::GroupText => Decoded::GroupText(text::decode_group_text(
            payload,
            side.and_then(|d| d.group_text.as_ref()),
        )),
        PayloadType::TextMessage => {
            Decoded::Text(text::decode_text(side.and_then(|d| d.text.as_deref())))
        }
        PayloadType::Ack => Decoded::Ack(routing::decode_ack(payload)),
        PayloadType::Control => Decoded::Control(control::decode_control(payload)),
        PayloadType::Path => Decoded::Path(routing::decode_path(payload)),
        PayloadType::Trace => Decoded::Trace(routing::decode_trace(payload)),
        PayloadType::Request
        | PayloadType::Response
        | PayloadType::GroupData
        | PayloadType::AnonRequest
        | PayloadType::Multipart
        | PayloadType::RawCustom => Decoded::Empty,
    }
}

/// Decode the payload of an upstream packet.
pub fn decode_packet(packet: &RawPacket) -> Decoded {
    decode(
        packet.payload_type_code(),
        &packet.payload,
        packet.decrypted.as_ref(),
    )
}

// ── Byte helpers ────────────────────────────────────────────────────────────

/// Little-endian u32 at `offset`, `None` if out of bounds.
pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(chunk.try_into().ok()?))
}

/// Little-endian u16 at `offset`, `None` if out of bounds.
pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let chunk = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(chunk.try_into().ok()?))
}

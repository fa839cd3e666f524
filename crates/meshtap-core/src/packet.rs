//! Upstream packet model.
//!
//! [`RawPacket`] mirrors what a protocol node hands over for every received
//! frame. Most attributes are optional because different node stacks expose
//! different subsets; the record builder reads them through the accessors here
//! and renders absence as `null`.
//!
//! Frame layout (one byte header, bits from LSB):
//!
//! | bits | field |
//! |------|-------|
//! | 0-1  | route type |
//! | 2-5  | payload type |
//! | 6-7  | payload version |
//!
//! followed by optional transport codes (4 bytes, transport routes only), a
//! one byte path length, the path, and the payload.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_PACKET_PAYLOAD, MAX_PATH_SIZE, PAYLOAD_TYPE_MASK, PAYLOAD_TYPE_SHIFT,
    PAYLOAD_VERSION_MASK, PAYLOAD_VERSION_SHIFT, ROUTE_TYPE_MASK, TRANSPORT_CODES_SIZE,
};
use crate::errors::WireError;

// ─────────────────────────────────────────────────────────────────────────────
// Header codes
// ─────────────────────────────────────────────────────────────────────────────

/// Route type (bits 0-1 of the header).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteType {
    /// Flood with transport codes.
    TransportFlood = 0x00,
    /// Flood, path built up hop by hop.
    Flood = 0x01,
    /// Direct, path supplied by the sender.
    Direct = 0x02,
    /// Direct with transport codes.
    TransportDirect = 0x03,
}

impl RouteType {
    /// Map a route-type code to its variant.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::TransportFlood),
            0x01 => Some(Self::Flood),
            0x02 => Some(Self::Direct),
            0x03 => Some(Self::TransportDirect),
            _ => None,
        }
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::TransportFlood => "TRANSPORT_FLOOD",
            Self::Flood => "FLOOD",
            Self::Direct => "DIRECT",
            Self::TransportDirect => "TRANSPORT_DIRECT",
        }
    }

    /// Whether frames with this route carry the 4-byte transport-code block.
    pub fn has_transport_codes(self) -> bool {
        matches!(self, Self::TransportFlood | Self::TransportDirect)
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload type (bits 2-5 of the header).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Request to a specific node.
    Request = 0x00,
    /// Response to a request.
    Response = 0x01,
    /// Direct text message.
    TextMessage = 0x02,
    /// Acknowledgement.
    Ack = 0x03,
    /// Node advertisement.
    Advert = 0x04,
    /// Channel text message.
    GroupText = 0x05,
    /// Channel datagram.
    GroupData = 0x06,
    /// Anonymous request.
    AnonRequest = 0x07,
    /// Returned path.
    Path = 0x08,
    /// Path trace.
    Trace = 0x09,
    /// Multi-part packet.
    Multipart = 0x0A,
    /// Unencrypted control data.
    Control = 0x0B,
    /// Application-defined raw payload.
    RawCustom = 0x0F,
}

impl PayloadType {
    /// Every defined payload type, in code order.
    pub const ALL: [PayloadType; 13] = [
        Self::Request,
        Self::Response,
        Self::TextMessage,
        Self::Ack,
        Self::Advert,
        Self::GroupText,
        Self::GroupData,
        Self::AnonRequest,
        Self::Path,
        Self::Trace,
        Self::Multipart,
        Self::Control,
        Self::RawCustom,
    ];

    /// Map a payload-type code to its variant. Reserved codes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u8 == code)
    }

    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Request => "REQ",
            Self::Response => "RESPONSE",
            Self::TextMessage => "TXT_MSG",
            Self::Ack => "ACK",
            Self::Advert => "ADVERT",
            Self::GroupText => "GRP_TXT",
            Self::GroupData => "GRP_DATA",
            Self::AnonRequest => "ANON_REQ",
            Self::Path => "PATH",
            Self::Trace => "TRACE",
            Self::Multipart => "MULTIPART",
            Self::Control => "CONTROL",
            Self::RawCustom => "RAW_CUSTOM",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name for a payload-type code, `UNKNOWN_<n>` for reserved codes.
pub fn payload_type_name(code: u8) -> Cow<'static, str> {
    PayloadType::from_code(code).map_or_else(
        || Cow::Owned(format!("UNKNOWN_{code}")),
        |t| Cow::Borrowed(t.name()),
    )
}

/// Name for a route-type code, `UNKNOWN_<n>` outside the two-bit range.
pub fn route_type_name(code: u8) -> Cow<'static, str> {
    RouteType::from_code(code).map_or_else(
        || Cow::Owned(format!("UNKNOWN_{code}")),
        |t| Cow::Borrowed(t.name()),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Side-channel decryption results
// ─────────────────────────────────────────────────────────────────────────────

/// Fields recovered by the protocol node's group-text handler.
///
/// Every field is optional: the handler reports whatever it managed to
/// extract and the decoder forwards it verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTextData {
    /// Name of the channel the message was decrypted with.
    pub channel_name: Option<String>,
    /// One-byte channel hash.
    pub channel_hash: Option<u8>,
    /// Sender name parsed from the message body.
    pub sender_name: Option<String>,
    /// Message text without the sender prefix.
    pub text: Option<String>,
    /// Full decrypted content.
    pub full_content: Option<String>,
    /// Message type label.
    pub message_type: Option<String>,
    /// Sender timestamp.
    pub timestamp: Option<u32>,
    /// Message flags.
    pub flags: Option<u8>,
}

/// Decrypted side values attached to a packet by the protocol node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Decryption {
    /// Result of group-text decryption.
    pub group_text: Option<GroupTextData>,
    /// Decrypted direct-message text.
    pub text: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// RawPacket
// ─────────────────────────────────────────────────────────────────────────────

/// A received packet as exposed by a full protocol node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawPacket {
    /// Header byte.
    pub header: u8,
    /// Transport codes, present on transport route types.
    pub transport_codes: Option<[u16; 2]>,
    /// Declared path length.
    pub path_len: Option<u8>,
    /// Path bytes (one hash byte per hop).
    pub path: Option<Vec<u8>>,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Declared payload length, if the node reports one.
    pub payload_len: Option<usize>,
    /// Full serialised frame.
    pub raw: Option<Vec<u8>>,
    /// Packet CRC, if the node computes one.
    pub crc: Option<u32>,
    /// Received signal strength in dBm.
    pub rssi: Option<i16>,
    /// Signal-to-noise ratio in dB.
    pub snr: Option<f64>,
    /// Values decrypted out-of-band by the node's handlers.
    pub decrypted: Option<Decryption>,
}

impl RawPacket {
    /// Create a packet from a header byte and payload; everything else absent.
    pub fn new(header: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            header,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Build a header byte from its parts.
    pub fn header_byte(route_type: RouteType, payload_type: PayloadType, version: u8) -> u8 {
        (route_type as u8)
            | ((payload_type as u8) << PAYLOAD_TYPE_SHIFT)
            | ((version & PAYLOAD_VERSION_MASK) << PAYLOAD_VERSION_SHIFT)
    }

    /// Parse a serialised frame.
    ///
    /// The parsed packet keeps the frame as its raw bytes and reports the
    /// payload length it found. Telemetry, CRC and decrypted values stay
    /// absent; callers attach them with the `with_*` setters.
    pub fn from_wire(frame: &[u8]) -> Result<Self, WireError> {
        let (&header, mut rest) = frame.split_first().ok_or(WireError::Empty)?;

        let route = RouteType::from_code(header & ROUTE_TYPE_MASK);
        let transport_codes = if route.is_some_and(RouteType::has_transport_codes) {
            let block = take(&mut rest, TRANSPORT_CODES_SIZE, "transport_codes")?;
            Some([
                u16::from_le_bytes([block[0], block[1]]),
                u16::from_le_bytes([block[2], block[3]]),
            ])
        } else {
            None
        };

        let path_len = take(&mut rest, 1, "path_len")?[0];
        if usize::from(path_len) > MAX_PATH_SIZE {
            return Err(WireError::PathTooLong(usize::from(path_len)));
        }
        let path = take(&mut rest, usize::from(path_len), "path")?.to_vec();

        if rest.len() > MAX_PACKET_PAYLOAD {
            return Err(WireError::PayloadTooLong(rest.len()));
        }

        Ok(Self {
            header,
            transport_codes,
            path_len: Some(path_len),
            path: Some(path),
            payload: rest.to_vec(),
            payload_len: Some(rest.len()),
            raw: Some(frame.to_vec()),
            crc: None,
            rssi: None,
            snr: None,
            decrypted: None,
        })
    }

    /// Parse a frame given as a hex string.
    pub fn from_hex(hex_frame: &str) -> Result<Self, WireError> {
        let bytes = hex::decode(hex_frame.trim())?;
        Self::from_wire(&bytes)
    }

    /// Attach radio telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, rssi: Option<i16>, snr: Option<f64>) -> Self {
        self.rssi = rssi;
        self.snr = snr;
        self
    }

    /// Attach a path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        self.path_len = u8::try_from(path.len()).ok();
        self.path = Some(path);
        self
    }

    /// Attach decrypted side values.
    #[must_use]
    pub fn with_decrypted(mut self, decrypted: Decryption) -> Self {
        self.decrypted = Some(decrypted);
        self
    }

    /// Attach the serialised frame.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Attach a CRC.
    #[must_use]
    pub fn with_crc(mut self, crc: u32) -> Self {
        self.crc = Some(crc);
        self
    }

    /// Payload-type code from the header.
    pub fn payload_type_code(&self) -> u8 {
        (self.header >> PAYLOAD_TYPE_SHIFT) & PAYLOAD_TYPE_MASK
    }

    /// Route-type code from the header.
    pub fn route_type_code(&self) -> u8 {
        self.header & ROUTE_TYPE_MASK
    }

    /// Payload version from the header.
    pub fn payload_version(&self) -> u8 {
        (self.header >> PAYLOAD_VERSION_SHIFT) & PAYLOAD_VERSION_MASK
    }

    /// Typed payload type, `None` for reserved codes.
    pub fn payload_type(&self) -> Option<PayloadType> {
        PayloadType::from_code(self.payload_type_code())
    }

    /// Typed route type.
    pub fn route_type(&self) -> Option<RouteType> {
        RouteType::from_code(self.route_type_code())
    }

    /// Length of the serialised frame, when the frame is known.
    pub fn raw_len(&self) -> Option<usize> {
        self.raw.as_ref().map(Vec::len)
    }

    /// Serialised frame as lowercase hex, empty when unknown.
    pub fn raw_hex(&self) -> String {
        self.raw.as_deref().map(hex::encode).unwrap_or_default()
    }

    /// Payload as lowercase hex.
    pub fn payload_hex(&self) -> String {
        hex::encode(&self.payload)
    }

    /// Hex of the first `path_len` path bytes; empty when either is absent
    /// or the length is zero.
    pub fn path_hex(&self) -> String {
        match (self.path_len, self.path.as_deref()) {
            (Some(len), Some(path)) if len > 0 => {
                let end = usize::from(len).min(path.len());
                hex::encode(&path[..end])
            }
            _ => String::new(),
        }
    }

    /// Group-text side value, if the node decrypted one.
    pub fn group_text_data(&self) -> Option<&GroupTextData> {
        self.decrypted.as_ref()?.group_text.as_ref()
    }

    /// Direct-text side value, if the node decrypted one.
    pub fn decrypted_text(&self) -> Option<&str> {
        self.decrypted.as_ref()?.text.as_deref()
    }
}

/// Split `n` bytes off the front of `buf`.
fn take<'a>(buf: &mut &'a [u8], n: usize, field: &'static str) -> Result<&'a [u8], WireError> {
    if buf.len() < n {
        return Err(WireError::Truncated {
            field,
            needed: n,
            available: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

// ─────────────────────────────────────────────────────────────────────────────
// Companion RX log event
// ─────────────────────────────────────────────────────────────────────────────

/// A raw frame reported by a companion device, with its telemetry.
///
/// Companion firmware forwards frames without protocol decoding, so only the
/// bytes and the radio measurements are known.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RxLogEvent {
    /// Raw frame bytes.
    pub raw: Vec<u8>,
    /// Received signal strength in dBm.
    pub rssi: Option<i16>,
    /// Signal-to-noise ratio in dB.
    pub snr: Option<f64>,
}

impl RxLogEvent {
    /// Frame as lowercase hex.
    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }
}

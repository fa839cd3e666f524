//! Advert payload decoder.
//!
//! Decoding is two-staged. The envelope is a 32-byte public key, a u32 LE
//! timestamp, a 64-byte signature and an appdata blob. The appdata blob starts
//! with a flags byte whose low nibble is the node type and whose high bits
//! announce optional fields, in this order:
//!
//! | flag | field | size |
//! |------|-------|------|
//! | `0x10` | latitude, longitude (i32 LE micro-degrees) | 8 |
//! | `0x20` | feature1 (u16 LE) | 2 |
//! | `0x40` | feature2 (u16 LE) | 2 |
//! | `0x80` | node name (rest of blob) | n |
//!
//! A failure in either stage replaces the whole advert with one error object.

use serde::{Deserialize, Serialize};

use super::{DecodeFailure, FailureReason, Outcome, le_u16, le_u32};
use crate::constants::{
    ADVERT_APPDATA_OFFSET, ADVERT_FLAG_HAS_FEATURE1, ADVERT_FLAG_HAS_FEATURE2,
    ADVERT_FLAG_HAS_LOCATION, ADVERT_FLAG_HAS_NAME, ADVERT_PUB_KEY_SIZE,
};

const MICRO_DEGREES: f64 = 1_000_000.0;

/// Decoded advert envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvertInfo {
    /// Advertiser public key as hex.
    pub pub_key: String,
    /// Advertiser clock at send time (seconds).
    pub timestamp: u32,
    /// Decoded application data.
    pub appdata: Appdata,
}

/// Kind of node announced in an advert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Companion / chat node.
    Chat,
    /// Repeater.
    Repeater,
    /// Room server.
    RoomServer,
    /// Sensor.
    Sensor,
    /// Any other nibble.
    Unknown,
}

impl NodeType {
    /// Map the low nibble of the appdata flags.
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x01 => Self::Chat,
            0x02 => Self::Repeater,
            0x03 => Self::RoomServer,
            0x04 => Self::Sensor,
            _ => Self::Unknown,
        }
    }
}

/// Decoded appdata. Fields the flags do not announce are omitted; an empty
/// blob serialises as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Appdata {
    /// Raw flags byte.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u8>,
    /// Node type from the flags' low nibble.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    /// Latitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Reserved feature word 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature1: Option<u16>,
    /// Reserved feature word 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature2: Option<u16>,
    /// Node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Decode an advert payload.
pub fn decode_advert(payload: &[u8]) -> Outcome<AdvertInfo> {
    let failure = |reason| -> Outcome<AdvertInfo> {
        Outcome::Failed(DecodeFailure::new(reason, payload.len()))
    };

    if payload.len() < ADVERT_APPDATA_OFFSET {
        return failure(FailureReason::PayloadTooShort);
    }
    let Some(timestamp) = le_u32(payload, ADVERT_PUB_KEY_SIZE) else {
        return failure(FailureReason::PayloadTooShort);
    };
    let Some(appdata) = decode_appdata(&payload[ADVERT_APPDATA_OFFSET..]) else {
        return failure(FailureReason::AppdataTruncated);
    };

    Outcome::Ok(AdvertInfo {
        pub_key: hex::encode(&payload[..ADVERT_PUB_KEY_SIZE]),
        timestamp,
        appdata,
    })
}

/// Decode the appdata blob; `None` when a flagged field runs past the end.
pub fn decode_appdata(blob: &[u8]) -> Option<Appdata> {
    let Some((&flags, rest)) = blob.split_first() else {
        return Some(Appdata::default());
    };
    let mut appdata = Appdata {
        flags: Some(flags),
        node_type: Some(NodeType::from_nibble(flags)),
        ..Appdata::default()
    };

    let mut offset = 0;
    if flags & ADVERT_FLAG_HAS_LOCATION != 0 {
        let lat = i32::from_le_bytes(le_u32(rest, offset)?.to_le_bytes());
        let lon = i32::from_le_bytes(le_u32(rest, offset + 4)?.to_le_bytes());
        appdata.latitude = Some(f64::from(lat) / MICRO_DEGREES);
        appdata.longitude = Some(f64::from(lon) / MICRO_DEGREES);
        offset += 8;
    }
    if flags & ADVERT_FLAG_HAS_FEATURE1 != 0 {
        appdata.feature1 = Some(le_u16(rest, offset)?);
        offset += 2;
    }
    if flags & ADVERT_FLAG_HAS_FEATURE2 != 0 {
        appdata.feature2 = Some(le_u16(rest, offset)?);
        offset += 2;
    }
    if flags & ADVERT_FLAG_HAS_NAME != 0 {
        let raw = rest.get(offset..)?;
        let name = String::from_utf8_lossy(raw);
        appdata.name = Some(name.trim_end_matches('\0').to_owned());
    }

    Some(appdata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ADVERT_SIGNATURE_SIZE;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn envelope(timestamp: u32, appdata: &[u8]) -> Vec<u8> {
        let mut payload = vec![0xAB; ADVERT_PUB_KEY_SIZE];
        payload.extend_from_slice(&timestamp.to_le_bytes());
        payload.extend(std::iter::repeat_n(0x55, ADVERT_SIGNATURE_SIZE));
        payload.extend_from_slice(appdata);
        payload
    }

    #[test]
    fn envelope_without_appdata() {
        let out = decode_advert(&envelope(1_700_000_000, &[]));
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "pub_key": "ab".repeat(32),
                "timestamp": 1_700_000_000,
                "appdata": {},
            })
        );
    }

    #[test]
    fn repeater_with_location_and_name() {
        let mut appdata = vec![0x02 | ADVERT_FLAG_HAS_LOCATION | ADVERT_FLAG_HAS_NAME];
        appdata.extend_from_slice(&51_500_000i32.to_le_bytes());
        appdata.extend_from_slice(&(-120_000i32).to_le_bytes());
        appdata.extend_from_slice(b"Hilltop\0\0");

        let out = decode_advert(&envelope(42, &appdata));
        let info = out.ok().unwrap();
        assert_eq!(info.timestamp, 42);
        assert_eq!(info.appdata.node_type, Some(NodeType::Repeater));
        assert_eq!(info.appdata.latitude, Some(51.5));
        assert_eq!(info.appdata.longitude, Some(-0.12));
        assert_eq!(info.appdata.name.as_deref(), Some("Hilltop"));
        assert!(info.appdata.feature1.is_none());
    }

    #[test]
    fn features_are_read_in_order() {
        let appdata = [0x01 | ADVERT_FLAG_HAS_FEATURE1 | ADVERT_FLAG_HAS_FEATURE2, 0x01, 0x00, 0x02, 0x00];
        let parsed = decode_appdata(&appdata).unwrap();
        assert_eq!(parsed.node_type, Some(NodeType::Chat));
        assert_eq!(parsed.feature1, Some(1));
        assert_eq!(parsed.feature2, Some(2));
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            json!({"flags": 0x61, "node_type": "chat", "feature1": 1, "feature2": 2})
        );
    }

    #[test]
    fn room_server_and_unknown_node_types() {
        assert_eq!(NodeType::from_nibble(0x03), NodeType::RoomServer);
        assert_eq!(NodeType::from_nibble(0x04), NodeType::Sensor);
        assert_eq!(NodeType::from_nibble(0x00), NodeType::Unknown);
        assert_eq!(NodeType::from_nibble(0x0F), NodeType::Unknown);
        assert_eq!(
            serde_json::to_value(NodeType::RoomServer).unwrap(),
            json!("room_server")
        );
    }

    #[test]
    fn short_envelope_fails() {
        let out = decode_advert(&[0u8; 99]);
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"error": "payload_too_short", "payload_len": 99})
        );
    }

    #[test]
    fn truncated_location_collapses_to_error() {
        let appdata = [ADVERT_FLAG_HAS_LOCATION, 0x01, 0x02, 0x03];
        let payload = envelope(0, &appdata);
        assert_matches!(
            decode_advert(&payload),
            Outcome::Failed(DecodeFailure {
                error: FailureReason::AppdataTruncated,
                payload_len,
            }) if payload_len == payload.len()
        );
    }

    #[test]
    fn name_flag_with_no_bytes_is_empty_name() {
        let parsed = decode_appdata(&[ADVERT_FLAG_HAS_NAME]).unwrap();
        assert_eq!(parsed.name.as_deref(), Some(""));
    }

    #[test]
    fn invalid_utf8_name_is_lossy() {
        let parsed = decode_appdata(&[ADVERT_FLAG_HAS_NAME, b'n', 0xFF, b'x']).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("n\u{FFFD}x"));
    }
}

//! Externally consumable packet records.
//!
//! A [`PacketRecord`] is built once per received packet, handed to the
//! broadcast hub and dropped. Every optional upstream attribute that is absent
//! becomes `null`; bytes are always lowercase hex.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::decoder::{Decoded, decode_packet};
use crate::packet::{RawPacket, RxLogEvent, payload_type_name, route_type_name};

/// Hex rendering of a byte section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HexSection {
    /// Lowercase hex, empty when unknown.
    pub hex: String,
}

/// Header summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PacketSummary {
    /// Header byte.
    pub header: u8,
    /// Payload-type code.
    pub payload_type: u8,
    /// Payload-type name, `UNKNOWN_<n>` for reserved codes.
    pub payload_type_name: Cow<'static, str>,
    /// Route-type code.
    pub route_type: u8,
    /// Route-type name.
    pub route_type_name: Cow<'static, str>,
    /// Declared payload length.
    pub payload_len: Option<usize>,
    /// Serialised frame length.
    pub raw_len: Option<usize>,
    /// Packet CRC.
    pub crc: Option<u32>,
}

/// Radio telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RadioInfo {
    /// dBm.
    pub rssi: Option<i16>,
    /// dB.
    pub snr: Option<f64>,
}

/// Routing information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoutingInfo {
    /// Declared path length.
    pub path_len: Option<u8>,
    /// Hex of the first `path_len` path bytes.
    pub path: String,
}

/// One record pushed to subscribers.
///
/// Companion records carry only `ts`, `raw_packet` and `radio`; the remaining
/// sections are omitted from their JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketRecord {
    /// Capture time, seconds since the Unix epoch.
    pub ts: f64,
    /// Serialised frame.
    pub raw_packet: HexSection,
    /// Header summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet: Option<PacketSummary>,
    /// Radio telemetry.
    pub radio: RadioInfo,
    /// Routing information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingInfo>,
    /// Payload bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<HexSection>,
    /// Decoded payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<Decoded>,
}

impl PacketRecord {
    /// True for companion records, which carry no decoded payload.
    pub fn is_minimal(&self) -> bool {
        self.packet.is_none()
    }

    /// Metrics label for the record kind.
    pub fn kind(&self) -> &'static str {
        if self.is_minimal() { "rx_log" } else { "packet" }
    }
}

/// Assembles [`PacketRecord`]s. Never mutates its input.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordBuilder;

impl RecordBuilder {
    /// Build a full record, stamped with the current time.
    pub fn build(packet: &RawPacket) -> PacketRecord {
        Self::build_at(packet, now_secs())
    }

    /// Build a full record with an explicit capture time.
    pub fn build_at(packet: &RawPacket, ts: f64) -> PacketRecord {
        let payload_type = packet.payload_type_code();
        let route_type = packet.route_type_code();
        PacketRecord {
            ts,
            raw_packet: HexSection {
                hex: packet.raw_hex(),
            },
            packet: Some(PacketSummary {
                header: packet.header,
                payload_type,
                payload_type_name: payload_type_name(payload_type),
                route_type,
                route_type_name: route_type_name(route_type),
                payload_len: packet.payload_len,
                raw_len: packet.raw_len(),
                crc: packet.crc,
            }),
            radio: RadioInfo {
                rssi: packet.rssi,
                snr: packet.snr,
            },
            routing: Some(RoutingInfo {
                path_len: packet.path_len,
                path: packet.path_hex(),
            }),
            payload: Some(HexSection {
                hex: packet.payload_hex(),
            }),
            decoded: Some(decode_packet(packet)),
        }
    }

    /// Build the minimal companion record, stamped with the current time.
    pub fn build_rx_log(event: &RxLogEvent) -> PacketRecord {
        Self::build_rx_log_at(event, now_secs())
    }

    /// Build the minimal companion record with an explicit capture time.
    pub fn build_rx_log_at(event: &RxLogEvent, ts: f64) -> PacketRecord {
        PacketRecord {
            ts,
            raw_packet: HexSection {
                hex: event.raw_hex(),
            },
            packet: None,
            radio: RadioInfo {
                rssi: event.rssi,
                snr: event.snr,
            },
            routing: None,
            payload: None,
            decoded: None,
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

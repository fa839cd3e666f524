//! Control payload decoder.
//!
//! The high nibble of the first byte selects the control sub-type. Only node
//! discovery requests and responses are understood; any other nibble, or a
//! discovery frame shorter than six bytes, decodes as `kind: "unknown"`.

use serde::{Deserialize, Serialize};

use super::{DecodeFailure, FailureReason, Outcome, le_u32};
use crate::constants::{CTL_TYPE_NODE_DISCOVER_REQ, CTL_TYPE_NODE_DISCOVER_RESP};

/// Minimum length of a node-discovery frame.
const DISCOVER_MIN_LEN: usize = 6;
/// Length at which a discovery request carries a `since` timestamp.
const DISCOVER_REQ_SINCE_LEN: usize = 10;

/// Decoded control payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInfo {
    /// Sub-type nibble rendered as `0xNN`.
    pub control_type: String,
    /// Sub-type specific fields, tagged by `kind`.
    #[serde(flatten)]
    pub kind: ControlKind,
}

/// Control sub-types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlKind {
    /// Node discovery request.
    NodeDiscoverReq {
        /// Only a public-key prefix is requested in responses.
        prefix_only: bool,
        /// Node-type filter.
        filter: u8,
        /// Request tag echoed by responders.
        tag: u32,
        /// Only nodes heard since this timestamp should answer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<u32>,
    },
    /// Node discovery response.
    NodeDiscoverResp {
        /// Responder's node type.
        node_type: u8,
        /// Tag of the request being answered.
        tag: u32,
        /// Responder's public key (or prefix) as hex.
        pub_key: String,
    },
    /// Sub-type not understood.
    Unknown,
}

/// Decode a control payload.
pub fn decode_control(payload: &[u8]) -> Outcome<ControlInfo> {
    let Some(&first) = payload.first() else {
        return DecodeFailure::new(FailureReason::EmptyPayload, 0).into();
    };
    let ctl_type = first & 0xF0;

    // A tag at offset 2 implies the six-byte discovery minimum.
    let kind = match (ctl_type, le_u32(payload, 2)) {
        (CTL_TYPE_NODE_DISCOVER_REQ, Some(tag)) => {
            ControlKind::NodeDiscoverReq {
                prefix_only: first & 0x01 != 0,
                filter: payload[1],
                tag,
                since: if payload.len() >= DISCOVER_REQ_SINCE_LEN {
                    le_u32(payload, 6)
                } else {
                    None
                },
            }
        }
        (CTL_TYPE_NODE_DISCOVER_RESP, Some(tag)) => {
            ControlKind::NodeDiscoverResp {
                node_type: first & 0x0F,
                tag,
                pub_key: hex::encode(&payload[DISCOVER_MIN_LEN..]),
            }
        }
        _ => ControlKind::Unknown,
    };

    Outcome::Ok(ControlInfo {
        control_type: format!("0x{ctl_type:02X}"),
        kind,
    })
}

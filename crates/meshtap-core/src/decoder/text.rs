//! Group-text and direct-text decoders.
//!
//! Both payloads are encrypted. Decryption belongs to the protocol node's
//! handlers, so these decoders only forward what the node attached to the
//! packet and otherwise report `decrypted: false`.

use serde::{Deserialize, Serialize};

use crate::packet::GroupTextData;

/// Decoded channel text message.
///
/// When not decrypted only `decrypted` and `channel_hash` are emitted; the
/// message fields appear (possibly as `null`) once the node decrypted it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupTextInfo {
    /// Whether the node supplied decrypted content.
    pub decrypted: bool,
    /// One-byte channel hash.
    pub channel_hash: Option<u8>,
    /// Decrypted message fields.
    #[serde(flatten)]
    pub message: Option<GroupTextMessage>,
}

/// Fields of a decrypted channel message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct GroupTextMessage {
    pub channel_name: Option<String>,
    pub sender_name: Option<String>,
    pub text: Option<String>,
    pub full_content: Option<String>,
    pub message_type: Option<String>,
    pub timestamp: Option<u32>,
    pub flags: Option<u8>,
}

impl From<&GroupTextData> for GroupTextMessage {
    fn from(d: &GroupTextData) -> Self {
        Self {
            channel_name: d.channel_name.clone(),
            sender_name: d.sender_name.clone(),
            text: d.text.clone(),
            full_content: d.full_content.clone(),
            message_type: d.message_type.clone(),
            timestamp: d.timestamp,
            flags: d.flags,
        }
    }
}

/// Decoded direct text message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInfo {
    /// Whether the node supplied decrypted text.
    pub decrypted: bool,
    /// Decrypted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Prefer the node's decrypted value; otherwise report the channel hash byte.
pub fn decode_group_text(payload: &[u8], side: Option<&GroupTextData>) -> GroupTextInfo {
    match side {
        Some(data) => GroupTextInfo {
            decrypted: true,
            channel_hash: data.channel_hash,
            message: Some(data.into()),
        },
        None => GroupTextInfo {
            decrypted: false,
            channel_hash: payload.first().copied(),
            message: None,
        },
    }
}

/// Report the node's decrypted text, if it attached one.
pub fn decode_text(side: Option<&str>) -> TextInfo {
    TextInfo {
        decrypted: side.is_some(),
        text: side.map(str::to_owned),
    }
}

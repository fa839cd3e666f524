//! Protocol constants for MeshCore frames.

/// Maximum serialised frame size in bytes.
pub const MAX_PACKET_SIZE: usize = 255;

/// Maximum path length in bytes.
pub const MAX_PATH_SIZE: usize = 64;

/// Maximum payload length in bytes.
pub const MAX_PACKET_PAYLOAD: usize = 184;

/// Size of the transport-code block present on transport route types.
pub const TRANSPORT_CODES_SIZE: usize = 4;

/// Mask for the route type (bits 0-1 of the header).
pub const ROUTE_TYPE_MASK: u8 = 0x03;

/// Shift and mask for the payload type (bits 2-5 of the header).
pub const PAYLOAD_TYPE_SHIFT: u8 = 2;
/// See [`PAYLOAD_TYPE_SHIFT`].
pub const PAYLOAD_TYPE_MASK: u8 = 0x0F;

/// Shift and mask for the payload version (bits 6-7 of the header).
pub const PAYLOAD_VERSION_SHIFT: u8 = 6;
/// See [`PAYLOAD_VERSION_SHIFT`].
pub const PAYLOAD_VERSION_MASK: u8 = 0x03;

// ── Advert layout ──────────────────────────────────────────────────────────

/// Ed25519 public key length in an advert.
pub const ADVERT_PUB_KEY_SIZE: usize = 32;
/// Advert timestamp length (u32 LE).
pub const ADVERT_TIMESTAMP_SIZE: usize = 4;
/// Ed25519 signature length in an advert.
pub const ADVERT_SIGNATURE_SIZE: usize = 64;
/// Offset of the application-data blob inside an advert payload.
pub const ADVERT_APPDATA_OFFSET: usize =
    ADVERT_PUB_KEY_SIZE + ADVERT_TIMESTAMP_SIZE + ADVERT_SIGNATURE_SIZE;

/// Appdata flag: latitude/longitude follow.
pub const ADVERT_FLAG_HAS_LOCATION: u8 = 0x10;
/// Appdata flag: reserved feature word 1 follows.
pub const ADVERT_FLAG_HAS_FEATURE1: u8 = 0x20;
/// Appdata flag: reserved feature word 2 follows.
pub const ADVERT_FLAG_HAS_FEATURE2: u8 = 0x40;
/// Appdata flag: node name fills the rest of the blob.
pub const ADVERT_FLAG_HAS_NAME: u8 = 0x80;

// ── Control sub-types ──────────────────────────────────────────────────────

/// Control sub-type: node discovery request.
pub const CTL_TYPE_NODE_DISCOVER_REQ: u8 = 0x80;
/// Control sub-type: node discovery response.
pub const CTL_TYPE_NODE_DISCOVER_RESP: u8 = 0x90;

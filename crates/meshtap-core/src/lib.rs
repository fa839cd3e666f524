//! # meshtap-core
//!
//! Packet model and decoding pipeline for the meshtap packet tap.
//!
//! - **Packet model**: [`packet::RawPacket`] as handed over by a protocol node,
//!   [`packet::RxLogEvent`] as emitted by a companion device
//! - **Wire parsing**: [`packet::RawPacket::from_wire`] for serialised frames
//! - **Decoders**: [`decoder::decode`] dispatches a payload to its field decoder
//!   and always yields exactly one [`decoder::Decoded`] variant
//! - **Records**: [`record::RecordBuilder`] assembles the JSON-safe
//!   [`record::PacketRecord`] pushed to subscribers
//! - **Sources**: the [`source::PacketSource`] seam plus channel and
//!   line-oriented implementations

#![deny(unsafe_code)]

pub mod constants;
pub mod decoder;
pub mod errors;
pub mod packet;
pub mod record;
pub mod source;

pub use decoder::{Decoded, decode};
pub use errors::{LineError, SourceError, WireError};
pub use packet::{Decryption, GroupTextData, PayloadType, RawPacket, RouteType, RxLogEvent};
pub use record::{PacketRecord, RecordBuilder};
pub use source::{PacketSource, SourceMode, SourceSpec, UpstreamEvent};

//! Codec errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("Malformed packet: expected {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },

    #[error("Unknown packet type {0}")]
    UnknownPacketType(u32),

    #[error("Packet type {actual:?} cannot be decoded as {expected}")]
    WrongPacketKind {
        expected: &'static str,
        actual: crate::PacketType,
    },
}

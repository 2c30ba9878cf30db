//! Packet type tag

use crate::ProtoError;
use tether_types::PACKET_TYPE_SIZE;

/// Leading tag of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    /// Public key exchange, sent once in each direction
    KeyExchange = 0,
    /// Client request: run a region with the enclosed context
    ExecuteTetherRegion = 1,
    /// Server response: the context after the region ran
    CPUStateTransfer = 2,
}

impl PacketType {
    pub fn from_wire(raw: u32) -> Result<Self, ProtoError> {
        match raw {
            0 => Ok(PacketType::KeyExchange),
            1 => Ok(PacketType::ExecuteTetherRegion),
            2 => Ok(PacketType::CPUStateTransfer),
            other => Err(ProtoError::UnknownPacketType(other)),
        }
    }

    pub const fn to_wire(self) -> u32 {
        self as u32
    }

    /// Tag bytes as they appear on the wire
    pub const fn to_bytes(self) -> [u8; PACKET_TYPE_SIZE] {
        self.to_wire().to_le_bytes()
    }

    /// Whether packets of this type carry a [`crate::SecureEnvelope`]
    pub const fn is_envelope(self) -> bool {
        matches!(
            self,
            PacketType::ExecuteTetherRegion | PacketType::CPUStateTransfer
        )
    }
}

/// Reads the packet type without validating the rest of the packet
pub fn peek_type(bytes: &[u8]) -> Result<PacketType, ProtoError> {
    let raw = read_u32(bytes, 0).ok_or(ProtoError::MalformedPacket {
        expected: PACKET_TYPE_SIZE,
        actual: bytes.len(),
    })?;
    PacketType::from_wire(raw)
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

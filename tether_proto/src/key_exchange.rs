//! Key exchange packet

use crate::packet::read_u32;
use crate::{PacketType, ProtoError};
use tether_types::{KEY_EXCHANGE_SIZE, PACKET_TYPE_SIZE, PUBLIC_KEY_SIZE};

/// Protocol version plus an X25519 public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchangeMessage {
    pub version: u32,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyExchangeMessage {
    pub fn new(version: u32, public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            version,
            public_key,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(KEY_EXCHANGE_SIZE);
        out.extend_from_slice(&PacketType::KeyExchange.to_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.public_key);
        out
    }

    /// Decodes a complete key-exchange packet, type tag included
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() != KEY_EXCHANGE_SIZE {
            return Err(ProtoError::MalformedPacket {
                expected: KEY_EXCHANGE_SIZE,
                actual: bytes.len(),
            });
        }

        let packet_type = crate::peek_type(bytes)?;
        if packet_type != PacketType::KeyExchange {
            return Err(ProtoError::WrongPacketKind {
                expected: "KeyExchange",
                actual: packet_type,
            });
        }

        let version = read_u32(bytes, PACKET_TYPE_SIZE).ok_or(ProtoError::MalformedPacket {
            expected: KEY_EXCHANGE_SIZE,
            actual: bytes.len(),
        })?;
        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&bytes[PACKET_TYPE_SIZE + 4..]);

        Ok(Self {
            version,
            public_key,
        })
    }
}

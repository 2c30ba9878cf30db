//! Authenticated register-context envelope

use crate::{PacketType, ProtoError};
use tether_types::{
    NONCE_SIZE, PACKET_TYPE_SIZE, REGISTER_CONTEXT_SIZE, SECURE_ENVELOPE_SIZE, TAG_SIZE,
};

const NONCE_OFFSET: usize = PACKET_TYPE_SIZE;
const CIPHERTEXT_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
const TAG_OFFSET: usize = CIPHERTEXT_OFFSET + REGISTER_CONTEXT_SIZE;

/// An encrypted [`tether_types::RegisterContext`] with its nonce and tag
///
/// The ciphertext is always exactly one register context long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureEnvelope {
    pub packet_type: PacketType,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: [u8; REGISTER_CONTEXT_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl SecureEnvelope {
    /// Associated data bound into the tag: the packet-type bytes only
    pub fn associated_data(&self) -> [u8; PACKET_TYPE_SIZE] {
        self.packet_type.to_bytes()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECURE_ENVELOPE_SIZE);
        out.extend_from_slice(&self.packet_type.to_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Decodes a complete envelope packet, type tag included
    ///
    /// Only the shape is checked here; authenticity is checked when the
    /// envelope is opened.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() != SECURE_ENVELOPE_SIZE {
            return Err(ProtoError::MalformedPacket {
                expected: SECURE_ENVELOPE_SIZE,
                actual: bytes.len(),
            });
        }

        let packet_type = crate::peek_type(bytes)?;
        if !packet_type.is_envelope() {
            return Err(ProtoError::WrongPacketKind {
                expected: "SecureEnvelope",
                actual: packet_type,
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[NONCE_OFFSET..CIPHERTEXT_OFFSET]);
        let mut ciphertext = [0u8; REGISTER_CONTEXT_SIZE];
        ciphertext.copy_from_slice(&bytes[CIPHERTEXT_OFFSET..TAG_OFFSET]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&bytes[TAG_OFFSET..]);

        Ok(Self {
            packet_type,
            nonce,
            ciphertext,
            tag,
        })
    }
}

//! Authenticated register-context framing
//!
//! [`SecureChannel`] binds a provider to one session. Opening always decodes
//! the envelope shape first, so malformed input never reaches a primitive.

use crate::error::ChannelError;
use crate::session::Session;
use crate::CryptoProvider;
use tether_proto::{PacketType, SecureEnvelope};
use tether_types::{RegisterContext, NONCE_SIZE};
use zeroize::Zeroize;

pub struct SecureChannel<'a, C: CryptoProvider> {
    crypto: &'a C,
    session: &'a Session,
}

impl<'a, C: CryptoProvider> SecureChannel<'a, C> {
    pub fn new(crypto: &'a C, session: &'a Session) -> Self {
        Self { crypto, session }
    }

    /// Encrypts `context` under a fresh random nonce
    pub fn seal(
        &self,
        packet_type: PacketType,
        context: &RegisterContext,
    ) -> Result<SecureEnvelope, ChannelError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.crypto.fill_random(&mut nonce);

        let mut ciphertext = context.to_bytes();
        let tag = match self.crypto.aead_seal(
            self.session.key().as_bytes(),
            &nonce,
            &packet_type.to_bytes(),
            &mut ciphertext,
        ) {
            Ok(tag) => tag,
            Err(err) => {
                ciphertext.zeroize();
                return Err(err.into());
            }
        };

        Ok(SecureEnvelope {
            packet_type,
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Decodes and decrypts a complete envelope packet
    pub fn open(&self, bytes: &[u8]) -> Result<(PacketType, RegisterContext), ChannelError> {
        let envelope = SecureEnvelope::decode(bytes)?;
        let context = self.open_envelope(&envelope)?;
        Ok((envelope.packet_type, context))
    }

    /// Verifies and decrypts an already decoded envelope
    ///
    /// No plaintext is produced unless the tag verifies.
    pub fn open_envelope(&self, envelope: &SecureEnvelope) -> Result<RegisterContext, ChannelError> {
        let mut plaintext = envelope.ciphertext;
        let opened = self.crypto.aead_open(
            self.session.key().as_bytes(),
            &envelope.nonce,
            &envelope.associated_data(),
            &mut plaintext,
            &envelope.tag,
        );

        if let Err(err) = opened {
            plaintext.zeroize();
            return Err(err.into());
        }

        let context = RegisterContext::from_bytes(&plaintext);
        plaintext.zeroize();
        Ok(context)
    }
}

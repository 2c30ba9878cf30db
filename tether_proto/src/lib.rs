//! # Tether Wire Protocol
//!
//! Defines and validates the three packet shapes exchanged with clients.
//!
//! Every packet starts with a little-endian `u32` packet type. Two shapes
//! follow it:
//!
//! - [`KeyExchangeMessage`]: `{type, version, public key}`, 40 bytes
//! - [`SecureEnvelope`]: `{type, nonce, ciphertext, tag}`, 180 bytes, used by
//!   both `ExecuteTetherRegion` requests and `CPUStateTransfer` responses
//!
//! Validation is purely structural. Sizes are checked before any
//! cryptographic work is attempted on a packet.

pub mod envelope;
pub mod error;
pub mod key_exchange;
pub mod packet;

pub use envelope::SecureEnvelope;
pub use error::ProtoError;
pub use key_exchange::KeyExchangeMessage;
pub use packet::{peek_type, PacketType};

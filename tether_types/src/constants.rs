//! Protocol constants shared by the server and its clients.

/// Protocol version carried in every key exchange.
pub const PROTOCOL_VERSION: u32 = 0x0000_0001;

/// Size of an X25519 public or private key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a derived session key.
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce.
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Size of the leading packet-type tag.
pub const PACKET_TYPE_SIZE: usize = 4;

/// Size of a serialized [`crate::RegisterContext`].
pub const REGISTER_CONTEXT_SIZE: usize = 17 * 8;

/// Size of a key-exchange packet: type, version, public key.
pub const KEY_EXCHANGE_SIZE: usize = PACKET_TYPE_SIZE + 4 + PUBLIC_KEY_SIZE;

/// Size of a secure envelope: type, nonce, ciphertext, tag.
pub const SECURE_ENVELOPE_SIZE: usize =
    PACKET_TYPE_SIZE + NONCE_SIZE + REGISTER_CONTEXT_SIZE + TAG_SIZE;

/// x86 `RET` opcode appended to every tether region.
pub const RET_OPCODE: u8 = 0xC3;

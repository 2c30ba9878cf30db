//! # Tether Crypto
//!
//! Session establishment and authenticated framing for register contexts.
//!
//! ## Pieces
//!
//! - [`CryptoProvider`]: the black-box primitives (X25519, BLAKE2b-256,
//!   XChaCha20-Poly1305, CSPRNG). [`RealCrypto`] is the production provider;
//!   [`CountingCrypto`] wraps any provider and counts invocations.
//! - [`KeyPair`]: the server's static key material, loaded from raw files.
//! - [`SessionManager`]: the server half of the key-exchange handshake.
//! - [`SecureChannel`]: seals and opens [`tether_proto::SecureEnvelope`]s
//!   with a session key.
//!
//! ## Session key derivation
//!
//! ```text
//! shared  = X25519(own_secret, peer_public)
//! session = BLAKE2b-256(shared || server_public || client_public)
//! ```
//!
//! The server public key always comes first, whichever side computes it.

pub mod channel;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod provider;
pub mod session;

pub use channel::SecureChannel;
pub use error::{ChannelError, CryptoError, HandshakeError, KeyError};
pub use handshake::{client_hello, client_session, derive_session_key, SessionManager};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use provider::{CountingCrypto, CryptoProvider, RealCrypto};
pub use session::{Session, SessionKey};

//! Key-exchange handshake
//!
//! The server speaks first: on connect it sends its static public key and
//! protocol version. The client answers with its own key exchange; both
//! sides then derive the same session key.

use crate::error::HandshakeError;
use crate::keys::{KeyPair, PublicKey};
use crate::session::{Session, SessionKey};
use crate::CryptoProvider;
use tether_proto::KeyExchangeMessage;
use tether_types::{PROTOCOL_VERSION, PUBLIC_KEY_SIZE};
use zeroize::Zeroize;

/// `BLAKE2b-256(shared || server_public || client_public)`
pub fn derive_session_key<C: CryptoProvider>(
    crypto: &C,
    shared_secret: &[u8; 32],
    server_public: &PublicKey,
    client_public: &PublicKey,
) -> SessionKey {
    let mut input = [0u8; 32 + 2 * PUBLIC_KEY_SIZE];
    input[..32].copy_from_slice(shared_secret);
    input[32..32 + PUBLIC_KEY_SIZE].copy_from_slice(server_public.as_bytes());
    input[32 + PUBLIC_KEY_SIZE..].copy_from_slice(client_public.as_bytes());

    let key = SessionKey::from_bytes(crypto.hash(&input));
    input.zeroize();
    key
}

fn check_version(msg: &KeyExchangeMessage) -> Result<(), HandshakeError> {
    if msg.version != PROTOCOL_VERSION {
        return Err(HandshakeError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: msg.version,
        });
    }
    Ok(())
}

/// Server half of the handshake, holding the static key pair
#[derive(Debug)]
pub struct SessionManager {
    keys: KeyPair,
}

impl SessionManager {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    /// The message sent to every newly connected client
    pub fn begin_handshake(&self) -> KeyExchangeMessage {
        KeyExchangeMessage::new(PROTOCOL_VERSION, *self.keys.public().as_bytes())
    }

    /// Derives the session for a client's key exchange
    ///
    /// Nothing is computed when the version does not match.
    pub fn complete_handshake<C: CryptoProvider>(
        &self,
        crypto: &C,
        msg: &KeyExchangeMessage,
    ) -> Result<Session, HandshakeError> {
        check_version(msg)?;

        let client_public = PublicKey::from_bytes(msg.public_key);
        let mut shared = crypto.key_agree(self.keys.secret().as_bytes(), client_public.as_bytes());
        let key = derive_session_key(crypto, &shared, self.keys.public(), &client_public);
        shared.zeroize();

        Ok(Session::new(key))
    }
}

/// The key exchange a client sends in reply to the server's
pub fn client_hello(client: &KeyPair) -> KeyExchangeMessage {
    KeyExchangeMessage::new(PROTOCOL_VERSION, *client.public().as_bytes())
}

/// Client half of the handshake
///
/// Uses the same concatenation order as the server so both keys agree.
pub fn client_session<C: CryptoProvider>(
    crypto: &C,
    client: &KeyPair,
    server_msg: &KeyExchangeMessage,
) -> Result<Session, HandshakeError> {
    check_version(server_msg)?;

    let server_public = PublicKey::from_bytes(server_msg.public_key);
    let mut shared = crypto.key_agree(client.secret().as_bytes(), server_public.as_bytes());
    let key = derive_session_key(crypto, &shared, &server_public, client.public());
    shared.zeroize();

    Ok(Session::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CountingCrypto, RealCrypto};

    #[test]
    fn test_handshake_symmetry() {
        let crypto = RealCrypto::new();
        let server = SessionManager::new(KeyPair::generate(&crypto));
        let client = KeyPair::generate(&crypto);

        let server_session = server
            .complete_handshake(&crypto, &client_hello(&client))
            .unwrap();
        let client_session = client_session(&crypto, &client, &server.begin_handshake()).unwrap();

        assert_eq!(server_session.key(), client_session.key());
    }

    #[test]
    fn test_key_order_matters() {
        let crypto = RealCrypto::new();
        let a = KeyPair::generate(&crypto);
        let b = KeyPair::generate(&crypto);
        let shared = crypto.key_agree(a.secret().as_bytes(), b.public().as_bytes());

        let forward = derive_session_key(&crypto, &shared, a.public(), b.public());
        let reverse = derive_session_key(&crypto, &shared, b.public(), a.public());
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_distinct_clients_get_distinct_keys() {
        let crypto = RealCrypto::new();
        let server = SessionManager::new(KeyPair::generate(&crypto));
        let first = server
            .complete_handshake(&crypto, &client_hello(&KeyPair::generate(&crypto)))
            .unwrap();
        let second = server
            .complete_handshake(&crypto, &client_hello(&KeyPair::generate(&crypto)))
            .unwrap();

        assert_ne!(first.key(), second.key());
    }

    #[test]
    fn test_version_mismatch_does_no_crypto() {
        let crypto = CountingCrypto::new(RealCrypto::new());
        let server = SessionManager::new(KeyPair::from_secret(&crypto, [3u8; 32]));
        let msg = KeyExchangeMessage::new(PROTOCOL_VERSION + 1, [9u8; 32]);

        let result = server.complete_handshake(&crypto, &msg);
        assert_eq!(
            result.unwrap_err(),
            HandshakeError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: PROTOCOL_VERSION + 1,
            }
        );
        assert_eq!(crypto.total(), 0);
    }

    #[test]
    fn test_begin_handshake_carries_public_key() {
        let crypto = RealCrypto::new();
        let keys = KeyPair::generate(&crypto);
        let public = *keys.public();
        let server = SessionManager::new(keys);

        let msg = server.begin_handshake();
        assert_eq!(msg.version, PROTOCOL_VERSION);
        assert_eq!(&msg.public_key, public.as_bytes());
    }
}

//! Per-connection session state

use std::fmt;
use tether_types::{SessionId, SESSION_KEY_SIZE};
use zeroize::Zeroize;

/// Symmetric key derived by the handshake, zeroed on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// An established session
///
/// Owned by exactly one connection. Dropping it destroys the key.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    key: SessionKey,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            id: SessionId::new(),
            key,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = Session::new(SessionKey::from_bytes([1; 32]));
        let b = Session::new(SessionKey::from_bytes([1; 32]));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SessionKey::from_bytes([0x41; 32]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("65"));
        assert!(rendered.contains("redacted"));
    }
}

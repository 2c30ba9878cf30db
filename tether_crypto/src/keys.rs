//! Static key material
//!
//! Key files are raw 32-byte binaries. The private key never leaves
//! [`SecretKey`] and is wiped when dropped.

use crate::error::KeyError;
use crate::CryptoProvider;
use std::fmt;
use std::fs;
use std::path::Path;
use tether_types::PUBLIC_KEY_SIZE;
use zeroize::Zeroize;

/// X25519 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

/// X25519 private key, zeroed on drop
pub struct SecretKey([u8; PUBLIC_KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A public/private key pair
#[derive(Debug)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Builds a key pair from a private key, deriving its public half
    pub fn from_secret<C: CryptoProvider>(crypto: &C, secret: [u8; PUBLIC_KEY_SIZE]) -> Self {
        let secret = SecretKey::from_bytes(secret);
        let public = PublicKey::from_bytes(crypto.public_key(secret.as_bytes()));
        Self { public, secret }
    }

    /// Creates a fresh random key pair
    pub fn generate<C: CryptoProvider>(crypto: &C) -> Self {
        let mut secret = [0u8; PUBLIC_KEY_SIZE];
        crypto.fill_random(&mut secret);
        let pair = Self::from_secret(crypto, secret);
        secret.zeroize();
        pair
    }

    /// Loads a key pair from raw 32-byte key files
    ///
    /// The public key file must match the key derived from the private key.
    pub fn load<C: CryptoProvider>(
        crypto: &C,
        public_path: &Path,
        private_path: &Path,
    ) -> Result<Self, KeyError> {
        let public = PublicKey::from_bytes(read_key_file(public_path)?);
        let mut secret = read_key_file(private_path)?;
        let pair = Self::from_secret(crypto, secret);
        secret.zeroize();

        if pair.public != public {
            return Err(KeyError::KeyMismatch);
        }
        Ok(pair)
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

fn read_key_file(path: &Path) -> Result<[u8; PUBLIC_KEY_SIZE], KeyError> {
    let mut bytes = fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() != PUBLIC_KEY_SIZE {
        let len = bytes.len();
        bytes.zeroize();
        return Err(KeyError::InvalidLength {
            path: path.to_path_buf(),
            len,
        });
    }

    let mut key = [0u8; PUBLIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

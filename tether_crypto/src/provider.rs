//! Cryptographic primitive providers
//!
//! The handshake and channel code only ever talk to [`CryptoProvider`], so
//! tests can substitute an instrumented provider and observe exactly which
//! primitives were invoked.

use crate::error::CryptoError;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use std::cell::Cell;
use tether_types::{NONCE_SIZE, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE, TAG_SIZE};

type Blake2b256 = Blake2b<U32>;

/// Black-box cryptographic primitives
///
/// Key, nonce and tag sizes are fixed by the protocol.
pub trait CryptoProvider {
    /// Derives the X25519 public key for `secret`
    fn public_key(&self, secret: &[u8; PUBLIC_KEY_SIZE]) -> [u8; PUBLIC_KEY_SIZE];

    /// X25519 key agreement
    fn key_agree(
        &self,
        secret: &[u8; PUBLIC_KEY_SIZE],
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> [u8; 32];

    /// 32-byte cryptographic hash
    fn hash(&self, input: &[u8]) -> [u8; SESSION_KEY_SIZE];

    /// Fills `buf` from a cryptographically secure source
    fn fill_random(&self, buf: &mut [u8]);

    /// Encrypts `buffer` in place and returns the detached tag
    fn aead_seal(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError>;

    /// Verifies `tag` and decrypts `buffer` in place
    fn aead_open(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), CryptoError>;
}

/// Production provider
///
/// X25519 (`x25519-dalek`), BLAKE2b-256 (`blake2`), XChaCha20-Poly1305
/// (`chacha20poly1305`) and the thread-local OS-seeded CSPRNG (`rand`).
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCrypto;

impl RealCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for RealCrypto {
    fn public_key(&self, secret: &[u8; PUBLIC_KEY_SIZE]) -> [u8; PUBLIC_KEY_SIZE] {
        x25519_dalek::x25519(*secret, x25519_dalek::X25519_BASEPOINT_BYTES)
    }

    fn key_agree(
        &self,
        secret: &[u8; PUBLIC_KEY_SIZE],
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> [u8; 32] {
        x25519_dalek::x25519(*secret, *peer_public)
    }

    fn hash(&self, input: &[u8]) -> [u8; SESSION_KEY_SIZE] {
        let mut hasher = Blake2b256::new();
        hasher.update(input);

        let mut out = [0u8; SESSION_KEY_SIZE];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    fn fill_random(&self, buf: &mut [u8]) {
        use rand::RngCore;

        rand::rng().fill_bytes(buf);
    }

    fn aead_seal(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
        let tag = cipher
            .encrypt_in_place_detached(XNonce::from_slice(nonce), associated_data, buffer)
            .map_err(|_| CryptoError::SealFailed)?;

        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    fn aead_open(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), CryptoError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .decrypt_in_place_detached(
                XNonce::from_slice(nonce),
                associated_data,
                buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

/// Provider wrapper that counts every primitive invocation
///
/// Used to prove that malformed input never reaches the primitives.
#[derive(Debug, Default)]
pub struct CountingCrypto<C> {
    inner: C,
    key_agreements: Cell<usize>,
    hashes: Cell<usize>,
    random_fills: Cell<usize>,
    seals: Cell<usize>,
    opens: Cell<usize>,
}

impl<C: CryptoProvider> CountingCrypto<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            key_agreements: Cell::new(0),
            hashes: Cell::new(0),
            random_fills: Cell::new(0),
            seals: Cell::new(0),
            opens: Cell::new(0),
        }
    }

    pub fn key_agreements(&self) -> usize {
        self.key_agreements.get()
    }

    pub fn hashes(&self) -> usize {
        self.hashes.get()
    }

    pub fn random_fills(&self) -> usize {
        self.random_fills.get()
    }

    pub fn seals(&self) -> usize {
        self.seals.get()
    }

    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    /// Total invocations across all primitives
    pub fn total(&self) -> usize {
        self.key_agreements() + self.hashes() + self.random_fills() + self.seals() + self.opens()
    }

    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }
}

impl<C: CryptoProvider> CryptoProvider for CountingCrypto<C> {
    // Deriving a public key is key-file bookkeeping, not a protocol operation.
    fn public_key(&self, secret: &[u8; PUBLIC_KEY_SIZE]) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.public_key(secret)
    }

    fn key_agree(
        &self,
        secret: &[u8; PUBLIC_KEY_SIZE],
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> [u8; 32] {
        Self::bump(&self.key_agreements);
        self.inner.key_agree(secret, peer_public)
    }

    fn hash(&self, input: &[u8]) -> [u8; SESSION_KEY_SIZE] {
        Self::bump(&self.hashes);
        self.inner.hash(input)
    }

    fn fill_random(&self, buf: &mut [u8]) {
        Self::bump(&self.random_fills);
        self.inner.fill_random(buf)
    }

    fn aead_seal(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError> {
        Self::bump(&self.seals);
        self.inner.aead_seal(key, nonce, associated_data, buffer)
    }

    fn aead_open(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), CryptoError> {
        Self::bump(&self.opens);
        self.inner.aead_open(key, nonce, associated_data, buffer, tag)
    }
}

impl<C: CryptoProvider> CryptoProvider for &C {
    fn public_key(&self, secret: &[u8; PUBLIC_KEY_SIZE]) -> [u8; PUBLIC_KEY_SIZE] {
        (**self).public_key(secret)
    }

    fn key_agree(
        &self,
        secret: &[u8; PUBLIC_KEY_SIZE],
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> [u8; 32] {
        (**self).key_agree(secret, peer_public)
    }

    fn hash(&self, input: &[u8]) -> [u8; SESSION_KEY_SIZE] {
        (**self).hash(input)
    }

    fn fill_random(&self, buf: &mut [u8]) {
        (**self).fill_random(buf)
    }

    fn aead_seal(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError> {
        (**self).aead_seal(key, nonce, associated_data, buffer)
    }

    fn aead_open(
        &self,
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        associated_data: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), CryptoError> {
        (**self).aead_open(key, nonce, associated_data, buffer, tag)
    }
}

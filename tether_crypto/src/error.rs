//! Crypto error types

use std::path::PathBuf;
use tether_proto::ProtoError;
use thiserror::Error;

/// Failures reported by a [`crate::CryptoProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Authentication tag verification failed")]
    AuthenticationFailure,

    #[error("Encryption failed")]
    SealFailed,
}

/// Failures loading key material
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read key file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {} holds {len} bytes, expected 32", path.display())]
    InvalidLength { path: PathBuf, len: usize },

    #[error("Public key does not match the private key")]
    KeyMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] ProtoError),

    #[error("Authentication failure: possible tampering or wrong session key")]
    AuthenticationFailure,

    #[error("Failed to seal envelope")]
    SealFailed,
}

impl From<CryptoError> for ChannelError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::AuthenticationFailure => ChannelError::AuthenticationFailure,
            CryptoError::SealFailed => ChannelError::SealFailed,
        }
    }
}

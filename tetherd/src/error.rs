//! Server error types

use crate::config::ConfigError;
use crate::transport::TransportError;
use tether_crypto::{ChannelError, HandshakeError, KeyError};
use tether_proto::{PacketType, ProtoError};
use tether_regions::{InvokeError, RegistryError};
use thiserror::Error;

/// Why a single request was refused
///
/// Every variant is fatal for the connection that caused it and for nothing
/// else. No response is sent.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Malformed packet: {0}")]
    MalformedPacket(ProtoError),

    #[error("Authentication failure: possible tampering or wrong key")]
    AuthenticationFailure,

    #[error("Invalid token {token}: {regions} regions loaded")]
    InvalidToken { token: u64, regions: usize },

    #[error("Unknown packet type {0}")]
    UnknownPacketType(u32),

    #[error("Unexpected {0:?} packet from client")]
    UnexpectedPacketType(PacketType),

    #[error("Execute request before key exchange")]
    HandshakeRequired,

    #[error("Key exchange on a connection that already has a session")]
    RepeatedHandshake,

    #[error("Failed to seal response")]
    SealFailed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<ProtoError> for RequestError {
    fn from(error: ProtoError) -> Self {
        match error {
            ProtoError::UnknownPacketType(raw) => RequestError::UnknownPacketType(raw),
            other => RequestError::MalformedPacket(other),
        }
    }
}

impl From<HandshakeError> for RequestError {
    fn from(error: HandshakeError) -> Self {
        match error {
            HandshakeError::VersionMismatch { expected, actual } => {
                RequestError::VersionMismatch { expected, actual }
            }
        }
    }
}

impl From<ChannelError> for RequestError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Malformed(proto) => proto.into(),
            ChannelError::AuthenticationFailure => RequestError::AuthenticationFailure,
            ChannelError::SealFailed => RequestError::SealFailed,
        }
    }
}

impl From<InvokeError> for RequestError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::InvalidToken { token, regions } => {
                RequestError::InvalidToken { token, regions }
            }
        }
    }
}

/// Startup and event-loop failures; these stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key error: {0}")]
    Keys(#[from] KeyError),

    #[error("Region registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Native regions are not supported on this platform")]
    UnsupportedPlatform,
}

//! Connection-oriented packet transport
//!
//! The dispatcher sees connections only as [`ConnectionId`]s and whole
//! packets. Framing, accept limits and idle timeouts are the transport's
//! business.

mod loopback;
mod tcp;

pub use loopback::LoopbackTransport;
pub use tcp::{encode_frame, TcpTransport, MAX_FRAME_LEN};

use std::io;
use std::time::Duration;
use tether_types::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Packet of {len} bytes exceeds the frame limit")]
    FrameTooLarge { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(ConnectionId),
    Received(ConnectionId, Vec<u8>),
    /// The peer closed the connection or broke the framing
    Disconnected(ConnectionId),
    /// The peer stayed silent past the idle timeout
    TimedOut(ConnectionId),
}

pub trait Transport {
    /// Waits up to `timeout` for the next event
    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError>;

    /// Sends one packet
    fn send(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), TransportError>;

    /// Closes a connection; no further events are reported for it
    fn disconnect(&mut self, conn: ConnectionId);
}

//! In-memory transport for tests

use super::{Transport, TransportError, TransportEvent};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;
use tether_types::ConnectionId;

/// Scripted transport
///
/// Tests queue inbound events and read back what the server sent.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<TransportEvent>,
    sent: BTreeMap<ConnectionId, Vec<Vec<u8>>>,
    open: BTreeSet<ConnectionId>,
    closed_by_server: Vec<ConnectionId>,
    failing_sends: BTreeSet<ConnectionId>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, conn: ConnectionId) {
        self.open.insert(conn);
        self.inbound.push_back(TransportEvent::Connected(conn));
    }

    pub fn deliver(&mut self, conn: ConnectionId, packet: Vec<u8>) {
        self.inbound.push_back(TransportEvent::Received(conn, packet));
    }

    /// The client hangs up
    pub fn hang_up(&mut self, conn: ConnectionId) {
        self.open.remove(&conn);
        self.inbound.push_back(TransportEvent::Disconnected(conn));
    }

    pub fn time_out(&mut self, conn: ConnectionId) {
        self.open.remove(&conn);
        self.inbound.push_back(TransportEvent::TimedOut(conn));
    }

    /// Makes every send to `conn` fail
    pub fn fail_sends_to(&mut self, conn: ConnectionId) {
        self.failing_sends.insert(conn);
    }

    /// Removes and returns the packets sent to `conn` so far
    pub fn take_sent(&mut self, conn: ConnectionId) -> Vec<Vec<u8>> {
        self.sent.remove(&conn).unwrap_or_default()
    }

    /// Whether the server closed `conn`
    pub fn was_dropped(&self, conn: ConnectionId) -> bool {
        self.closed_by_server.contains(&conn)
    }

    pub fn is_open(&self, conn: ConnectionId) -> bool {
        self.open.contains(&conn)
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl Transport for LoopbackTransport {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        Ok(self.inbound.pop_front())
    }

    fn send(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), TransportError> {
        if !self.open.contains(&conn) {
            return Err(TransportError::UnknownConnection(conn));
        }
        if self.failing_sends.contains(&conn) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected send failure",
            )));
        }

        self.sent.entry(conn).or_default().push(packet.to_vec());
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if self.open.remove(&conn) {
            self.closed_by_server.push(conn);
        }
        self.inbound.retain(|event| {
            !matches!(
                event,
                TransportEvent::Received(id, _)
                    | TransportEvent::Disconnected(id)
                    | TransportEvent::TimedOut(id)
                    if *id == conn
            )
        });
    }
}

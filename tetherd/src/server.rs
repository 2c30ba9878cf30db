//! # Dispatcher
//!
//! The single-threaded event loop. Each transport event is handled to
//! completion before the next one is polled, so a long-running region
//! stalls every client.

use crate::error::{RequestError, ServerError};
use crate::transport::{Transport, TransportEvent};
use std::collections::HashMap;
use std::time::Duration;
use tether_crypto::{CryptoProvider, KeyPair, SecureChannel, Session, SessionManager};
use tether_hal::{FlagSource, Trampoline};
use tether_proto::{peek_type, KeyExchangeMessage, PacketType};
use tether_regions::{RegionInvoker, RegionTable};
use tether_types::ConnectionId;
use tracing::{debug, error, info, warn};

/// Per-connection protocol state
#[derive(Debug)]
enum ConnectionState {
    /// Server key sent, waiting for the client's
    AwaitingKeyExchange,
    Established(Session),
}

pub struct Server<'a, T, C, X, F> {
    transport: T,
    crypto: C,
    sessions: SessionManager,
    table: &'a RegionTable,
    invoker: RegionInvoker<X, F>,
    connections: HashMap<ConnectionId, ConnectionState>,
    poll_interval: Duration,
}

impl<'a, T, C, X, F> Server<'a, T, C, X, F>
where
    T: Transport,
    C: CryptoProvider,
    X: Trampoline,
    F: FlagSource,
{
    pub fn new(
        transport: T,
        crypto: C,
        keys: KeyPair,
        table: &'a RegionTable,
        invoker: RegionInvoker<X, F>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            crypto,
            sessions: SessionManager::new(keys),
            table,
            invoker,
            connections: HashMap::new(),
            poll_interval,
        }
    }

    /// Serves until the transport fails
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(regions = self.table.len(), "Serving tether regions");
        loop {
            self.step()?;
        }
    }

    /// Polls and handles at most one event
    ///
    /// Returns whether an event was handled.
    pub fn step(&mut self) -> Result<bool, ServerError> {
        let Some(event) = self.transport.poll(self.poll_interval)? else {
            return Ok(false);
        };

        match event {
            TransportEvent::Connected(conn) => self.on_connect(conn),
            TransportEvent::Received(conn, packet) => {
                if let Err(err) = self.handle_packet(conn, &packet) {
                    self.reject(conn, err);
                }
            }
            TransportEvent::Disconnected(conn) => {
                if self.connections.remove(&conn).is_some() {
                    info!(%conn, "Client disconnected");
                }
            }
            TransportEvent::TimedOut(conn) => {
                if self.connections.remove(&conn).is_some() {
                    info!(%conn, "Client timed out");
                }
            }
        }
        Ok(true)
    }

    /// Handles events until the transport has none ready
    pub fn run_until_idle(&mut self) -> Result<usize, ServerError> {
        let mut handled = 0;
        while self.step()? {
            handled += 1;
        }
        Ok(handled)
    }

    fn on_connect(&mut self, conn: ConnectionId) {
        let hello = self.sessions.begin_handshake().encode();
        if let Err(err) = self.transport.send(conn, &hello) {
            error!(%conn, error = %err, "Failed to send public key, disconnecting client");
            self.transport.disconnect(conn);
            return;
        }

        info!(%conn, "Client connected");
        self.connections
            .insert(conn, ConnectionState::AwaitingKeyExchange);
    }

    fn handle_packet(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), RequestError> {
        match peek_type(packet)? {
            PacketType::KeyExchange => self.handle_key_exchange(conn, packet),
            PacketType::ExecuteTetherRegion => self.handle_execute(conn, packet),
            other @ PacketType::CPUStateTransfer => Err(RequestError::UnexpectedPacketType(other)),
        }
    }

    fn handle_key_exchange(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), RequestError> {
        match self.connections.get(&conn) {
            Some(ConnectionState::AwaitingKeyExchange) => {}
            Some(ConnectionState::Established(_)) => return Err(RequestError::RepeatedHandshake),
            None => return Err(RequestError::HandshakeRequired),
        }

        let msg = KeyExchangeMessage::decode(packet)?;
        let session = self.sessions.complete_handshake(&self.crypto, &msg)?;

        info!(%conn, session = %session.id(), "Session established");
        self.connections
            .insert(conn, ConnectionState::Established(session));
        Ok(())
    }

    fn handle_execute(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), RequestError> {
        let session = match self.connections.get(&conn) {
            Some(ConnectionState::Established(session)) => session,
            _ => return Err(RequestError::HandshakeRequired),
        };

        let channel = SecureChannel::new(&self.crypto, session);
        let (_, request) = channel.open(packet)?;
        debug!(%conn, session = %session.id(), token = request.token, "Execute request");

        let response = self.invoker.invoke(self.table, &request)?;
        let envelope = channel.seal(PacketType::CPUStateTransfer, &response)?;
        self.transport.send(conn, &envelope.encode())?;
        Ok(())
    }

    fn reject(&mut self, conn: ConnectionId, err: RequestError) {
        match err {
            RequestError::AuthenticationFailure => {
                error!(%conn, "Bad MAC on packet, possible tampering or wrong key; dropping connection");
            }
            other => warn!(%conn, error = %other, "Dropping connection"),
        }

        self.connections.remove(&conn);
        self.transport.disconnect(conn);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn has_session(&self, conn: ConnectionId) -> bool {
        matches!(
            self.connections.get(&conn),
            Some(ConnectionState::Established(_))
        )
    }

    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    pub fn invoker(&self) -> &RegionInvoker<X, F> {
        &self.invoker
    }
}

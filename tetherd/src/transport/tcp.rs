//! Non-blocking TCP transport
//!
//! Each packet travels as a little-endian `u32` length followed by the packet
//! bytes. A zero length or a length above [`MAX_FRAME_LEN`] closes the
//! connection.
//!
//! Frames that arrive ahead of a close are delivered before the
//! `Disconnected` event, and the socket stays writable until that event is
//! handed out, so a client that half-closes after its last request still
//! receives the response.

use super::{Transport, TransportError, TransportEvent};
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tether_types::ConnectionId;

pub const MAX_FRAME_LEN: usize = 4096;

const FRAME_HEADER_LEN: usize = 4;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    inbox: Vec<u8>,
    last_activity: Instant,
    /// Peer stopped sending; a `Disconnected` event is queued
    read_closed: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
    Open,
    Closed,
}

#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    connections: BTreeMap<ConnectionId, Connection>,
    events: VecDeque<TransportEvent>,
    next_id: u64,
    max_clients: usize,
    idle_timeout: Duration,
    accept_paused_until: Option<Instant>,
}

impl TcpTransport {
    pub fn bind(addr: &str, max_clients: usize, idle_timeout: Duration) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;

        Ok(Self {
            listener,
            connections: BTreeMap::new(),
            events: VecDeque::new(),
            next_id: 1,
            max_clients,
            idle_timeout,
            accept_paused_until: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn peer_addr(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&conn).map(|c| c.peer)
    }

    fn pump(&mut self) {
        let now = Instant::now();
        if self.accepting(now) {
            self.accept_pending(now);
        }

        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            let Some(conn) = self.connections.get_mut(&id) else {
                continue;
            };
            if conn.read_closed {
                continue;
            }

            if read_frames(id, conn, &mut self.events, now) == ReadOutcome::Closed {
                conn.read_closed = true;
                self.events.push_back(TransportEvent::Disconnected(id));
            } else if now.duration_since(conn.last_activity) >= self.idle_timeout {
                self.close(id);
                self.events.push_back(TransportEvent::TimedOut(id));
            }
        }
    }

    fn accepting(&mut self, now: Instant) -> bool {
        match self.accept_paused_until {
            Some(until) if now < until => false,
            Some(_) => {
                self.accept_paused_until = None;
                true
            }
            None => true,
        }
    }

    fn accept_pending(&mut self, now: Instant) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient_accept_error(&e) => {
                    tracing::debug!(error = %e, "Accept failed");
                    continue;
                }
                Err(e) => {
                    self.pause_accepting(&e, now);
                    return;
                }
            };

            if self.connections.len() >= self.max_clients {
                tracing::warn!(%peer, max_clients = self.max_clients, "Connection limit reached, refusing client");
                let _ = stream.shutdown(Shutdown::Both);
                continue;
            }

            if let Err(e) = stream.set_nonblocking(true).and_then(|_| stream.set_nodelay(true)) {
                tracing::warn!(%peer, error = %e, "Failed to configure client socket");
                continue;
            }

            let id = ConnectionId::new(self.next_id);
            self.next_id += 1;
            tracing::debug!(conn = %id, %peer, "Accepted TCP connection");

            self.connections.insert(
                id,
                Connection {
                    stream,
                    peer,
                    inbox: Vec::new(),
                    last_activity: now,
                    read_closed: false,
                },
            );
            self.events.push_back(TransportEvent::Connected(id));
        }
    }

    /// Stops accepting for [`ACCEPT_BACKOFF`] after a listener failure such as
    /// descriptor exhaustion. Established connections keep being served.
    fn pause_accepting(&mut self, error: &io::Error, now: Instant) {
        tracing::warn!(error = %error, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "Accept failed, pausing new connections");
        self.accept_paused_until = Some(now + ACCEPT_BACKOFF);
    }

    fn close(&mut self, conn: ConnectionId) -> bool {
        match self.connections.remove(&conn) {
            Some(connection) => {
                let _ = connection.stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    /// Pops the next event; a `Disconnected` releases its socket here
    fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.pop_front()?;
        if let TransportEvent::Disconnected(id) = event {
            self.close(id);
        }
        Some(event)
    }

    /// Longest wait before some connection's idle timeout or the end of an
    /// accept pause needs attention
    fn wait_budget(&self, now: Instant, deadline: Instant) -> Duration {
        let idle_expiry = self
            .connections
            .values()
            .filter(|c| !c.read_closed)
            .map(|c| c.last_activity + self.idle_timeout)
            .min();

        [Some(deadline), idle_expiry, self.accept_paused_until]
            .into_iter()
            .flatten()
            .min()
            .map(|wake| wake.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Blocks until the listener or a client socket is readable, or `timeout`
    /// passes
    #[cfg(unix)]
    fn wait_readable(&self, timeout: Duration) {
        use std::os::unix::io::AsRawFd;

        let listener = self
            .accept_paused_until
            .is_none()
            .then(|| self.listener.as_raw_fd());
        let mut fds: Vec<libc::pollfd> = listener
            .into_iter()
            .chain(
                self.connections
                    .values()
                    .filter(|c| !c.read_closed)
                    .map(|c| c.stream.as_raw_fd()),
            )
            .map(|fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        // Round up so a sub-millisecond remainder does not spin
        let millis = timeout
            .as_micros()
            .div_ceil(1000)
            .min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `fds` is a live, exclusively borrowed array of `fds.len()`
        // pollfd entries, and every descriptor in it is owned by `self`.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
        if ret < 0 {
            let e = io::Error::last_os_error();
            if e.kind() != io::ErrorKind::Interrupted {
                tracing::debug!(error = %e, "poll failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn wait_readable(&self, timeout: Duration) {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
    }
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Drains the socket and queues every complete frame
///
/// Frames already buffered are queued even when the read ends in EOF or an
/// error.
fn read_frames(
    id: ConnectionId,
    conn: &mut Connection,
    events: &mut VecDeque<TransportEvent>,
    now: Instant,
) -> ReadOutcome {
    let mut outcome = ReadOutcome::Open;
    let mut buf = [0u8; 1024];
    loop {
        match conn.stream.read(&mut buf) {
            Ok(0) => {
                outcome = ReadOutcome::Closed;
                break;
            }
            Ok(n) => {
                conn.inbox.extend_from_slice(&buf[..n]);
                conn.last_activity = now;
                if conn.inbox.len() > MAX_FRAME_LEN + FRAME_HEADER_LEN {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(conn = %id, error = %e, "Read failed");
                outcome = ReadOutcome::Closed;
                break;
            }
        }
    }

    while conn.inbox.len() >= FRAME_HEADER_LEN {
        let len = u32::from_le_bytes([conn.inbox[0], conn.inbox[1], conn.inbox[2], conn.inbox[3]])
            as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            tracing::warn!(conn = %id, len, "Invalid frame length, closing connection");
            return ReadOutcome::Closed;
        }
        if conn.inbox.len() < FRAME_HEADER_LEN + len {
            break;
        }

        let packet = conn.inbox[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();
        conn.inbox.drain(..FRAME_HEADER_LEN + len);
        events.push_back(TransportEvent::Received(id, packet));
    }

    if outcome == ReadOutcome::Closed && !conn.inbox.is_empty() {
        tracing::debug!(conn = %id, bytes = conn.inbox.len(), "Peer closed mid-frame");
    }
    outcome
}

/// Prefixes `packet` with its length
pub fn encode_frame(packet: &[u8]) -> Result<Vec<u8>, TransportError> {
    if packet.is_empty() || packet.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge { len: packet.len() });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + packet.len());
    frame.extend_from_slice(&(packet.len() as u32).to_le_bytes());
    frame.extend_from_slice(packet);
    Ok(frame)
}

impl Transport for TcpTransport {
    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.next_event() {
                return Ok(Some(event));
            }

            self.pump();
            if let Some(event) = self.next_event() {
                return Ok(Some(event));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.wait_readable(self.wait_budget(now, deadline));
        }
    }

    fn send(&mut self, conn: ConnectionId, packet: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(packet)?;
        let connection = self
            .connections
            .get_mut(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;

        // Frames are far smaller than any socket buffer; a short write means
        // the peer stopped reading.
        connection.stream.write_all(&frame)?;
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if self.close(conn) {
            self.events.retain(|event| match event {
                TransportEvent::Connected(id)
                | TransportEvent::Received(id, _)
                | TransportEvent::Disconnected(id)
                | TransportEvent::TimedOut(id) => *id != conn,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> TcpTransport {
        TcpTransport::bind("127.0.0.1:0", 2, Duration::from_secs(30)).unwrap()
    }

    fn poll_until<F: Fn(&TransportEvent) -> bool>(t: &mut TcpTransport, pred: F) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(event) = t.poll(Duration::from_millis(50)).unwrap() {
                if pred(&event) {
                    return event;
                }
            }
        }
        panic!("expected event did not arrive");
    }

    #[test]
    fn test_frames_in_both_directions() {
        let mut server = transport();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();

        let event = poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));
        let TransportEvent::Connected(conn) = event else {
            unreachable!()
        };

        // two frames in one write
        let mut bytes = encode_frame(b"first").unwrap();
        bytes.extend(encode_frame(b"second").unwrap());
        client.write_all(&bytes).unwrap();

        assert_eq!(
            poll_until(&mut server, |_| true),
            TransportEvent::Received(conn, b"first".to_vec())
        );
        assert_eq!(
            poll_until(&mut server, |_| true),
            TransportEvent::Received(conn, b"second".to_vec())
        );

        server.send(conn, b"reply").unwrap();
        let mut reply = [0u8; 9];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply[..4], &5u32.to_le_bytes());
        assert_eq!(&reply[4..], b"reply");
    }

    #[test]
    fn test_zero_length_frame_closes() {
        let mut server = transport();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));

        client.write_all(&0u32.to_le_bytes()).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Disconnected(_)));
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_oversized_frame_closes() {
        let mut server = transport();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));

        client
            .write_all(&((MAX_FRAME_LEN + 1) as u32).to_le_bytes())
            .unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Disconnected(_)));
    }

    #[test]
    fn test_client_hangup() {
        let mut server = transport();
        let client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));

        drop(client);
        poll_until(&mut server, |e| matches!(e, TransportEvent::Disconnected(_)));
    }

    #[test]
    fn test_frames_before_half_close_are_delivered() {
        let mut server = transport();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let TransportEvent::Connected(conn) =
            poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)))
        else {
            unreachable!()
        };

        let mut bytes = encode_frame(b"hello").unwrap();
        bytes.extend(encode_frame(b"request").unwrap());
        client.write_all(&bytes).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        assert_eq!(
            poll_until(&mut server, |_| true),
            TransportEvent::Received(conn, b"hello".to_vec())
        );
        assert_eq!(
            poll_until(&mut server, |_| true),
            TransportEvent::Received(conn, b"request".to_vec())
        );

        // the write half is still usable until the close is handed out
        server.send(conn, b"reply").unwrap();
        let mut reply = [0u8; 9];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply[4..], b"reply");

        assert_eq!(poll_until(&mut server, |_| true), TransportEvent::Disconnected(conn));
        assert_eq!(server.connection_count(), 0);
        assert!(server.send(conn, b"late").is_err());
    }

    #[test]
    fn test_frame_sent_with_close_is_delivered() {
        let mut server = transport();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        client.write_all(&encode_frame(b"last words").unwrap()).unwrap();
        drop(client);

        let events: Vec<TransportEvent> = (0..3)
            .map(|_| poll_until(&mut server, |_| true))
            .collect();
        assert!(matches!(events[0], TransportEvent::Connected(_)));
        assert!(matches!(&events[1], TransportEvent::Received(_, p) if p.as_slice() == b"last words"));
        assert!(matches!(events[2], TransportEvent::Disconnected(_)));
    }

    #[test]
    fn test_accept_failure_pauses_instead_of_failing() {
        let mut server = transport();
        let now = Instant::now();
        server.pause_accepting(&io::Error::new(io::ErrorKind::Other, "too many open files"), now);

        let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        assert!(server.poll(Duration::from_millis(20)).unwrap().is_none());
        assert_eq!(server.connection_count(), 0);

        // accepted once the pause expires
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn test_idle_poll_waits_for_the_full_timeout() {
        let mut server = transport();
        let started = Instant::now();
        assert!(server.poll(Duration::from_millis(60)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_connection_limit() {
        let mut server = transport();
        let addr = server.local_addr().unwrap();
        let _a = TcpStream::connect(addr).unwrap();
        let _b = TcpStream::connect(addr).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));

        let mut refused = TcpStream::connect(addr).unwrap();
        assert!(server.poll(Duration::from_millis(200)).unwrap().is_none());
        assert_eq!(server.connection_count(), 2);

        refused
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(refused.read(&mut buf).unwrap_or(0), 0);
    }

    #[test]
    fn test_idle_timeout() {
        let mut server = TcpTransport::bind("127.0.0.1:0", 2, Duration::from_millis(100)).unwrap();
        let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        poll_until(&mut server, |e| matches!(e, TransportEvent::Connected(_)));

        poll_until(&mut server, |e| matches!(e, TransportEvent::TimedOut(_)));
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_send_rejects_oversized_packet() {
        let mut server = transport();
        let big = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            server.send(ConnectionId::new(1), &big),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}

//! Dispatcher tests over the loopback transport

use std::time::Duration;
use tether_crypto::{
    client_hello, client_session, CountingCrypto, KeyPair, RealCrypto, SecureChannel, Session,
};
use tether_hal::{FakeExecutableMemory, FakeTrampoline, FixedFlags};
use tether_proto::{KeyExchangeMessage, PacketType};
use tether_regions::{RegionInvoker, RegionTable};
use tether_types::{ConnectionId, GpRegister, RegisterContext, Rflags, PROTOCOL_VERSION};
use tetherd::{LoopbackTransport, Server};

const BASELINE: u64 = Rflags::READ_AS_1 | Rflags::INTERRUPT_ENABLE;

type TestServer<'a> =
    Server<'a, LoopbackTransport, CountingCrypto<RealCrypto>, FakeTrampoline, FixedFlags>;

fn descriptor(regions: &[(u32, &[u8])]) -> Vec<u8> {
    let mut out = (regions.len() as u32).to_le_bytes().to_vec();
    for (token, payload) in regions {
        out.extend_from_slice(&token.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }
    out
}

fn table() -> RegionTable {
    let bytes = descriptor(&[(0, &[0x90]), (1, &[0x48, 0x83, 0xC0, 0x05])]);
    RegionTable::load(&bytes, &mut FakeExecutableMemory::new()).unwrap()
}

fn server(table: &RegionTable) -> TestServer<'_> {
    let crypto = CountingCrypto::new(RealCrypto::new());
    let keys = KeyPair::generate(&crypto);
    let trampoline = FakeTrampoline::new(|ctx| ctx.rax = ctx.rax.wrapping_add(5));
    let invoker = RegionInvoker::new(trampoline, FixedFlags::new(BASELINE));
    Server::new(
        LoopbackTransport::new(),
        crypto,
        keys,
        table,
        invoker,
        Duration::from_millis(10),
    )
}

struct Client {
    conn: ConnectionId,
    keys: KeyPair,
    server_hello: KeyExchangeMessage,
}

impl Client {
    fn connect(server: &mut TestServer<'_>, id: u64) -> Self {
        let conn = ConnectionId::new(id);
        server.transport_mut().connect(conn);
        server.run_until_idle().unwrap();

        let sent = server.transport_mut().take_sent(conn);
        assert_eq!(sent.len(), 1);
        let server_hello = KeyExchangeMessage::decode(&sent[0]).unwrap();
        assert_eq!(server_hello.version, PROTOCOL_VERSION);

        Self {
            conn,
            keys: KeyPair::generate(&RealCrypto::new()),
            server_hello,
        }
    }

    fn handshake(&self, server: &mut TestServer<'_>) -> Session {
        server
            .transport_mut()
            .deliver(self.conn, client_hello(&self.keys).encode());
        server.run_until_idle().unwrap();
        client_session(&RealCrypto::new(), &self.keys, &self.server_hello).unwrap()
    }

    fn execute(&self, server: &mut TestServer<'_>, session: &Session, ctx: &RegisterContext) {
        let crypto = RealCrypto::new();
        let packet = SecureChannel::new(&crypto, session)
            .seal(PacketType::ExecuteTetherRegion, ctx)
            .unwrap()
            .encode();
        server.transport_mut().deliver(self.conn, packet);
        server.run_until_idle().unwrap();
    }

    fn responses(&self, server: &mut TestServer<'_>, session: &Session) -> Vec<RegisterContext> {
        let crypto = RealCrypto::new();
        let channel = SecureChannel::new(&crypto, session);
        server
            .transport_mut()
            .take_sent(self.conn)
            .iter()
            .map(|bytes| {
                let (packet_type, ctx) = channel.open(bytes).unwrap();
                assert_eq!(packet_type, PacketType::CPUStateTransfer);
                ctx
            })
            .collect()
    }
}

#[test]
fn test_execute_round_trip() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);
    assert!(server.has_session(client.conn));

    let mut ctx = RegisterContext::for_token(1).with(GpRegister::Rax, 10);
    ctx.rflags = Rflags::READ_AS_1 | Rflags::TRAP | Rflags::CARRY;
    client.execute(&mut server, &session, &ctx);

    let responses = client.responses(&mut server, &session);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].rax, 15);
    assert_eq!(responses[0].token, 1);
    assert_eq!(responses[0].rflags, ctx.rflags);

    let loaded = server.invoker().trampoline().loaded()[0];
    assert_eq!(loaded.rflags, BASELINE | Rflags::CARRY);
    assert_eq!(
        server.invoker().trampoline().entries(),
        &[table.lookup(1).unwrap().entry()]
    );
}

#[test]
fn test_session_serves_many_requests() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);

    for i in 0..5u64 {
        let ctx = RegisterContext::for_token(i % 2).with(GpRegister::Rax, i);
        client.execute(&mut server, &session, &ctx);
    }

    let rax: Vec<u64> = client
        .responses(&mut server, &session)
        .iter()
        .map(|ctx| ctx.rax)
        .collect();
    assert_eq!(rax, vec![5, 6, 7, 8, 9]);
}

#[test]
fn test_repeated_handshake_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);

    client.handshake(&mut server);
    assert!(server.transport().was_dropped(client.conn));
    assert!(!server.has_session(client.conn));
    assert!(server.transport_mut().take_sent(client.conn).is_empty());

    // The old session is gone with the connection
    client.execute(&mut server, &session, &RegisterContext::for_token(0));
    assert!(server.transport_mut().take_sent(client.conn).is_empty());
}

#[test]
fn test_execute_before_handshake_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);

    let guessed = Session::new(tether_crypto::SessionKey::from_bytes([0; 32]));
    client.execute(&mut server, &guessed, &RegisterContext::for_token(0));

    assert!(server.transport().was_dropped(client.conn));
    assert!(server.invoker().trampoline().entries().is_empty());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_unknown_packet_type_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    client.handshake(&mut server);

    let mut packet = vec![0u8; 180];
    packet[..4].copy_from_slice(&9u32.to_le_bytes());
    server.transport_mut().deliver(client.conn, packet);
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(client.conn));
    assert!(server.transport_mut().take_sent(client.conn).is_empty());
}

#[test]
fn test_client_state_transfer_is_rejected() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);

    let crypto = RealCrypto::new();
    let packet = SecureChannel::new(&crypto, &session)
        .seal(PacketType::CPUStateTransfer, &RegisterContext::for_token(0))
        .unwrap()
        .encode();
    server.transport_mut().deliver(client.conn, packet);
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(client.conn));
    assert!(server.invoker().trampoline().entries().is_empty());
}

#[test]
fn test_tampered_request_gets_no_response() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);

    let crypto = RealCrypto::new();
    let mut packet = SecureChannel::new(&crypto, &session)
        .seal(PacketType::ExecuteTetherRegion, &RegisterContext::for_token(1))
        .unwrap()
        .encode();
    packet[100] ^= 0x01;
    server.transport_mut().deliver(client.conn, packet);
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(client.conn));
    assert!(server.transport_mut().take_sent(client.conn).is_empty());
    assert!(server.invoker().trampoline().entries().is_empty());
}

#[test]
fn test_version_mismatch_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let before = server.crypto().total();

    let hello = KeyExchangeMessage::new(PROTOCOL_VERSION + 1, *client.keys.public().as_bytes());
    server.transport_mut().deliver(client.conn, hello.encode());
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(client.conn));
    assert!(!server.has_session(client.conn));
    assert_eq!(server.crypto().total(), before);
}

#[test]
fn test_truncated_packets_skip_crypto() {
    let table = table();
    let mut server = server(&table);

    for (i, len) in [0usize, 2, 4, 40, 179, 181].into_iter().enumerate() {
        let client = Client::connect(&mut server, i as u64 + 1);
        client.handshake(&mut server);
        let before = server.crypto().total();

        let mut packet = vec![0u8; len];
        if len >= 4 {
            packet[..4].copy_from_slice(&PacketType::ExecuteTetherRegion.to_bytes());
        }
        server.transport_mut().deliver(client.conn, packet);
        server.run_until_idle().unwrap();

        assert!(server.transport().was_dropped(client.conn), "length {}", len);
        assert_eq!(server.crypto().total(), before, "length {}", len);
    }
}

#[test]
fn test_invalid_token_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    let session = client.handshake(&mut server);

    client.execute(&mut server, &session, &RegisterContext::for_token(2));

    assert!(server.transport().was_dropped(client.conn));
    assert!(server.transport_mut().take_sent(client.conn).is_empty());
    assert!(server.invoker().trampoline().entries().is_empty());
}

#[test]
fn test_disconnect_discards_session() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    client.handshake(&mut server);
    assert_eq!(server.connection_count(), 1);

    server.transport_mut().hang_up(client.conn);
    server.run_until_idle().unwrap();

    assert!(!server.has_session(client.conn));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_timeout_discards_session() {
    let table = table();
    let mut server = server(&table);
    let client = Client::connect(&mut server, 1);
    client.handshake(&mut server);

    server.transport_mut().time_out(client.conn);
    server.run_until_idle().unwrap();

    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_failures_are_isolated_per_connection() {
    let table = table();
    let mut server = server(&table);
    let good = Client::connect(&mut server, 1);
    let bad = Client::connect(&mut server, 2);
    let good_session = good.handshake(&mut server);
    bad.handshake(&mut server);

    server.transport_mut().deliver(bad.conn, vec![1, 0, 0]);
    good.execute(
        &mut server,
        &good_session,
        &RegisterContext::for_token(0).with(GpRegister::Rax, 1),
    );

    assert!(server.transport().was_dropped(bad.conn));
    assert!(!server.transport().was_dropped(good.conn));
    assert_eq!(good.responses(&mut server, &good_session)[0].rax, 6);
}

#[test]
fn test_clients_get_distinct_sessions() {
    let table = table();
    let mut server = server(&table);
    let a = Client::connect(&mut server, 1);
    let b = Client::connect(&mut server, 2);
    let session_a = a.handshake(&mut server);
    let session_b = b.handshake(&mut server);
    assert_ne!(session_a.key(), session_b.key());

    // A request sealed under one client's key is useless on another connection
    let crypto = RealCrypto::new();
    let packet = SecureChannel::new(&crypto, &session_a)
        .seal(PacketType::ExecuteTetherRegion, &RegisterContext::for_token(0))
        .unwrap()
        .encode();
    server.transport_mut().deliver(b.conn, packet);
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(b.conn));
    assert!(!server.transport().was_dropped(a.conn));
}

#[test]
fn test_failed_hello_send_drops_connection() {
    let table = table();
    let mut server = server(&table);
    let conn = ConnectionId::new(1);

    server.transport_mut().fail_sends_to(conn);
    server.transport_mut().connect(conn);
    server.run_until_idle().unwrap();

    assert!(server.transport().was_dropped(conn));
    assert_eq!(server.connection_count(), 0);
}

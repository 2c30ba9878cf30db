//! # Tether Daemon
//!
//! Serves preloaded native code regions to remote clients over an
//! authenticated, encrypted channel.
//!
//! ## Philosophy
//!
//! - **One request, one region**: a client sends a register context and a
//!   token, the server runs the selected region and returns the registers
//! - **Fail closed**: any malformed, unauthenticated or out-of-order packet
//!   drops its connection without a reply
//! - **Capabilities, not globals**: transport, crypto, trampoline and flag
//!   source are all handed to the [`Server`]
//!
//! ## Request flow
//!
//! ```text
//! connect  -> send server KeyExchange
//! KeyExchange          -> derive session
//! ExecuteTetherRegion  -> open -> sanitize -> run region -> sanitize -> seal
//!                      -> CPUStateTransfer
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod transport;

pub use config::{Args, ConfigError, ResolvedConfig, ServerConfig};
pub use error::{RequestError, ServerError};
pub use logging::init_tracing;
pub use server::Server;
pub use transport::{
    encode_frame, LoopbackTransport, TcpTransport, Transport, TransportError, TransportEvent,
    MAX_FRAME_LEN,
};

/// Loads keys and regions, binds the listener and serves forever
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub fn run_server(config: &ResolvedConfig) -> Result<(), ServerError> {
    use tether_crypto::{KeyPair, RealCrypto};
    use tether_hal_x86_64::{HostFlags, MmapExecutableMemory, NativeTrampoline};
    use tether_regions::{RegionInvoker, RegionTable};

    let crypto = RealCrypto::new();
    let keys = KeyPair::load(&crypto, &config.public_key, &config.private_key)?;
    tracing::info!(path = %config.public_key.display(), "Loaded server key pair");

    let table = RegionTable::from_file(&config.tether, &mut MmapExecutableMemory::new())?;
    tracing::info!(path = %config.tether.display(), regions = table.len(), "Loaded region descriptor");

    let transport = TcpTransport::bind(&config.bind_addr, config.max_clients, config.idle_timeout)?;
    tracing::info!(
        addr = %config.bind_addr,
        max_clients = config.max_clients,
        "Listening"
    );

    let invoker = RegionInvoker::new(NativeTrampoline::new(), HostFlags::new());
    let mut server = Server::new(transport, crypto, keys, &table, invoker, config.poll_interval);
    server.run()
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
pub fn run_server(_config: &ResolvedConfig) -> Result<(), ServerError> {
    Err(ServerError::UnsupportedPlatform)
}

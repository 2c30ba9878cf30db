//! # Tether Daemon
//!
//! Main entry point for the tether server.

use clap::Parser;
use std::process;
use tetherd::{init_tracing, run_server, Args, ServerConfig};

fn main() {
    let args = Args::parse();
    init_tracing();

    let config = ServerConfig::from_args(&args)
        .and_then(|config| config.validate())
        .unwrap_or_else(|e| {
            tracing::error!("{}", e);
            process::exit(1);
        });

    if let Err(e) = run_server(&config) {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }
}

//! Registry and invocation errors

use std::path::PathBuf;
use tether_hal::MemoryError;
use thiserror::Error;

/// Failures building the region table; all of them abort startup
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read region descriptor {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Region descriptor truncated at offset {offset}: need {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Region descriptor has {count} trailing bytes after the last record")]
    TrailingBytes { count: usize },

    #[error("Failed to prepare region {index}: {source}")]
    Memory {
        index: usize,
        #[source]
        source: MemoryError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("Invalid token {token}: {regions} regions loaded")]
    InvalidToken { token: u64, regions: usize },
}

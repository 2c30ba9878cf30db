//! Executable memory abstraction

use std::io;
use thiserror::Error;

/// Errors that can occur while preparing executable memory
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Zero-length requests are refused
    #[error("Zero-length allocation")]
    ZeroLength,

    /// The writable mapping could not be created
    #[error("Failed to allocate {len} writable bytes: {source}")]
    AllocationFailed {
        len: usize,
        #[source]
        source: io::Error,
    },

    /// The mapping could not be switched to executable
    #[error("Failed to make {len} bytes executable: {source}")]
    ProtectFailed {
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// A freshly allocated, writable, non-executable block
pub trait WritableRegion {
    /// The whole block, exactly as long as requested
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// A locked block that can be executed but no longer written
pub trait ExecutableRegion {
    /// Address of the first instruction
    fn entry(&self) -> *const u8;

    /// Length in bytes, trailing `RET` included
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allocator for code blocks
///
/// The two-phase API makes the permission order explicit: a block is written
/// through [`WritableRegion`] and only then consumed by
/// [`ExecutableMemory::make_executable`]. Dropping either handle releases
/// the memory.
pub trait ExecutableMemory {
    type Writable: WritableRegion;
    type Executable: ExecutableRegion + 'static;

    /// Allocates `len` writable bytes
    fn allocate_writable(&mut self, len: usize) -> Result<Self::Writable, MemoryError>;

    /// Drops write permission and grants execute permission
    fn make_executable(&mut self, block: Self::Writable) -> Result<Self::Executable, MemoryError>;
}

//! Region table

use crate::descriptor::parse_descriptor;
use crate::error::{InvokeError, RegistryError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tether_hal::{ExecutableMemory, ExecutableRegion, WritableRegion};
use tether_types::RET_OPCODE;

/// One loaded code fragment
pub struct TetherRegion {
    token: u32,
    payload_len: usize,
    digest: String,
    block: Box<dyn ExecutableRegion>,
}

impl TetherRegion {
    /// Token recorded in the descriptor
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Payload length, without the trailing `RET`
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// SHA-256 of the payload, hex encoded
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn entry(&self) -> *const u8 {
        self.block.entry()
    }

    pub fn block_len(&self) -> usize {
        self.block.len()
    }
}

impl fmt::Debug for TetherRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TetherRegion")
            .field("token", &self.token)
            .field("payload_len", &self.payload_len)
            .field("digest", &self.digest)
            .field("entry", &self.block.entry())
            .finish()
    }
}

/// Every region, in descriptor order
///
/// Built once before serving and read-only afterwards. Dropping the table
/// releases every executable block.
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: Vec<TetherRegion>,
}

impl RegionTable {
    /// Loads every region of `descriptor` into executable memory
    ///
    /// Any failure aborts the whole load; blocks already prepared are
    /// released.
    pub fn load<M: ExecutableMemory>(
        descriptor: &[u8],
        memory: &mut M,
    ) -> Result<Self, RegistryError> {
        let records = parse_descriptor(descriptor)?;
        let mut regions = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let payload_len = record.payload.len();
            let memory_error = |source| RegistryError::Memory { index, source };

            let mut block = memory
                .allocate_writable(payload_len + 1)
                .map_err(memory_error)?;
            let bytes = block.as_mut_slice();
            bytes[..payload_len].copy_from_slice(record.payload);
            bytes[payload_len] = RET_OPCODE;
            let block = memory.make_executable(block).map_err(memory_error)?;

            let digest = hash_payload(record.payload);
            tracing::info!(
                index,
                token = record.token,
                len = payload_len,
                sha256 = %digest,
                "Loaded tether region"
            );
            if record.token as usize != index {
                tracing::warn!(
                    index,
                    token = record.token,
                    "Descriptor token differs from its position; clients select regions by position"
                );
            }

            regions.push(TetherRegion {
                token: record.token,
                payload_len,
                digest,
                block: Box::new(block),
            });
        }

        Ok(Self { regions })
    }

    /// Reads a descriptor file and loads it
    pub fn from_file<M: ExecutableMemory>(
        path: &Path,
        memory: &mut M,
    ) -> Result<Self, RegistryError> {
        let bytes = fs::read(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&bytes, memory)
    }

    /// Resolves a client token, a zero-based position in descriptor order
    pub fn lookup(&self, token: u64) -> Result<&TetherRegion, InvokeError> {
        usize::try_from(token)
            .ok()
            .and_then(|index| self.regions.get(index))
            .ok_or(InvokeError::InvalidToken {
                token,
                regions: self.regions.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TetherRegion> {
        self.regions.iter()
    }
}

fn hash_payload(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

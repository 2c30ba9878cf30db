//! In-memory test doubles
//!
//! Nothing here executes code. [`FakeExecutableMemory`] records the
//! permission transitions it is asked for, [`FakeTrampoline`] applies a
//! closure to the context instead of jumping to the entry point.

use crate::flags::FlagSource;
use crate::memory::{ExecutableMemory, ExecutableRegion, MemoryError, WritableRegion};
use crate::trampoline::Trampoline;
use std::io;
use tether_types::{RegisterContext, Rflags};

/// One permission transition observed by [`FakeExecutableMemory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEvent {
    /// Block `index` allocated writable with `len` bytes
    Allocate { index: usize, len: usize },
    /// Block `index` locked; `contents` is what had been written by then
    MakeExecutable { index: usize, contents: Vec<u8> },
}

#[derive(Debug)]
pub struct FakeWritable {
    index: usize,
    bytes: Vec<u8>,
}

impl WritableRegion for FakeWritable {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// A locked fake block; its entry is the address of a heap buffer
#[derive(Debug)]
pub struct FakeBlock {
    bytes: Box<[u8]>,
}

impl FakeBlock {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ExecutableRegion for FakeBlock {
    fn entry(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Fake executable-memory allocator
///
/// Allocation and locking can be made to fail at a chosen block index.
#[derive(Debug, Default)]
pub struct FakeExecutableMemory {
    events: Vec<MemoryEvent>,
    allocated: usize,
    fail_allocation_at: Option<usize>,
    fail_protect_at: Option<usize>,
}

impl FakeExecutableMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the allocation of block `index` fail
    pub fn fail_allocation_at(mut self, index: usize) -> Self {
        self.fail_allocation_at = Some(index);
        self
    }

    /// Makes locking block `index` fail
    pub fn fail_protect_at(mut self, index: usize) -> Self {
        self.fail_protect_at = Some(index);
        self
    }

    /// Every transition, in the order requested
    pub fn events(&self) -> &[MemoryEvent] {
        &self.events
    }
}

impl ExecutableMemory for FakeExecutableMemory {
    type Writable = FakeWritable;
    type Executable = FakeBlock;

    fn allocate_writable(&mut self, len: usize) -> Result<FakeWritable, MemoryError> {
        if len == 0 {
            return Err(MemoryError::ZeroLength);
        }

        let index = self.allocated;
        if self.fail_allocation_at == Some(index) {
            return Err(MemoryError::AllocationFailed {
                len,
                source: io::Error::new(io::ErrorKind::OutOfMemory, "injected allocation failure"),
            });
        }

        self.allocated += 1;
        self.events.push(MemoryEvent::Allocate { index, len });
        Ok(FakeWritable {
            index,
            bytes: vec![0; len],
        })
    }

    fn make_executable(&mut self, block: FakeWritable) -> Result<FakeBlock, MemoryError> {
        if self.fail_protect_at == Some(block.index) {
            return Err(MemoryError::ProtectFailed {
                len: block.bytes.len(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "injected protect failure"),
            });
        }

        self.events.push(MemoryEvent::MakeExecutable {
            index: block.index,
            contents: block.bytes.clone(),
        });
        Ok(FakeBlock {
            bytes: block.bytes.into_boxed_slice(),
        })
    }
}

/// Flag source that always reports the same value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFlags(pub Rflags);

impl FixedFlags {
    pub const fn new(bits: u64) -> Self {
        Self(Rflags::from_bits(bits))
    }
}

impl FlagSource for FixedFlags {
    fn read_flags(&self) -> Rflags {
        self.0
    }
}

type Behavior = Box<dyn FnMut(&mut RegisterContext)>;

/// Trampoline that runs a closure instead of native code
///
/// Records each entry address it is asked to call, and the context exactly as
/// it would have been loaded into the CPU.
pub struct FakeTrampoline {
    behavior: Behavior,
    entries: Vec<*const u8>,
    loaded: Vec<RegisterContext>,
}

impl FakeTrampoline {
    pub fn new(behavior: impl FnMut(&mut RegisterContext) + 'static) -> Self {
        Self {
            behavior: Box::new(behavior),
            entries: Vec::new(),
            loaded: Vec::new(),
        }
    }

    /// A region that changes nothing
    pub fn identity() -> Self {
        Self::new(|_| {})
    }

    pub fn entries(&self) -> &[*const u8] {
        &self.entries
    }

    /// Contexts as they were handed to the region
    pub fn loaded(&self) -> &[RegisterContext] {
        &self.loaded
    }
}

impl Trampoline for FakeTrampoline {
    unsafe fn enter(&mut self, entry: *const u8, context: &mut RegisterContext) {
        self.entries.push(entry);
        self.loaded.push(*context);

        let token = context.token;
        (self.behavior)(context);
        context.token = token;
    }
}

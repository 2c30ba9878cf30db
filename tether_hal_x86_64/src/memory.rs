//! mmap-backed executable memory
//!
//! Blocks are mapped `PROT_READ | PROT_WRITE`, filled, then switched to
//! `PROT_EXEC` alone. Pages are never writable and executable at the same
//! time, and locked code cannot be read back.

use std::io;
use std::ptr::NonNull;
use tether_hal::{ExecutableMemory, ExecutableRegion, MemoryError, WritableRegion};

/// One anonymous private mapping, unmapped on drop
#[derive(Debug)]
struct Mapping {
    base: NonNull<u8>,
    mapped: usize,
    len: usize,
}

impl Mapping {
    fn new(len: usize) -> Result<Self, MemoryError> {
        let mapped = align_up(len, page_size());

        // SAFETY: anonymous private mapping at a kernel-chosen address; no
        // existing memory is affected.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed {
                len,
                source: io::Error::last_os_error(),
            });
        }

        let base = NonNull::new(base.cast::<u8>()).ok_or_else(|| MemoryError::AllocationFailed {
            len,
            source: io::Error::new(io::ErrorKind::Other, "mmap returned null"),
        })?;
        Ok(Self { base, mapped, len })
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: base/mapped describe exactly the mapping created in `new`,
        // which is owned by this value alone.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.mapped);
        }
    }
}

/// A writable block that has not been locked yet
#[derive(Debug)]
pub struct MmapWritable(Mapping);

impl WritableRegion for MmapWritable {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is readable and writable until it is consumed by
        // `make_executable`, and `len` never exceeds the mapped size.
        unsafe { std::slice::from_raw_parts_mut(self.0.base.as_ptr(), self.0.len) }
    }
}

/// A locked, execute-only block
#[derive(Debug)]
pub struct MmapBlock(Mapping);

impl ExecutableRegion for MmapBlock {
    fn entry(&self) -> *const u8 {
        self.0.base.as_ptr()
    }

    fn len(&self) -> usize {
        self.0.len
    }
}

#[derive(Debug, Default)]
pub struct MmapExecutableMemory;

impl MmapExecutableMemory {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutableMemory for MmapExecutableMemory {
    type Writable = MmapWritable;
    type Executable = MmapBlock;

    fn allocate_writable(&mut self, len: usize) -> Result<MmapWritable, MemoryError> {
        if len == 0 {
            return Err(MemoryError::ZeroLength);
        }
        Mapping::new(len).map(MmapWritable)
    }

    fn make_executable(&mut self, block: MmapWritable) -> Result<MmapBlock, MemoryError> {
        let mapping = block.0;

        // SAFETY: changes protection of a mapping we own; no references into
        // it survive, since `block` was consumed.
        let ret = unsafe {
            libc::mprotect(
                mapping.base.as_ptr().cast(),
                mapping.mapped,
                libc::PROT_EXEC,
            )
        };
        if ret != 0 {
            return Err(MemoryError::ProtectFailed {
                len: mapping.len,
                source: io::Error::last_os_error(),
            });
        }

        Ok(MmapBlock(mapping))
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

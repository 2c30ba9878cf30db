//! # x86_64 Hardware Abstraction Layer
//!
//! Implements the `tether_hal` capabilities on x86_64 unix hosts.
//!
//! ## Scope
//!
//! - [`HostFlags`]: reads the live flags register with `pushfq`
//! - [`MmapExecutableMemory`]: anonymous `mmap` pages, written read-write and
//!   then switched to execute-only with `mprotect`
//! - [`NativeTrampoline`]: the register-swap routine that enters a region
//!
//! The trampoline is only built for x86_64 Linux, where the System V calling
//! convention and ELF symbol naming it relies on are guaranteed.

#[cfg(target_arch = "x86_64")]
pub mod flags;
#[cfg(unix)]
pub mod memory;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod trampoline;

#[cfg(target_arch = "x86_64")]
pub use flags::HostFlags;
#[cfg(unix)]
pub use memory::{MmapBlock, MmapExecutableMemory, MmapWritable};
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub use trampoline::NativeTrampoline;

//! # Tether Hardware Abstraction Layer
//!
//! Capability traits for everything that touches the machine directly.
//!
//! ## Philosophy
//!
//! **Raw machine access lives behind traits.**
//!
//! The registry, sanitizer and dispatcher never allocate executable memory,
//! read the flags register or jump into native code themselves. They are
//! handed a capability that does it. Production uses the implementations in
//! `tether_hal_x86_64`; tests use the fakes in [`fake`].
//!
//! ## Design Principles
//!
//! 1. **Write, then lock**: memory is never writable and executable at once
//! 2. **One unsafe entry point**: only [`Trampoline::enter`] runs region code
//! 3. **Testable**: every capability has an in-memory double

pub mod fake;
pub mod flags;
pub mod memory;
pub mod trampoline;

pub use fake::{FakeExecutableMemory, FakeTrampoline, FixedFlags, MemoryEvent};
pub use flags::FlagSource;
pub use memory::{ExecutableMemory, ExecutableRegion, MemoryError, WritableRegion};
pub use trampoline::Trampoline;

//! Live flags register

use tether_hal::FlagSource;
use tether_types::Rflags;

/// Reads RFLAGS of the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFlags;

impl HostFlags {
    pub fn new() -> Self {
        Self
    }
}

impl FlagSource for HostFlags {
    #[inline]
    fn read_flags(&self) -> Rflags {
        let bits: u64;
        // SAFETY: pushfq/pop only move the flags register through the stack
        // slot they themselves allocate. Nothing else is read or written.
        unsafe {
            core::arch::asm!(
                "pushfq",
                "pop {}",
                out(reg) bits,
                options(nomem, preserves_flags)
            );
        }
        Rflags::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_bit_reads_as_one() {
        let flags = HostFlags::new().read_flags();
        assert!(flags.contains(Rflags::READ_AS_1));
    }

    #[test]
    fn test_user_mode_flags() {
        let flags = HostFlags::new().read_flags();
        assert!(!flags.trap());
        assert!(!flags.direction());
        assert!(flags.interrupt_enable());
        assert_eq!(flags.io_privilege_level(), 0);
    }
}

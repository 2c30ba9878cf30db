//! Flags register access

use tether_types::Rflags;

/// Source of the executing environment's real flags register
///
/// The sanitizer builds every execution's flags from this baseline.
pub trait FlagSource {
    fn read_flags(&self) -> Rflags;
}

//! Flags-register sanitization
//!
//! Only the status bits in [`Rflags::STATUS_MASK`] cross the boundary in
//! either direction. Everything else the region runs with comes from the
//! server's own flags; everything else the client gets back is what it sent.

use tether_hal::FlagSource;
use tether_types::Rflags;

/// Result of sanitizing a client's flags before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizedFlags {
    /// Value the region runs with
    pub execution: Rflags,
    /// The client's value, kept for the return path
    pub original: Rflags,
}

/// Overlays the client's status bits onto the real baseline
pub fn sanitize_for_execution(client: Rflags, baseline: Rflags) -> SanitizedFlags {
    SanitizedFlags {
        execution: baseline.with_status_of(client),
        original: client,
    }
}

/// Overlays the region's status bits onto the client's original value
pub fn sanitize_for_return(original: Rflags, post_execution: Rflags) -> Rflags {
    original.with_status_of(post_execution)
}

/// Sanitizer bound to a live flag source
#[derive(Debug, Default)]
pub struct FlagSanitizer<F> {
    source: F,
}

impl<F: FlagSource> FlagSanitizer<F> {
    pub fn new(source: F) -> Self {
        Self { source }
    }

    /// Reads the baseline now and overlays the client's status bits
    pub fn for_execution(&self, client: Rflags) -> SanitizedFlags {
        sanitize_for_execution(client, self.source.read_flags())
    }

    pub fn for_return(&self, sanitized: &SanitizedFlags, post_execution: Rflags) -> Rflags {
        sanitize_for_return(sanitized.original, post_execution)
    }
}

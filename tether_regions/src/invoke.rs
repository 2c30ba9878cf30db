//! Region invocation

use crate::error::InvokeError;
use crate::sanitize::FlagSanitizer;
use crate::table::RegionTable;
use tether_hal::{FlagSource, Trampoline};
use tether_types::{RegisterContext, Rflags};

/// Runs regions on behalf of clients
///
/// Looks the token up, sanitizes the flags, enters the region and sanitizes
/// the flags it returns. Synchronous: the call blocks until the region
/// returns.
pub struct RegionInvoker<T, F> {
    trampoline: T,
    sanitizer: FlagSanitizer<F>,
}

impl<T: Trampoline, F: FlagSource> RegionInvoker<T, F> {
    pub fn new(trampoline: T, flags: F) -> Self {
        Self {
            trampoline,
            sanitizer: FlagSanitizer::new(flags),
        }
    }

    pub fn invoke(
        &mut self,
        table: &RegionTable,
        context: &RegisterContext,
    ) -> Result<RegisterContext, InvokeError> {
        let region = table.lookup(context.token)?;
        let sanitized = self.sanitizer.for_execution(Rflags::from_bits(context.rflags));

        let mut working = *context;
        working.rflags = sanitized.execution.bits();

        tracing::debug!(
            token = context.token,
            entry = ?region.entry(),
            "Entering tether region"
        );
        // SAFETY: the entry comes from a locked block owned by `table`, which
        // outlives this call. Every block ends in RET, and the flags were
        // sanitized above.
        unsafe { self.trampoline.enter(region.entry(), &mut working) };

        working.rflags = self
            .sanitizer
            .for_return(&sanitized, Rflags::from_bits(working.rflags))
            .bits();
        working.token = context.token;
        Ok(working)
    }

    pub fn trampoline(&self) -> &T {
        &self.trampoline
    }
}

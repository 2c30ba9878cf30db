//! Register-context trampoline

use tether_types::RegisterContext;

/// Runs native code with a full register context
///
/// On entry the fifteen general-purpose registers and the flags register are
/// loaded from `context`. On return the values the code left behind are
/// written back into `context`, and the caller's own registers are restored.
/// `context.token` is never touched.
pub trait Trampoline {
    /// Calls `entry` with `context` loaded into the CPU
    ///
    /// # Safety
    ///
    /// `entry` must point to executable code that returns with `RET`, keeps
    /// the stack balanced and does not outlive the call. The flags in
    /// `context.rflags` must already be sanitized.
    unsafe fn enter(&mut self, entry: *const u8, context: &mut RegisterContext);
}

//! Register-swap trampoline
//!
//! `tether_trampoline_enter(context, entry)` exchanges every general-purpose
//! register with its slot in the context, loads the context's flags, calls
//! `entry`, captures the flags it left and exchanges everything back. The
//! caller's registers and flags end up restored; the region's values end up
//! in the context.
//!
//! Stack on the call into the region (16-byte aligned):
//!
//! ```text
//! [rsp + 0x00]  entry
//! [rsp + 0x08]  context pointer, later the region's rax
//! [rsp + 0x10]  caller flags
//! [rsp + 0x18]  return address
//! ```

use tether_hal::Trampoline;
use tether_types::RegisterContext;

core::arch::global_asm!(
    ".text",
    ".globl tether_trampoline_enter",
    ".type tether_trampoline_enter,@function",
    ".p2align 4",
    "tether_trampoline_enter:",
    "pushfq",
    "push rdi",
    "push rsi",
    "mov rax, rdi",
    "xchg r15, qword ptr [rax + 0x00]",
    "xchg r14, qword ptr [rax + 0x08]",
    "xchg r13, qword ptr [rax + 0x10]",
    "xchg r12, qword ptr [rax + 0x18]",
    "xchg r11, qword ptr [rax + 0x20]",
    "xchg r10, qword ptr [rax + 0x28]",
    "xchg r9, qword ptr [rax + 0x30]",
    "xchg r8, qword ptr [rax + 0x38]",
    "xchg rdi, qword ptr [rax + 0x40]",
    "xchg rsi, qword ptr [rax + 0x48]",
    "xchg rbp, qword ptr [rax + 0x50]",
    "xchg rbx, qword ptr [rax + 0x58]",
    "xchg rdx, qword ptr [rax + 0x60]",
    "xchg rcx, qword ptr [rax + 0x68]",
    "push qword ptr [rax + 0x78]",
    "popfq",
    // rax slot now holds the context pointer until the region returns
    "xchg rax, qword ptr [rax + 0x70]",
    "call qword ptr [rsp]",
    "xchg rax, qword ptr [rsp + 0x08]",
    "xchg r15, qword ptr [rax + 0x00]",
    "xchg r14, qword ptr [rax + 0x08]",
    "xchg r13, qword ptr [rax + 0x10]",
    "xchg r12, qword ptr [rax + 0x18]",
    "xchg r11, qword ptr [rax + 0x20]",
    "xchg r10, qword ptr [rax + 0x28]",
    "xchg r9, qword ptr [rax + 0x30]",
    "xchg r8, qword ptr [rax + 0x38]",
    "xchg rdi, qword ptr [rax + 0x40]",
    "xchg rsi, qword ptr [rax + 0x48]",
    "xchg rbp, qword ptr [rax + 0x50]",
    "xchg rbx, qword ptr [rax + 0x58]",
    "xchg rdx, qword ptr [rax + 0x60]",
    "xchg rcx, qword ptr [rax + 0x68]",
    "mov rcx, qword ptr [rsp + 0x08]",
    "mov qword ptr [rax + 0x70], rcx",
    // xchg and mov leave the region's flags intact
    "pushfq",
    "pop qword ptr [rax + 0x78]",
    "pop rcx",
    "pop rdx",
    "popfq",
    "ret",
    ".size tether_trampoline_enter, . - tether_trampoline_enter",
);

extern "sysv64" {
    fn tether_trampoline_enter(context: *mut RegisterContext, entry: *const u8);
}

/// Enters native regions through `tether_trampoline_enter`
#[derive(Debug, Default)]
pub struct NativeTrampoline;

impl NativeTrampoline {
    pub fn new() -> Self {
        Self
    }
}

impl Trampoline for NativeTrampoline {
    unsafe fn enter(&mut self, entry: *const u8, context: &mut RegisterContext) {
        // SAFETY: the routine follows sysv64, restores every callee-saved
        // register and the caller's flags, and only touches the 0x80 bytes
        // before `token`. The caller upholds the contract on `entry`.
        unsafe { tether_trampoline_enter(context, entry) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostFlags, MmapExecutableMemory};
    use tether_hal::{ExecutableMemory, ExecutableRegion, FlagSource, WritableRegion};
    use tether_types::{GpRegister, Rflags};

    fn load(code: &[u8]) -> crate::MmapBlock {
        let mut memory = MmapExecutableMemory::new();
        let mut block = memory.allocate_writable(code.len() + 1).unwrap();
        let bytes = block.as_mut_slice();
        bytes[..code.len()].copy_from_slice(code);
        bytes[code.len()] = 0xC3;
        memory.make_executable(block).unwrap()
    }

    fn baseline_context(token: u64) -> RegisterContext {
        let mut ctx = RegisterContext::for_token(token);
        ctx.rflags = HostFlags::new().read_flags().bits();
        ctx
    }

    #[test]
    fn test_add_to_rax() {
        // add rax, 5
        let block = load(&[0x48, 0x83, 0xC0, 0x05]);
        let mut ctx = baseline_context(1).with(GpRegister::Rax, 10);

        unsafe { NativeTrampoline::new().enter(block.entry(), &mut ctx) };

        assert_eq!(ctx.rax, 15);
        assert_eq!(ctx.token, 1);
        assert!(Rflags::from_bits(ctx.rflags).contains(Rflags::READ_AS_1));
    }

    #[test]
    fn test_every_register_round_trips() {
        // ret only: the region sees and returns exactly what it was given
        let block = load(&[]);
        let mut ctx = baseline_context(0);
        for (i, reg) in GpRegister::ALL.iter().enumerate() {
            ctx.set(*reg, 0x1000 + i as u64);
        }
        let before = ctx;

        unsafe { NativeTrampoline::new().enter(block.entry(), &mut ctx) };

        for reg in GpRegister::ALL {
            assert_eq!(ctx.get(reg), before.get(reg), "{:?} changed", reg);
        }
    }

    #[test]
    fn test_region_flags_are_captured() {
        // xor rbx, rbx
        let block = load(&[0x48, 0x31, 0xDB]);
        let mut ctx = baseline_context(0).with(GpRegister::Rbx, 0xFFFF);
        ctx.rflags &= !(Rflags::ZERO | Rflags::CARRY);

        unsafe { NativeTrampoline::new().enter(block.entry(), &mut ctx) };

        let flags = Rflags::from_bits(ctx.rflags);
        assert_eq!(ctx.rbx, 0);
        assert!(flags.zero());
        assert!(!flags.carry());
        assert!(!flags.sign());
    }

    #[test]
    fn test_loaded_status_flags_reach_region() {
        // setc al; movzx rax, al
        let block = load(&[0x0F, 0x92, 0xC0, 0x48, 0x0F, 0xB6, 0xC0]);

        let mut ctx = baseline_context(0);
        ctx.rflags |= Rflags::CARRY;
        unsafe { NativeTrampoline::new().enter(block.entry(), &mut ctx) };
        assert_eq!(ctx.rax, 1);

        let mut ctx = baseline_context(0);
        ctx.rflags &= !Rflags::CARRY;
        unsafe { NativeTrampoline::new().enter(block.entry(), &mut ctx) };
        assert_eq!(ctx.rax, 0);
    }
}

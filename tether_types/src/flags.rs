//! x86_64 flags register layout
//!
//! The status flags (carry, parity, zero, sign, overflow) report the outcome
//! of arithmetic instructions. Every other bit is a control or system bit and
//! governs processor behavior (single-step, interrupts, string direction,
//! I/O privilege, ...).
//!
//! Bits are addressed through explicit masks so the layout never depends on
//! host bit-field ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A flags register value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rflags(u64);

impl Rflags {
    /// Carry flag (bit 0)
    pub const CARRY: u64 = 1 << 0;
    /// Reserved, always reads as 1 (bit 1)
    pub const READ_AS_1: u64 = 1 << 1;
    /// Parity flag (bit 2)
    pub const PARITY: u64 = 1 << 2;
    /// Auxiliary carry flag (bit 4)
    pub const AUXILIARY_CARRY: u64 = 1 << 4;
    /// Zero flag (bit 6)
    pub const ZERO: u64 = 1 << 6;
    /// Sign flag (bit 7)
    pub const SIGN: u64 = 1 << 7;
    /// Trap flag (bit 8)
    pub const TRAP: u64 = 1 << 8;
    /// Interrupt enable flag (bit 9)
    pub const INTERRUPT_ENABLE: u64 = 1 << 9;
    /// Direction flag (bit 10)
    pub const DIRECTION: u64 = 1 << 10;
    /// Overflow flag (bit 11)
    pub const OVERFLOW: u64 = 1 << 11;
    /// I/O privilege level field (bits 12-13)
    pub const IO_PRIVILEGE_LEVEL: u64 = 0b11 << 12;
    /// Nested task flag (bit 14)
    pub const NESTED_TASK: u64 = 1 << 14;
    /// Resume flag (bit 16)
    pub const RESUME: u64 = 1 << 16;
    /// Virtual-8086 mode flag (bit 17)
    pub const VIRTUAL_8086_MODE: u64 = 1 << 17;
    /// Alignment check / access control flag (bit 18)
    pub const ALIGNMENT_CHECK: u64 = 1 << 18;
    /// Virtual interrupt flag (bit 19)
    pub const VIRTUAL_INTERRUPT: u64 = 1 << 19;
    /// Virtual interrupt pending flag (bit 20)
    pub const VIRTUAL_INTERRUPT_PENDING: u64 = 1 << 20;
    /// Identification flag (bit 21)
    pub const IDENTIFICATION: u64 = 1 << 21;

    /// The only bits a remote party may influence
    pub const STATUS_MASK: u64 =
        Self::CARRY | Self::PARITY | Self::ZERO | Self::SIGN | Self::OVERFLOW;

    /// Every named control and system bit
    pub const CONTROL_MASK: u64 = Self::TRAP
        | Self::INTERRUPT_ENABLE
        | Self::DIRECTION
        | Self::IO_PRIVILEGE_LEVEL
        | Self::NESTED_TASK
        | Self::RESUME
        | Self::VIRTUAL_8086_MODE
        | Self::ALIGNMENT_CHECK
        | Self::VIRTUAL_INTERRUPT
        | Self::VIRTUAL_INTERRUPT_PENDING
        | Self::IDENTIFICATION;

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, mask: u64) -> bool {
        self.0 & mask == mask
    }

    pub const fn carry(self) -> bool {
        self.contains(Self::CARRY)
    }

    pub const fn parity(self) -> bool {
        self.contains(Self::PARITY)
    }

    pub const fn zero(self) -> bool {
        self.contains(Self::ZERO)
    }

    pub const fn sign(self) -> bool {
        self.contains(Self::SIGN)
    }

    pub const fn overflow(self) -> bool {
        self.contains(Self::OVERFLOW)
    }

    pub const fn trap(self) -> bool {
        self.contains(Self::TRAP)
    }

    pub const fn interrupt_enable(self) -> bool {
        self.contains(Self::INTERRUPT_ENABLE)
    }

    pub const fn direction(self) -> bool {
        self.contains(Self::DIRECTION)
    }

    /// I/O privilege level (0-3)
    pub const fn io_privilege_level(self) -> u8 {
        ((self.0 & Self::IO_PRIVILEGE_LEVEL) >> 12) as u8
    }

    /// Status bits only
    pub const fn status(self) -> u64 {
        self.0 & Self::STATUS_MASK
    }

    /// Everything except the status bits
    pub const fn non_status(self) -> u64 {
        self.0 & !Self::STATUS_MASK
    }

    /// Keeps every non-status bit of `self` and takes the status bits of `source`
    pub const fn with_status_of(self, source: Rflags) -> Self {
        Self(self.non_status() | source.status())
    }

    /// Sets or clears the bits in `mask`
    pub const fn with(self, mask: u64, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}

impl From<u64> for Rflags {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<Rflags> for u64 {
    fn from(flags: Rflags) -> Self {
        flags.0
    }
}

impl fmt::Display for Rflags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

//! Register context exchanged with tether regions
//!
//! The field order is wire-exact and mirrors the offsets the trampoline uses,
//! so the struct is `#[repr(C)]` and must never be reordered.

use crate::constants::REGISTER_CONTEXT_SIZE;
use serde::{Deserialize, Serialize};

/// General-purpose register slots, in context order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpRegister {
    R15,
    R14,
    R13,
    R12,
    R11,
    R10,
    R9,
    R8,
    Rdi,
    Rsi,
    Rbp,
    Rbx,
    Rdx,
    Rcx,
    Rax,
}

impl GpRegister {
    /// All slots in context order
    pub const ALL: [GpRegister; 15] = [
        GpRegister::R15,
        GpRegister::R14,
        GpRegister::R13,
        GpRegister::R12,
        GpRegister::R11,
        GpRegister::R10,
        GpRegister::R9,
        GpRegister::R8,
        GpRegister::Rdi,
        GpRegister::Rsi,
        GpRegister::Rbp,
        GpRegister::Rbx,
        GpRegister::Rdx,
        GpRegister::Rcx,
        GpRegister::Rax,
    ];

    /// Byte offset of this slot inside [`RegisterContext`]
    pub const fn offset(self) -> usize {
        self as usize * 8
    }
}

/// Full register file handed to a tether region
///
/// Fifteen general-purpose slots, the flags register and the token selecting
/// the region to run.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub rflags: u64,
    pub token: u64,
}

impl RegisterContext {
    /// Creates an all-zero context selecting `token`
    pub fn for_token(token: u64) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// Reads a general-purpose slot
    pub fn get(&self, reg: GpRegister) -> u64 {
        *self.slot(reg)
    }

    /// Writes a general-purpose slot
    pub fn set(&mut self, reg: GpRegister, value: u64) {
        *self.slot_mut(reg) = value;
    }

    /// Builder form of [`RegisterContext::set`]
    pub fn with(mut self, reg: GpRegister, value: u64) -> Self {
        self.set(reg, value);
        self
    }

    fn slot(&self, reg: GpRegister) -> &u64 {
        match reg {
            GpRegister::R15 => &self.r15,
            GpRegister::R14 => &self.r14,
            GpRegister::R13 => &self.r13,
            GpRegister::R12 => &self.r12,
            GpRegister::R11 => &self.r11,
            GpRegister::R10 => &self.r10,
            GpRegister::R9 => &self.r9,
            GpRegister::R8 => &self.r8,
            GpRegister::Rdi => &self.rdi,
            GpRegister::Rsi => &self.rsi,
            GpRegister::Rbp => &self.rbp,
            GpRegister::Rbx => &self.rbx,
            GpRegister::Rdx => &self.rdx,
            GpRegister::Rcx => &self.rcx,
            GpRegister::Rax => &self.rax,
        }
    }

    fn slot_mut(&mut self, reg: GpRegister) -> &mut u64 {
        match reg {
            GpRegister::R15 => &mut self.r15,
            GpRegister::R14 => &mut self.r14,
            GpRegister::R13 => &mut self.r13,
            GpRegister::R12 => &mut self.r12,
            GpRegister::R11 => &mut self.r11,
            GpRegister::R10 => &mut self.r10,
            GpRegister::R9 => &mut self.r9,
            GpRegister::R8 => &mut self.r8,
            GpRegister::Rdi => &mut self.rdi,
            GpRegister::Rsi => &mut self.rsi,
            GpRegister::Rbp => &mut self.rbp,
            GpRegister::Rbx => &mut self.rbx,
            GpRegister::Rdx => &mut self.rdx,
            GpRegister::Rcx => &mut self.rcx,
            GpRegister::Rax => &mut self.rax,
        }
    }

    fn words(&self) -> [u64; 17] {
        [
            self.r15,
            self.r14,
            self.r13,
            self.r12,
            self.r11,
            self.r10,
            self.r9,
            self.r8,
            self.rdi,
            self.rsi,
            self.rbp,
            self.rbx,
            self.rdx,
            self.rcx,
            self.rax,
            self.rflags,
            self.token,
        ]
    }

    /// Serializes the context in wire order, each slot little-endian
    pub fn to_bytes(&self) -> [u8; REGISTER_CONTEXT_SIZE] {
        let mut out = [0u8; REGISTER_CONTEXT_SIZE];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Deserializes a context from wire order
    pub fn from_bytes(bytes: &[u8; REGISTER_CONTEXT_SIZE]) -> Self {
        let mut words = [0u64; 17];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }

        let [r15, r14, r13, r12, r11, r10, r9, r8, rdi, rsi, rbp, rbx, rdx, rcx, rax, rflags, token] =
            words;
        Self {
            r15,
            r14,
            r13,
            r12,
            r11,
            r10,
            r9,
            r8,
            rdi,
            rsi,
            rbp,
            rbx,
            rdx,
            rcx,
            rax,
            rflags,
            token,
        }
    }
}

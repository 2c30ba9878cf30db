//! # Tether Types
//!
//! This crate defines the fundamental types shared by every Tether crate.
//!
//! ## Philosophy
//!
//! - **Wire-exact layouts**: the register context has one layout, used on the
//!   wire, in the trampoline and in memory.
//! - **Explicit bits**: the flags register is a set of named masks, never a
//!   bit-field union.
//! - **No ambient state**: identifiers are values, not globals.
//!
//! ## Key Types
//!
//! - [`RegisterContext`]: the register file exchanged with a tether region
//! - [`Rflags`]: named bit layout of the x86_64 flags register
//! - [`ConnectionId`]: transport-assigned connection handle
//! - [`SessionId`]: log-correlation identifier of an established session

pub mod constants;
pub mod context;
pub mod flags;
pub mod ids;

pub use constants::{
    KEY_EXCHANGE_SIZE, NONCE_SIZE, PACKET_TYPE_SIZE, PROTOCOL_VERSION, PUBLIC_KEY_SIZE,
    REGISTER_CONTEXT_SIZE, RET_OPCODE, SECURE_ENVELOPE_SIZE, SESSION_KEY_SIZE, TAG_SIZE,
};
pub use context::{GpRegister, RegisterContext};
pub use flags::Rflags;
pub use ids::{ConnectionId, SessionId};

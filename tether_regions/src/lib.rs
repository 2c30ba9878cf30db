//! # Tether Regions
//!
//! The registry of native code fragments and the path that runs them.
//!
//! ## Key Types
//!
//! - [`RegionTable`]: regions loaded from a descriptor, looked up by token
//! - [`FlagSanitizer`]: keeps client flags away from control bits
//! - [`RegionInvoker`]: lookup, sanitize, enter, sanitize
//!
//! ## Descriptor format
//!
//! ```text
//! u32 count
//! count × { u32 token, u32 length, length bytes of code }
//! ```
//!
//! All integers are little-endian. Each payload is copied into its own
//! executable block followed by a `RET`.

pub mod descriptor;
pub mod error;
pub mod invoke;
pub mod sanitize;
pub mod table;

pub use descriptor::{parse_descriptor, RegionRecord};
pub use error::{InvokeError, RegistryError};
pub use invoke::RegionInvoker;
pub use sanitize::{sanitize_for_execution, sanitize_for_return, FlagSanitizer, SanitizedFlags};
pub use table::{RegionTable, TetherRegion};

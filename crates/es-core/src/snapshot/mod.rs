//! ESRT rule snapshots
//!
//! The compiled, versioned form of the rule tables: a JSON document with a
//! magic tag, a format version and a CRC32 over the canonical body.

mod format;
mod loader;

pub use format::*;
pub use loader::*;

//! # dietree
//!
//! Lazy decoder for DWARF debugging information entries (DIEs).
//!
//! Given the raw bytes of `.debug_info`, `.debug_abbrev` and the string
//! sections, it rebuilds the tree of entries of each unit on demand:
//! - DWARF versions 2 to 5, 32-bit and 64-bit formats, either byte order
//! - random access to any DIE by section offset
//! - parent, child and sibling navigation with memoized links
//! - reference resolution within and across units
//!
//! Locating the sections inside an object file is left to the caller.

pub mod config;
pub mod dwarf;
pub mod error;
pub mod section;

pub use config::{DwarfConfig, SiblingPolicy};
pub use dwarf::{CompileUnit, DebugInfo, Die, DieId, DieRef};
pub use error::ParseError;
pub use section::{DebugSection, Reader};

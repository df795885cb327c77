//! DWARF debugging information entries.
//!
//! # Structure
//!
//! The decoder reads three kinds of sections:
//! - `.debug_info` - Units and the flattened DIE trees inside them
//! - `.debug_abbrev` - Abbreviation tables defining DIE structure
//! - `.debug_str`, `.debug_line_str`, `.debug_str_offsets` - Strings that
//!   attributes point into
//!
//! Everything is lazy. A unit header is read when the unit is first asked
//! for, a DIE when its offset is first visited, and a subtree only when a walk
//! has to cross it without a `DW_AT_sibling` shortcut.
//!
//! # Example
//!
//! ```ignore
//! use dietree::dwarf::{DebugInfo, DwAt};
//! use dietree::{DebugSection, DwarfConfig};
//!
//! let mut dwarf = DebugInfo::new(
//!     DwarfConfig::default(),
//!     DebugSection::new(".debug_info", debug_info_data),
//!     DebugSection::new(".debug_abbrev", debug_abbrev_data),
//! )
//! .with_debug_str(DebugSection::new(".debug_str", debug_str_data));
//!
//! let mut units = dwarf.units();
//! while let Some(unit) = units.next(&mut dwarf)? {
//!     let top = unit.top_die()?;
//!     println!("{}", unit.full_path(top));
//!     for child in unit.child_ids(top)? {
//!         println!("{}", unit.die(child));
//!     }
//! }
//! ```

mod abbrev;
mod die;
mod form;
mod info;
mod leb128;
pub mod strings;
mod types;
mod unit;

pub use abbrev::{AbbrevCache, Abbreviation, AbbreviationTable, AttributeSpec};
pub use die::{Attribute, AttributeValue, Die, DieId, MAX_INDIRECTION};
pub use form::{
    DecodeRule, DwarfFormat, Encoding, FormTable, FormTableCache, IndexKind, LengthPrefix,
    ReferenceKind, TargetSection, Width,
};
pub use info::{DebugInfo, DieRef, Units};
pub use leb128::{decode_sleb128, decode_uleb128, encode_sleb128, encode_uleb128};
pub use strings::{StringOffsets, StringSections, StringTable};
pub use types::{DwAt, DwForm, DwTag, DwUt};
pub use unit::{Children, CompilationUnitHeader, CompileUnit, Entries};

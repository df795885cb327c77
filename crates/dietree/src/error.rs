//! Error types for DWARF debug information decoding.

use thiserror::Error;

use crate::dwarf::{DwAt, DwForm};

/// Error type for DWARF decoding.
///
/// Every failure is fatal for the call that produced it. Caches are only
/// updated after a parse fully succeeds, so a failed call leaves the unit and
/// context state exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The section ended in the middle of a field.
    #[error("truncated data: expected {expected} bytes, got {actual} while parsing {context}")]
    TruncatedData {
        expected: usize,
        actual: usize,
        context: &'static str,
    },

    /// A DIE refers to an abbreviation code with no declaration.
    #[error("unknown abbreviation code {code} for DIE at offset {offset:#x}")]
    UnknownAbbrevCode { code: u64, offset: u64 },

    /// The offset does not start a DIE of the unit's tree.
    #[error("offset {offset:#x} is not a DIE in the unit at {unit_offset:#x}")]
    InvalidDieOffset { offset: u64, unit_offset: u64 },

    /// A reference was requested through a non-reference attribute.
    #[error("attribute {name} has form {form}, which is not a reference")]
    NotAReferenceForm { name: DwAt, form: DwForm },

    /// The reference kind needs type-unit or supplementary-file lookup.
    #[error("reference form {form} is not supported")]
    UnsupportedReferenceKind { form: DwForm },

    /// An offset lies outside a section.
    #[error("offset {offset:#x} is outside {section} (size {size:#x})")]
    OffsetOutOfRange {
        section: &'static str,
        offset: u64,
        size: u64,
    },

    /// The section ran out before a unit containing the offset was found.
    #[error("no unit contains offset {offset:#x}")]
    NoContainingUnit { offset: u64 },

    /// The DIE has no attribute with this name.
    #[error("missing attribute {name}")]
    MissingAttribute { name: DwAt },

    /// A string form needs a section that was not supplied.
    #[error("missing section {0}")]
    MissingSection(&'static str),

    /// The form code is not a known DWARF form.
    #[error("unknown DWARF form {0:#x}")]
    UnknownForm(u64),

    /// `DW_FORM_indirect` chained more hops than allowed.
    #[error("DW_FORM_indirect nested {depth} levels deep")]
    IndirectionTooDeep { depth: usize },

    /// Unsupported format version.
    #[error("unsupported {format} version: {version}")]
    UnsupportedVersion { format: &'static str, version: u32 },

    /// Invalid value encountered during parsing.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Integer overflow during parsing.
    #[error("integer overflow while parsing {context}")]
    Overflow { context: &'static str },
}

impl ParseError {
    /// Creates a new TruncatedData error.
    pub fn truncated(expected: usize, actual: usize, context: &'static str) -> Self {
        Self::TruncatedData {
            expected,
            actual,
            context,
        }
    }

    /// Creates a new InvalidDieOffset error.
    pub fn invalid_die_offset(offset: u64, unit_offset: u64) -> Self {
        Self::InvalidDieOffset {
            offset,
            unit_offset,
        }
    }
}

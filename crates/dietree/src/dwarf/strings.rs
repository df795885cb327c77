//! String sections referenced by attribute forms.
//!
//! - `.debug_str` / `.debug_line_str` hold NUL-terminated strings addressed
//!   by byte offset (`DW_FORM_strp`, `DW_FORM_line_strp`).
//! - `.debug_str_offsets` (DWARF 5) holds arrays of offsets into
//!   `.debug_str`, addressed by index (`DW_FORM_strx*`). Each unit's array
//!   starts at its `DW_AT_str_offsets_base`.
//!
//! ```text
//! .debug_str_offsets contribution:
//!   unit_length: 4 bytes (or 12 for 64-bit DWARF)
//!   version: 2 bytes (5)
//!   padding: 2 bytes
//!   offset[0..n]: 4/8 bytes each   <- DW_AT_str_offsets_base points here
//! ```

use super::form::DwarfFormat;
use crate::section::DebugSection;
use crate::ParseError;

/// A section of NUL-terminated strings.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    section: DebugSection<'a>,
}

impl<'a> StringTable<'a> {
    pub fn new(section: DebugSection<'a>) -> Self {
        Self { section }
    }

    /// The string starting at `offset`, without its terminator.
    pub fn get_string(&self, offset: u64) -> Result<&'a [u8], ParseError> {
        self.section.check_offset(offset)?;
        // Independent cursor: the caller's position is never touched.
        let mut reader = self.section.reader_at(offset, true);
        reader.read_cstr()
    }
}

/// The `.debug_str_offsets` section.
#[derive(Debug, Clone, Copy)]
pub struct StringOffsets<'a> {
    section: DebugSection<'a>,
    little_endian: bool,
}

impl<'a> StringOffsets<'a> {
    pub fn new(section: DebugSection<'a>, little_endian: bool) -> Self {
        Self {
            section,
            little_endian,
        }
    }

    /// Size of a contribution header; used as the base when a unit has no
    /// `DW_AT_str_offsets_base`.
    pub fn header_size(format: DwarfFormat) -> u64 {
        match format {
            DwarfFormat::Dwarf32 => 8,
            DwarfFormat::Dwarf64 => 16,
        }
    }

    /// The `.debug_str` offset stored at `index` of the array at `base`.
    pub fn get_str_offset(
        &self,
        base: u64,
        index: u64,
        format: DwarfFormat,
    ) -> Result<u64, ParseError> {
        let size = format.offset_size();
        let entry = index
            .checked_mul(size as u64)
            .and_then(|delta| base.checked_add(delta))
            .ok_or(ParseError::Overflow {
                context: "string offsets index",
            })?;
        self.section.check_offset(entry)?;
        let mut reader = self.section.reader_at(entry, self.little_endian);
        reader.read_uint(size)
    }
}

/// The string sections a unit's attributes may point into.
///
/// Any of them may be absent; only a form that needs a missing section fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSections<'a> {
    pub debug_str: Option<StringTable<'a>>,
    pub debug_line_str: Option<StringTable<'a>>,
    pub debug_str_offsets: Option<StringOffsets<'a>>,
}

impl<'a> StringSections<'a> {
    /// `DW_FORM_strp`
    pub fn strp(&self, offset: u64) -> Result<&'a [u8], ParseError> {
        self.debug_str
            .ok_or(ParseError::MissingSection(".debug_str"))?
            .get_string(offset)
    }

    /// `DW_FORM_line_strp`
    pub fn line_strp(&self, offset: u64) -> Result<&'a [u8], ParseError> {
        self.debug_line_str
            .ok_or(ParseError::MissingSection(".debug_line_str"))?
            .get_string(offset)
    }

    /// `DW_FORM_strx*`: index into the unit's string offsets array, then
    /// into `.debug_str`.
    pub fn strx(&self, base: u64, index: u64, format: DwarfFormat) -> Result<&'a [u8], ParseError> {
        let offsets = self
            .debug_str_offsets
            .ok_or(ParseError::MissingSection(".debug_str_offsets"))?;
        self.strp(offsets.get_str_offset(base, index, format)?)
    }
}

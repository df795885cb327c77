//! Per-encoding attribute form layouts.
//!
//! The byte layout of most forms depends on the unit's byte order, 32/64-bit
//! DWARF format, address size and version. A [`FormTable`] captures those
//! layouts for one [`Encoding`]; tables are pure functions of their encoding
//! and are shared through [`FormTableCache`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::types::DwForm;
use crate::ParseError;

/// 32-bit or 64-bit DWARF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DwarfFormat {
    Dwarf32,
    Dwarf64,
}

impl DwarfFormat {
    /// Size of a section offset, in bytes.
    pub fn offset_size(self) -> u8 {
        match self {
            DwarfFormat::Dwarf32 => 4,
            DwarfFormat::Dwarf64 => 8,
        }
    }

    /// Size of the initial length field of a unit header, in bytes.
    pub fn initial_length_size(self) -> u8 {
        match self {
            DwarfFormat::Dwarf32 => 4,
            DwarfFormat::Dwarf64 => 12,
        }
    }

    /// 32 or 64.
    pub fn bits(self) -> u8 {
        match self {
            DwarfFormat::Dwarf32 => 32,
            DwarfFormat::Dwarf64 => 64,
        }
    }
}

/// Everything that changes the byte layout of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
    pub little_endian: bool,
    pub format: DwarfFormat,
    /// Target address size in bytes.
    pub address_size: u8,
    /// DWARF version, 2 to 5.
    pub version: u16,
}

/// Length prefix of a block form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    U8,
    U16,
    U32,
    Uleb,
}

/// Width of an integer-valued field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Fixed(u8),
    Uleb,
}

/// Section an offset form points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSection {
    /// `.debug_str`
    Str,
    /// `.debug_line_str`
    LineStr,
    /// The string section of a supplementary object file.
    SupStr,
    /// Any other section, chosen by the attribute (lines, ranges, locations...).
    Other,
}

/// Table an index form selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// `.debug_str_offsets`
    Str,
    /// `.debug_addr`
    Addr,
    /// `.debug_loclists` offsets array
    Loclist,
    /// `.debug_rnglists` offsets array
    Rnglist,
}

/// How a reference form finds its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Offset from the start of the referencing unit's header.
    UnitRelative,
    /// Offset from the start of `.debug_info`.
    SectionAbsolute,
    /// 8-byte type signature of a type unit.
    Signature,
    /// Offset into a supplementary object file.
    Supplementary,
}

/// How to decode the bytes of one form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRule {
    FixedWidth { bytes: u8, signed: bool },
    VarintU,
    VarintS,
    Block(LengthPrefix),
    /// A block with no prefix and a fixed size (`DW_FORM_data16`).
    FixedBlock { bytes: u8 },
    CString,
    SectionOffset { bytes: u8, target: TargetSection },
    Index { width: Width, kind: IndexKind },
    Reference { width: Width, kind: ReferenceKind },
    ZeroByteFlag,
    /// The real form follows as a ULEB128.
    Indirect,
    /// The value lives in the abbreviation declaration.
    ImplicitConst,
}

/// Decode rules for every known form under one encoding.
#[derive(Debug)]
pub struct FormTable {
    encoding: Encoding,
    rules: HashMap<DwForm, DecodeRule>,
}

impl FormTable {
    /// Build the table for an encoding. Performs no I/O.
    pub fn build(encoding: Encoding) -> Self {
        let rules = DwForm::ALL
            .iter()
            .filter_map(|&form| rule_for(form, encoding).map(|rule| (form, rule)))
            .collect();
        Self { encoding, rules }
    }

    /// The encoding this table was built for.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decode rule for a form.
    pub fn lookup(&self, form: DwForm) -> Result<DecodeRule, ParseError> {
        self.rules
            .get(&form)
            .copied()
            .ok_or(ParseError::UnknownForm(form.value() as u64))
    }
}

fn rule_for(form: DwForm, encoding: Encoding) -> Option<DecodeRule> {
    use DecodeRule::*;

    let offset = encoding.format.offset_size();
    let fixed = |bytes| FixedWidth {
        bytes,
        signed: false,
    };

    Some(match form {
        DwForm::Addr => fixed(encoding.address_size),

        DwForm::Block1 => Block(LengthPrefix::U8),
        DwForm::Block2 => Block(LengthPrefix::U16),
        DwForm::Block4 => Block(LengthPrefix::U32),
        DwForm::Block | DwForm::Exprloc => Block(LengthPrefix::Uleb),
        DwForm::Data16 => FixedBlock { bytes: 16 },

        // data<n> forms are treated as unsigned; their meaning depends on
        // the attribute.
        DwForm::Data1 | DwForm::Flag => fixed(1),
        DwForm::Data2 => fixed(2),
        DwForm::Data4 => fixed(4),
        DwForm::Data8 => fixed(8),
        DwForm::Sdata => VarintS,
        DwForm::Udata => VarintU,

        DwForm::String => CString,
        DwForm::Strp => SectionOffset {
            bytes: offset,
            target: TargetSection::Str,
        },
        DwForm::LineStrp => SectionOffset {
            bytes: offset,
            target: TargetSection::LineStr,
        },
        DwForm::StrpSup | DwForm::GnuStrpAlt => SectionOffset {
            bytes: offset,
            target: TargetSection::SupStr,
        },
        DwForm::SecOffset => SectionOffset {
            bytes: offset,
            target: TargetSection::Other,
        },

        DwForm::Strx | DwForm::GnuStrIndex => Index {
            width: Width::Uleb,
            kind: IndexKind::Str,
        },
        DwForm::Strx1 => Index {
            width: Width::Fixed(1),
            kind: IndexKind::Str,
        },
        DwForm::Strx2 => Index {
            width: Width::Fixed(2),
            kind: IndexKind::Str,
        },
        DwForm::Strx3 => Index {
            width: Width::Fixed(3),
            kind: IndexKind::Str,
        },
        DwForm::Strx4 => Index {
            width: Width::Fixed(4),
            kind: IndexKind::Str,
        },
        DwForm::Addrx | DwForm::GnuAddrIndex => Index {
            width: Width::Uleb,
            kind: IndexKind::Addr,
        },
        DwForm::Addrx1 => Index {
            width: Width::Fixed(1),
            kind: IndexKind::Addr,
        },
        DwForm::Addrx2 => Index {
            width: Width::Fixed(2),
            kind: IndexKind::Addr,
        },
        DwForm::Addrx3 => Index {
            width: Width::Fixed(3),
            kind: IndexKind::Addr,
        },
        DwForm::Addrx4 => Index {
            width: Width::Fixed(4),
            kind: IndexKind::Addr,
        },
        DwForm::Loclistx => Index {
            width: Width::Uleb,
            kind: IndexKind::Loclist,
        },
        DwForm::Rnglistx => Index {
            width: Width::Uleb,
            kind: IndexKind::Rnglist,
        },

        DwForm::Ref1 => Reference {
            width: Width::Fixed(1),
            kind: ReferenceKind::UnitRelative,
        },
        DwForm::Ref2 => Reference {
            width: Width::Fixed(2),
            kind: ReferenceKind::UnitRelative,
        },
        DwForm::Ref4 => Reference {
            width: Width::Fixed(4),
            kind: ReferenceKind::UnitRelative,
        },
        DwForm::Ref8 => Reference {
            width: Width::Fixed(8),
            kind: ReferenceKind::UnitRelative,
        },
        DwForm::RefUdata => Reference {
            width: Width::Uleb,
            kind: ReferenceKind::UnitRelative,
        },
        // Version 2 sized ref_addr like an address; later versions use an
        // offset.
        DwForm::RefAddr => Reference {
            width: Width::Fixed(if encoding.version <= 2 {
                encoding.address_size
            } else {
                offset
            }),
            kind: ReferenceKind::SectionAbsolute,
        },
        DwForm::RefSig8 => Reference {
            width: Width::Fixed(8),
            kind: ReferenceKind::Signature,
        },
        DwForm::RefSup4 => Reference {
            width: Width::Fixed(4),
            kind: ReferenceKind::Supplementary,
        },
        DwForm::RefSup8 => Reference {
            width: Width::Fixed(8),
            kind: ReferenceKind::Supplementary,
        },
        DwForm::GnuRefAlt => Reference {
            width: Width::Fixed(offset),
            kind: ReferenceKind::Supplementary,
        },

        DwForm::FlagPresent => ZeroByteFlag,
        DwForm::Indirect => Indirect,
        DwForm::ImplicitConst => ImplicitConst,

        DwForm::Unknown(_) => return None,
    })
}

/// Memoized form tables, one per distinct encoding.
#[derive(Debug, Default)]
pub struct FormTableCache {
    tables: HashMap<Encoding, Arc<FormTable>>,
}

impl FormTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the table for `encoding`, building it on first use.
    pub fn get_or_build(&mut self, encoding: Encoding) -> Arc<FormTable> {
        self.tables
            .entry(encoding)
            .or_insert_with(|| {
                debug!(?encoding, "building form table");
                Arc::new(FormTable::build(encoding))
            })
            .clone()
    }

    /// Number of distinct encodings seen so far.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(format: DwarfFormat, address_size: u8, version: u16) -> Encoding {
        Encoding {
            little_endian: true,
            format,
            address_size,
            version,
        }
    }

    #[test]
    fn test_offset_forms_follow_format() {
        let table32 = FormTable::build(encoding(DwarfFormat::Dwarf32, 8, 4));
        let table64 = FormTable::build(encoding(DwarfFormat::Dwarf64, 8, 4));
        assert_eq!(
            table32.lookup(DwForm::Strp).unwrap(),
            DecodeRule::SectionOffset {
                bytes: 4,
                target: TargetSection::Str
            }
        );
        assert_eq!(
            table64.lookup(DwForm::SecOffset).unwrap(),
            DecodeRule::SectionOffset {
                bytes: 8,
                target: TargetSection::Other
            }
        );
    }

    #[test]
    fn test_ref_addr_depends_on_version() {
        let v2 = FormTable::build(encoding(DwarfFormat::Dwarf32, 8, 2));
        let v3 = FormTable::build(encoding(DwarfFormat::Dwarf32, 8, 3));
        assert!(matches!(
            v2.lookup(DwForm::RefAddr).unwrap(),
            DecodeRule::Reference {
                width: Width::Fixed(8),
                ..
            }
        ));
        assert!(matches!(
            v3.lookup(DwForm::RefAddr).unwrap(),
            DecodeRule::Reference {
                width: Width::Fixed(4),
                ..
            }
        ));
    }

    #[test]
    fn test_address_size() {
        let table = FormTable::build(encoding(DwarfFormat::Dwarf32, 4, 4));
        assert_eq!(
            table.lookup(DwForm::Addr).unwrap(),
            DecodeRule::FixedWidth {
                bytes: 4,
                signed: false
            }
        );
    }

    #[test]
    fn test_every_known_form_has_a_rule() {
        let table = FormTable::build(encoding(DwarfFormat::Dwarf32, 8, 5));
        for &form in DwForm::ALL {
            assert!(table.lookup(form).is_ok(), "no rule for {form}");
        }
        assert_eq!(
            table.lookup(DwForm::Unknown(0x99)),
            Err(ParseError::UnknownForm(0x99))
        );
    }

    #[test]
    fn test_cache_shares_tables() {
        let mut cache = FormTableCache::new();
        let a = cache.get_or_build(encoding(DwarfFormat::Dwarf32, 8, 4));
        let b = cache.get_or_build(encoding(DwarfFormat::Dwarf32, 8, 4));
        let c = cache.get_or_build(encoding(DwarfFormat::Dwarf64, 8, 4));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }
}

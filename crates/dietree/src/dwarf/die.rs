//! DWARF Debug Information Entry (DIE) parsing.
//!
//! DIEs are the fundamental units of DWARF information. Each DIE describes
//! a programming language entity (function, variable, type, etc.). A DIE is
//! parsed on its own, at a byte offset; the tree links (`parent`,
//! `terminator`) are filled in later by the owning
//! [`CompileUnit`](super::CompileUnit) as traversal discovers them.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use tracing::trace;

use super::abbrev::{AbbreviationTable, AttributeSpec};
use super::form::{DecodeRule, Encoding, FormTable, IndexKind, LengthPrefix, TargetSection, Width};
use super::strings::{StringOffsets, StringSections};
use super::types::{DwAt, DwForm, DwTag};
use crate::section::Reader;
use crate::ParseError;

/// Maximum number of `DW_FORM_indirect` hops for one attribute.
pub const MAX_INDIRECTION: usize = 4;

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Unsigned constant, address, offset, index or reference.
    Unsigned(u64),
    /// Signed constant.
    Signed(i64),
    /// A flag (boolean).
    Flag(bool),
    /// A raw NUL-terminated byte string, terminator stripped.
    Bytes(Vec<u8>),
    /// A decoded string value.
    String(String),
    /// A block of bytes.
    Block(Vec<u8>),
}

impl AttributeValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            AttributeValue::Unsigned(v) => Some(v),
            AttributeValue::Signed(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AttributeValue::Signed(v) => Some(v),
            AttributeValue::Unsigned(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match *self {
            AttributeValue::Flag(v) => Some(v),
            _ => None,
        }
    }

    /// String content; raw byte strings are decoded lossily.
    pub fn as_str(&self) -> Option<Cow<'_, str>> {
        match self {
            AttributeValue::String(s) => Some(Cow::Borrowed(s.as_str())),
            AttributeValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Block(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Unsigned(v) => write!(f, "{v:#x}"),
            AttributeValue::Signed(v) => write!(f, "{v}"),
            AttributeValue::Flag(v) => write!(f, "{v}"),
            AttributeValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Block(b) => {
                f.write_str("[")?;
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A single attribute of a DIE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name.
    pub name: DwAt,
    /// The form the value was encoded in. For `DW_FORM_indirect` this is the
    /// form named in the entry, not `DW_FORM_indirect` itself.
    pub form: DwForm,
    /// The interpreted value (strings fetched, flags as booleans).
    pub value: AttributeValue,
    /// The value as encoded.
    pub raw_value: AttributeValue,
    /// Offset of the encoded value in .debug_info.
    pub offset: u64,
}

impl Attribute {
    /// Absolute .debug_info offset of the DIE this attribute refers to.
    ///
    /// Unit-relative forms are rebased on `unit_offset`.
    pub fn reference_offset(&self, unit_offset: u64) -> Result<u64, ParseError> {
        let raw = || {
            self.raw_value
                .as_u64()
                .ok_or(ParseError::InvalidValue("reference value is not an integer"))
        };
        match self.form {
            DwForm::Ref1 | DwForm::Ref2 | DwForm::Ref4 | DwForm::Ref8 | DwForm::RefUdata => unit_offset
                .checked_add(raw()?)
                .ok_or(ParseError::Overflow {
                    context: "unit-relative reference",
                }),
            DwForm::RefAddr => raw(),
            DwForm::RefSig8 | DwForm::RefSup4 | DwForm::RefSup8 | DwForm::GnuRefAlt => {
                Err(ParseError::UnsupportedReferenceKind { form: self.form })
            }
            form => Err(ParseError::NotAReferenceForm {
                name: self.name,
                form,
            }),
        }
    }
}

/// Handle to a DIE inside its unit's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DieId(pub(crate) usize);

impl DieId {
    /// Position in the unit's arena, in order of first parse.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A Debug Information Entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die {
    /// Offset of the abbreviation code in .debug_info.
    pub offset: u64,
    /// Bytes taken by the code and the attributes (children excluded).
    pub size: u64,
    /// The tag; `None` for a null entry.
    pub tag: Option<DwTag>,
    /// Whether this DIE has children.
    pub has_children: bool,
    /// The abbreviation code; 0 for a null entry.
    pub abbrev_code: u64,
    /// The attributes, in declaration order.
    pub attributes: IndexMap<DwAt, Attribute>,
    /// Offset of the owning unit's header.
    pub unit_offset: u64,
    pub(crate) parent: Option<DieId>,
    pub(crate) terminator: Option<DieId>,
}

impl Die {
    fn null(offset: u64, size: u64, unit_offset: u64) -> Self {
        Self {
            offset,
            size,
            tag: None,
            has_children: false,
            abbrev_code: 0,
            attributes: IndexMap::new(),
            unit_offset,
            parent: None,
            terminator: None,
        }
    }

    /// A null entry ends a list of siblings.
    pub fn is_null(&self) -> bool {
        self.tag.is_none()
    }

    /// Offset just past this entry's own bytes.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// The parent, if traversal has discovered it already.
    pub fn parent(&self) -> Option<DieId> {
        self.parent
    }

    /// The null entry closing the child list, once the children have been
    /// walked to the end.
    pub fn terminator(&self) -> Option<DieId> {
        self.terminator
    }

    pub fn attr(&self, name: DwAt) -> Option<&Attribute> {
        self.attributes.get(&name)
    }

    /// Like [`attr`](Self::attr), failing with `MissingAttribute`.
    pub fn require_attr(&self, name: DwAt) -> Result<&Attribute, ParseError> {
        self.attr(name).ok_or(ParseError::MissingAttribute { name })
    }

    /// The interpreted value of an attribute.
    pub fn attr_value(&self, name: DwAt) -> Option<&AttributeValue> {
        self.attr(name).map(|a| &a.value)
    }

    /// Get the name attribute as a string.
    pub fn name(&self) -> Option<Cow<'_, str>> {
        self.attr_value(DwAt::Name)?.as_str()
    }
}

impl fmt::Display for Die {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "DIE {tag}")?,
            None => f.write_str("DIE None")?,
        }
        writeln!(f, ", size={}, has_children={}", self.size, self.has_children)?;
        for attr in self.attributes.values() {
            writeln!(f, "    |{:<18}:  {}", attr.name, attr.value)?;
        }
        Ok(())
    }
}

/// Everything needed to parse the DIEs of one unit.
pub(crate) struct DieParser<'u, 'a> {
    /// .debug_info, cut at the end of the unit.
    pub data: &'a [u8],
    pub encoding: Encoding,
    pub forms: &'u FormTable,
    pub abbrevs: &'u AbbreviationTable,
    pub strings: &'u StringSections<'a>,
    pub unit_offset: u64,
    /// `DW_AT_str_offsets_base` of the unit's top DIE, once known.
    pub str_offsets_base: Option<u64>,
}

impl DieParser<'_, '_> {
    /// Parse the entry at `offset`. Children are not read.
    pub fn parse(&self, offset: u64) -> Result<Die, ParseError> {
        let mut reader = Reader::new(self.data, self.encoding.little_endian);
        reader.seek(offset);

        let abbrev_code = reader.read_uleb128()?;
        if abbrev_code == 0 {
            trace!(offset, "parsed null DIE");
            return Ok(Die::null(offset, reader.tell() - offset, self.unit_offset));
        }
        let abbrev = self.abbrevs.get(abbrev_code, offset)?;

        // Every raw value is read before any is translated: a strx attribute
        // may precede the DW_AT_str_offsets_base it depends on.
        let mut raw = Vec::with_capacity(abbrev.attributes.len());
        for spec in &abbrev.attributes {
            let attr_offset = reader.tell();
            let (form, value) = self.read_raw(&mut reader, spec)?;
            raw.push((spec.name, form, value, attr_offset));
        }
        let size = reader.tell() - offset;

        let str_offsets_base = raw
            .iter()
            .find(|(name, ..)| *name == DwAt::StrOffsetsBase)
            .and_then(|(_, _, value, _)| value.as_u64())
            .or(self.str_offsets_base)
            .unwrap_or_else(|| StringOffsets::header_size(self.encoding.format));

        let mut attributes = IndexMap::with_capacity(raw.len());
        for (name, form, raw_value, attr_offset) in raw {
            let value = self.translate(form, &raw_value, str_offsets_base)?;
            attributes.insert(
                name,
                Attribute {
                    name,
                    form,
                    value,
                    raw_value,
                    offset: attr_offset,
                },
            );
        }

        trace!(offset, code = abbrev_code, size, "parsed DIE");
        Ok(Die {
            offset,
            size,
            tag: Some(abbrev.tag),
            has_children: abbrev.has_children,
            abbrev_code,
            attributes,
            unit_offset: self.unit_offset,
            parent: None,
            terminator: None,
        })
    }

    /// Read the encoded value of one attribute, following `DW_FORM_indirect`.
    fn read_raw(
        &self,
        reader: &mut Reader<'_>,
        spec: &AttributeSpec,
    ) -> Result<(DwForm, AttributeValue), ParseError> {
        let mut form = spec.form;
        let mut depth = 0;
        loop {
            let value = match self.forms.lookup(form)? {
                DecodeRule::Indirect => {
                    depth += 1;
                    if depth > MAX_INDIRECTION {
                        return Err(ParseError::IndirectionTooDeep { depth });
                    }
                    let code = reader.read_uleb128()?;
                    form = u16::try_from(code)
                        .map(DwForm::from)
                        .map_err(|_| ParseError::UnknownForm(code))?;
                    // The constant lives in the abbreviation, which an
                    // indirect form never has.
                    if form == DwForm::ImplicitConst {
                        return Err(ParseError::InvalidValue(
                            "DW_FORM_indirect cannot name DW_FORM_implicit_const",
                        ));
                    }
                    continue;
                }
                DecodeRule::ImplicitConst => AttributeValue::Signed(spec.implicit_const.ok_or(
                    ParseError::InvalidValue("implicit_const without a constant"),
                )?),
                DecodeRule::FixedWidth { bytes, signed } => {
                    if signed {
                        AttributeValue::Signed(reader.read_int(bytes)?)
                    } else {
                        AttributeValue::Unsigned(reader.read_uint(bytes)?)
                    }
                }
                DecodeRule::VarintU => AttributeValue::Unsigned(reader.read_uleb128()?),
                DecodeRule::VarintS => AttributeValue::Signed(reader.read_sleb128()?),
                DecodeRule::Block(prefix) => {
                    let len = match prefix {
                        LengthPrefix::U8 => reader.read_u8()? as u64,
                        LengthPrefix::U16 => reader.read_u16()? as u64,
                        LengthPrefix::U32 => reader.read_u32()? as u64,
                        LengthPrefix::Uleb => reader.read_uleb128()?,
                    };
                    let len = usize::try_from(len).map_err(|_| ParseError::Overflow {
                        context: "block length",
                    })?;
                    AttributeValue::Block(reader.read_bytes(len, "attribute block")?.to_vec())
                }
                DecodeRule::FixedBlock { bytes } => {
                    AttributeValue::Block(reader.read_bytes(bytes as usize, "attribute block")?.to_vec())
                }
                DecodeRule::CString => AttributeValue::Bytes(reader.read_cstr()?.to_vec()),
                DecodeRule::SectionOffset { bytes, .. } => {
                    AttributeValue::Unsigned(reader.read_uint(bytes)?)
                }
                DecodeRule::Index { width, .. } | DecodeRule::Reference { width, .. } => {
                    AttributeValue::Unsigned(read_width(reader, width)?)
                }
                DecodeRule::ZeroByteFlag => AttributeValue::Flag(true),
            };
            return Ok((form, value));
        }
    }

    /// Turn an encoded value into its meaning.
    fn translate(
        &self,
        form: DwForm,
        raw: &AttributeValue,
        str_offsets_base: u64,
    ) -> Result<AttributeValue, ParseError> {
        let rule = self.forms.lookup(form)?;
        let value = match (rule, raw) {
            (DecodeRule::SectionOffset { target: TargetSection::Str, .. }, &AttributeValue::Unsigned(offset)) => {
                decoded(self.strings.strp(offset)?)
            }
            (
                DecodeRule::SectionOffset {
                    target: TargetSection::LineStr,
                    ..
                },
                &AttributeValue::Unsigned(offset),
            ) => decoded(self.strings.line_strp(offset)?),
            (
                DecodeRule::Index {
                    kind: IndexKind::Str,
                    ..
                },
                &AttributeValue::Unsigned(index),
            ) => decoded(
                self.strings
                    .strx(str_offsets_base, index, self.encoding.format)?,
            ),
            (DecodeRule::CString, AttributeValue::Bytes(bytes)) => decoded(bytes),
            (_, &AttributeValue::Unsigned(v)) if form == DwForm::Flag => AttributeValue::Flag(v != 0),
            _ => raw.clone(),
        };
        Ok(value)
    }
}

fn read_width(reader: &mut Reader<'_>, width: Width) -> Result<u64, ParseError> {
    match width {
        Width::Fixed(bytes) => reader.read_uint(bytes),
        Width::Uleb => reader.read_uleb128(),
    }
}

fn decoded(bytes: &[u8]) -> AttributeValue {
    AttributeValue::String(String::from_utf8_lossy(bytes).into_owned())
}

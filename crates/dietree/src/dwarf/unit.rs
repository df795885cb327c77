//! Compilation units and DIE tree reconstruction.
//!
//! A unit's DIEs are stored flattened in .debug_info, in preorder. There are
//! no child counts: a DIE with children is followed by its children and then
//! a null entry. `DW_AT_sibling`, when the producer emits it, lets a walk
//! skip a subtree without reading it.
//!
//! [`CompileUnit`] parses DIEs on demand and keeps every one it parsed in an
//! arena, keyed by offset. Tree links are recorded as traversal finds them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::abbrev::{AbbrevCache, AbbreviationTable};
use super::die::{Die, DieId, DieParser};
use super::form::{DwarfFormat, Encoding, FormTable};
use super::strings::StringSections;
use super::types::{DwAt, DwUt};
use crate::config::SiblingPolicy;
use crate::section::DebugSection;
use crate::ParseError;

/// Compilation unit header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnitHeader {
    /// Offset of the header in .debug_info.
    pub offset: u64,
    /// Length of the unit, not including the initial length field.
    pub unit_length: u64,
    /// 32-bit or 64-bit DWARF.
    pub format: DwarfFormat,
    /// DWARF version.
    pub version: u16,
    /// Unit type (DWARF 5 only).
    pub unit_type: Option<DwUt>,
    /// Offset into .debug_abbrev.
    pub debug_abbrev_offset: u64,
    /// Size of target addresses in bytes.
    pub address_size: u8,
    /// Split DWARF id (skeleton and split compile units).
    pub dwo_id: Option<u64>,
    /// Type signature (type units).
    pub type_signature: Option<u64>,
    /// Unit-relative offset of the type DIE (type units).
    pub type_offset: Option<u64>,
    /// Offset of the first DIE in .debug_info.
    pub die_offset: u64,
}

impl CompilationUnitHeader {
    /// Parse the header at `offset`.
    pub fn parse(
        section: &DebugSection<'_>,
        offset: u64,
        little_endian: bool,
    ) -> Result<Self, ParseError> {
        section.check_offset(offset)?;
        let mut reader = section.reader_at(offset, little_endian);

        let initial = reader.read_u32()?;
        let (format, unit_length) = match initial {
            0xffff_ffff => (DwarfFormat::Dwarf64, reader.read_u64()?),
            0xffff_fff0..=0xffff_fffe => {
                return Err(ParseError::InvalidValue("reserved initial length value"))
            }
            len => (DwarfFormat::Dwarf32, len as u64),
        };
        // Reject lengths that do not fit the address space.
        unit_length
            .checked_add(u64::from(format.initial_length_size()))
            .and_then(|size| offset.checked_add(size))
            .ok_or(ParseError::Overflow {
                context: "unit length",
            })?;

        let version = reader.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(ParseError::UnsupportedVersion {
                format: "DWARF",
                version: version as u32,
            });
        }

        let offset_size = format.offset_size();
        let mut header = CompilationUnitHeader {
            offset,
            unit_length,
            format,
            version,
            unit_type: None,
            debug_abbrev_offset: 0,
            address_size: 0,
            dwo_id: None,
            type_signature: None,
            type_offset: None,
            die_offset: 0,
        };

        if version >= 5 {
            let unit_type = DwUt::from(reader.read_u8()?);
            header.unit_type = Some(unit_type);
            header.address_size = reader.read_u8()?;
            header.debug_abbrev_offset = reader.read_uint(offset_size)?;
            match unit_type {
                DwUt::Skeleton | DwUt::SplitCompile => {
                    header.dwo_id = Some(reader.read_u64()?);
                }
                DwUt::Type | DwUt::SplitType => {
                    header.type_signature = Some(reader.read_u64()?);
                    header.type_offset = Some(reader.read_uint(offset_size)?);
                }
                _ => {}
            }
        } else {
            header.debug_abbrev_offset = reader.read_uint(offset_size)?;
            header.address_size = reader.read_u8()?;
        }
        header.die_offset = reader.tell();

        debug!(
            offset,
            version,
            bits = format.bits(),
            address_size = header.address_size,
            abbrev_offset = header.debug_abbrev_offset,
            "parsed unit header"
        );
        Ok(header)
    }

    /// Size of the whole unit, header included.
    pub fn size(&self) -> u64 {
        self.unit_length + u64::from(self.format.initial_length_size())
    }

    /// Offset just past the unit.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size()
    }
}

/// Result of inspecting a `DW_AT_sibling` attribute.
enum SiblingPointer {
    Absent,
    Valid(u64),
    /// Points into the DIE itself, backward, or out of the unit.
    Malformed(Option<u64>),
}

/// A compilation unit and every DIE parsed from it so far.
#[derive(Debug)]
pub struct CompileUnit<'a> {
    header: CompilationUnitHeader,
    debug_info: DebugSection<'a>,
    encoding: Encoding,
    forms: Arc<FormTable>,
    abbrev_cache: Rc<AbbrevCache<'a>>,
    abbrevs: Option<Arc<AbbreviationTable>>,
    strings: StringSections<'a>,
    sibling_policy: SiblingPolicy,
    dies: Vec<Die>,
    offsets: HashMap<u64, DieId>,
    top: Option<DieId>,
    str_offsets_base: Option<u64>,
}

impl<'a> CompileUnit<'a> {
    pub(crate) fn new(
        header: CompilationUnitHeader,
        debug_info: DebugSection<'a>,
        forms: Arc<FormTable>,
        abbrev_cache: Rc<AbbrevCache<'a>>,
        strings: StringSections<'a>,
        sibling_policy: SiblingPolicy,
    ) -> Self {
        let encoding = forms.encoding();
        Self {
            header,
            debug_info,
            encoding,
            forms,
            abbrev_cache,
            abbrevs: None,
            strings,
            sibling_policy,
            dies: Vec::new(),
            offsets: HashMap::new(),
            top: None,
            str_offsets_base: None,
        }
    }

    pub fn header(&self) -> &CompilationUnitHeader {
        &self.header
    }

    /// Offset of the unit header in .debug_info.
    pub fn offset(&self) -> u64 {
        self.header.offset
    }

    /// Offset of the top DIE in .debug_info.
    pub fn die_offset(&self) -> u64 {
        self.header.die_offset
    }

    pub fn dwarf_format(&self) -> DwarfFormat {
        self.header.format
    }

    pub fn version(&self) -> u16 {
        self.header.version
    }

    pub fn address_size(&self) -> u8 {
        self.header.address_size
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Size of the whole unit, header included.
    pub fn size(&self) -> u64 {
        self.header.size()
    }

    pub fn end_offset(&self) -> u64 {
        self.header.end_offset()
    }

    /// Whether a .debug_info offset falls inside this unit.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.header.offset && offset < self.end_offset()
    }

    /// The unit's abbreviation table, fetched from the shared cache on first
    /// use.
    pub fn abbrev_table(&mut self) -> Result<Arc<AbbreviationTable>, ParseError> {
        if let Some(table) = &self.abbrevs {
            return Ok(Arc::clone(table));
        }
        let table = self
            .abbrev_cache
            .get_or_parse(self.header.debug_abbrev_offset)?;
        self.abbrevs = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Access a parsed DIE.
    ///
    /// # Panics
    ///
    /// Panics if `id` was handed out by another unit.
    pub fn die(&self, id: DieId) -> &Die {
        &self.dies[id.0]
    }

    /// The DIE at `offset`, if it has been parsed already.
    pub fn cached_die_at(&self, offset: u64) -> Option<DieId> {
        self.offsets.get(&offset).copied()
    }

    /// Number of DIEs parsed so far.
    pub fn parsed_dies(&self) -> usize {
        self.dies.len()
    }

    /// The DIE at `offset`, parsing it if needed.
    ///
    /// Every offset is parsed at most once. A failed parse caches nothing.
    pub fn get_die_at(&mut self, offset: u64) -> Result<DieId, ParseError> {
        if let Some(&id) = self.offsets.get(&offset) {
            return Ok(id);
        }
        if offset < self.header.die_offset || offset >= self.end_offset() {
            return Err(ParseError::invalid_die_offset(offset, self.header.offset));
        }
        // strx forms anywhere in the unit resolve through the top DIE's
        // DW_AT_str_offsets_base.
        if offset != self.header.die_offset && self.top.is_none() {
            self.top_die()?;
        }

        let abbrevs = self.abbrev_table()?;
        let end = usize::try_from(self.end_offset())
            .unwrap_or(usize::MAX)
            .min(self.debug_info.data.len());
        let parser = DieParser {
            data: &self.debug_info.data[..end],
            encoding: self.encoding,
            forms: &self.forms,
            abbrevs: &abbrevs,
            strings: &self.strings,
            unit_offset: self.header.offset,
            str_offsets_base: self.str_offsets_base,
        };
        let die = parser.parse(offset)?;

        let id = DieId(self.dies.len());
        self.dies.push(die);
        self.offsets.insert(offset, id);
        Ok(id)
    }

    /// The unit's top DIE (usually `DW_TAG_compile_unit`).
    pub fn top_die(&mut self) -> Result<DieId, ParseError> {
        if let Some(top) = self.top {
            return Ok(top);
        }
        let top = self.get_die_at(self.header.die_offset)?;
        self.str_offsets_base = self.dies[top.0]
            .attr(DwAt::StrOffsetsBase)
            .and_then(|attr| attr.raw_value.as_u64());
        self.top = Some(top);
        Ok(top)
    }

    /// Resolve a .debug_info offset to a DIE of this unit.
    pub fn get_die_from_refaddr(&mut self, offset: u64) -> Result<DieId, ParseError> {
        self.get_die_at(offset)
    }

    /// The DIE referenced by attribute `name` of `id`, which must lie in
    /// this unit.
    pub fn die_from_attribute(&mut self, id: DieId, name: DwAt) -> Result<DieId, ParseError> {
        let target = self.dies[id.0]
            .require_attr(name)?
            .reference_offset(self.header.offset)?;
        self.get_die_from_refaddr(target)
    }

    /// A cursor over the children of `id`, null terminator excluded.
    pub fn children(&self, id: DieId) -> Children {
        let die = &self.dies[id.0];
        Children {
            parent: id,
            next_offset: die.has_children.then(|| die.end_offset()),
            last: None,
        }
    }

    /// Collect the children of `id`.
    pub fn child_ids(&mut self, id: DieId) -> Result<Vec<DieId>, ParseError> {
        let mut cursor = self.children(id);
        let mut ids = Vec::new();
        while let Some(child) = cursor.next(self)? {
            ids.push(child);
        }
        Ok(ids)
    }

    /// A preorder cursor over every DIE of the unit, null entries included.
    pub fn entries(&self) -> Entries {
        Entries {
            started: false,
            stack: Vec::new(),
        }
    }

    /// Collect every DIE of the unit in stream order.
    pub fn all_die_ids(&mut self) -> Result<Vec<DieId>, ParseError> {
        let mut cursor = self.entries();
        let mut ids = Vec::new();
        while let Some(id) = cursor.next(self)? {
            ids.push(id);
        }
        Ok(ids)
    }

    /// The parent of `id`; `None` for the top DIE.
    ///
    /// A DIE reached by offset has no parent link yet. It is found by
    /// descending from the top DIE, at each level into the last child that
    /// starts at or before the DIE. Every child scanned on the way gets its
    /// parent recorded, so asking again for a sibling costs nothing.
    pub fn parent(&mut self, id: DieId) -> Result<Option<DieId>, ParseError> {
        if let Some(parent) = self.dies[id.0].parent {
            return Ok(Some(parent));
        }
        let top = self.top_die()?;
        if id == top {
            return Ok(None);
        }

        let target = self.dies[id.0].offset;
        let mut search = top;
        while self.dies[search.0].offset < target {
            let mut closest = search;
            let mut cursor = self.children(search);
            while let Some(child) = cursor.next(self)? {
                if self.dies[child.0].offset <= target {
                    closest = child;
                }
            }
            if let Some(terminator) = self.dies[search.0].terminator {
                if self.dies[terminator.0].offset <= target {
                    closest = terminator;
                }
            }
            if closest == search {
                return Err(ParseError::invalid_die_offset(target, self.header.offset));
            }
            search = closest;
        }
        Ok(self.dies[id.0].parent)
    }

    /// The other children of `id`'s parent.
    pub fn siblings(&mut self, id: DieId) -> Result<Vec<DieId>, ParseError> {
        match self.parent(id)? {
            Some(parent) => {
                let mut ids = self.child_ids(parent)?;
                ids.retain(|&child| child != id);
                Ok(ids)
            }
            None => Ok(Vec::new()),
        }
    }

    /// `DW_AT_comp_dir` joined with `DW_AT_name`; either may be missing.
    pub fn full_path(&self, id: DieId) -> String {
        let die = &self.dies[id.0];
        let part = |name| {
            die.attr_value(name)
                .and_then(|value| value.as_str())
                .map(|s| s.into_owned())
                .unwrap_or_default()
        };
        PathBuf::from(part(DwAt::CompDir))
            .join(part(DwAt::Name))
            .to_string_lossy()
            .into_owned()
    }

    fn sibling_pointer(&self, id: DieId) -> SiblingPointer {
        let die = &self.dies[id.0];
        let Some(attr) = die.attr(DwAt::Sibling) else {
            return SiblingPointer::Absent;
        };
        match attr.reference_offset(self.header.offset) {
            Ok(target) if target > die.end_offset() && target < self.end_offset() => {
                SiblingPointer::Valid(target)
            }
            Ok(target) => SiblingPointer::Malformed(Some(target)),
            Err(_) => SiblingPointer::Malformed(None),
        }
    }

    /// Offset of the entry that follows `id` and its subtree.
    fn next_sibling_offset(&mut self, id: DieId) -> Result<u64, ParseError> {
        let die = &self.dies[id.0];
        if !die.has_children {
            return Ok(die.end_offset());
        }
        let die_offset = die.offset;

        match self.sibling_pointer(id) {
            SiblingPointer::Valid(target) => return Ok(target),
            SiblingPointer::Malformed(target) => match self.sibling_policy {
                SiblingPolicy::Strict => {
                    return Err(ParseError::invalid_die_offset(
                        target.unwrap_or(die_offset),
                        self.header.offset,
                    ))
                }
                SiblingPolicy::Lenient => {
                    warn!(
                        die = die_offset,
                        target,
                        unit = self.header.offset,
                        "ignoring malformed DW_AT_sibling"
                    );
                }
            },
            SiblingPointer::Absent => {}
        }

        let terminator = self.find_terminator(id)?;
        Ok(self.dies[terminator.0].end_offset())
    }

    /// Walk the subtree of `id` until its null terminator is known.
    ///
    /// Uses an explicit stack; nesting depth is bounded only by the data.
    fn find_terminator(&mut self, id: DieId) -> Result<DieId, ParseError> {
        if let Some(terminator) = self.dies[id.0].terminator {
            return Ok(terminator);
        }
        trace!(offset = self.dies[id.0].offset, "walking subtree to find its end");

        let mut stack = vec![self.children(id)];
        while let Some(cursor) = stack.last_mut() {
            match cursor.next(self)? {
                Some(child) => {
                    // Descend before the cursor advances past `child`, so the
                    // advance finds the terminator already recorded.
                    let die = &self.dies[child.0];
                    if die.has_children
                        && die.terminator.is_none()
                        && !matches!(self.sibling_pointer(child), SiblingPointer::Valid(_))
                    {
                        stack.push(self.children(child));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }

        self.dies[id.0].terminator.ok_or_else(|| {
            ParseError::invalid_die_offset(self.dies[id.0].offset, self.header.offset)
        })
    }
}

/// Cursor over the children of one DIE.
///
/// Obtained from [`CompileUnit::children`]; advance it with
/// [`next`](Children::next). Reaching the end records the parent's null
/// terminator.
#[derive(Debug, Clone)]
pub struct Children {
    parent: DieId,
    next_offset: Option<u64>,
    /// The child returned last; its successor is located lazily.
    last: Option<DieId>,
}

impl Children {
    /// The DIE whose children are being walked.
    pub fn parent(&self) -> DieId {
        self.parent
    }

    pub fn next(&mut self, unit: &mut CompileUnit<'_>) -> Result<Option<DieId>, ParseError> {
        if let Some(last) = self.last {
            self.next_offset = Some(unit.next_sibling_offset(last)?);
            self.last = None;
        }
        let Some(offset) = self.next_offset else {
            return Ok(None);
        };

        let child = unit.get_die_at(offset)?;
        unit.dies[child.0].parent = Some(self.parent);
        if unit.dies[child.0].is_null() {
            unit.dies[self.parent.0].terminator = Some(child);
            self.next_offset = None;
            return Ok(None);
        }
        self.last = Some(child);
        Ok(Some(child))
    }
}

/// Preorder cursor over a whole unit, null entries included.
#[derive(Debug, Clone)]
pub struct Entries {
    started: bool,
    stack: Vec<Children>,
}

impl Entries {
    pub fn next(&mut self, unit: &mut CompileUnit<'_>) -> Result<Option<DieId>, ParseError> {
        if !self.started {
            let top = unit.top_die()?;
            self.started = true;
            if unit.dies[top.0].has_children {
                self.stack.push(unit.children(top));
            }
            return Ok(Some(top));
        }

        let Some(cursor) = self.stack.last_mut() else {
            return Ok(None);
        };
        match cursor.next(unit)? {
            Some(child) => {
                if unit.dies[child.0].has_children {
                    self.stack.push(unit.children(child));
                }
                Ok(Some(child))
            }
            None => {
                let parent = cursor.parent;
                self.stack.pop();
                Ok(unit.dies[parent.0].terminator)
            }
        }
    }
}

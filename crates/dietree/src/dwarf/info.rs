//! The .debug_info section as a whole.
//!
//! [`DebugInfo`] owns every [`CompileUnit`] it has parsed, ordered by header
//! offset, and the caches the units share: abbreviation tables by
//! .debug_abbrev offset and form tables by [`Encoding`].

use std::rc::Rc;
use std::sync::Arc;

use super::abbrev::{AbbrevCache, AbbreviationTable};
use super::die::DieId;
use super::form::{Encoding, FormTableCache};
use super::strings::{StringOffsets, StringSections, StringTable};
use super::types::DwAt;
use super::unit::{CompilationUnitHeader, CompileUnit};
use crate::config::DwarfConfig;
use crate::section::DebugSection;
use crate::ParseError;

/// A DIE anywhere in .debug_info: its unit's header offset and its handle in
/// that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DieRef {
    pub unit: u64,
    pub die: DieId,
}

/// Parsed debug information.
#[derive(Debug)]
pub struct DebugInfo<'a> {
    config: DwarfConfig,
    debug_info: DebugSection<'a>,
    strings: StringSections<'a>,
    abbrev_cache: Rc<AbbrevCache<'a>>,
    form_tables: FormTableCache,
    /// Sorted by header offset.
    units: Vec<CompileUnit<'a>>,
}

impl<'a> DebugInfo<'a> {
    /// Create a context over .debug_info and .debug_abbrev. Nothing is parsed
    /// until a unit is requested.
    pub fn new(
        config: DwarfConfig,
        debug_info: DebugSection<'a>,
        debug_abbrev: DebugSection<'a>,
    ) -> Self {
        let abbrev_cache = Rc::new(AbbrevCache::new(debug_abbrev, config.little_endian));
        Self {
            config,
            debug_info,
            strings: StringSections::default(),
            abbrev_cache,
            form_tables: FormTableCache::new(),
            units: Vec::new(),
        }
    }

    /// Supply .debug_str.
    pub fn with_debug_str(mut self, section: DebugSection<'a>) -> Self {
        self.strings.debug_str = Some(StringTable::new(section));
        self
    }

    /// Supply .debug_line_str.
    pub fn with_debug_line_str(mut self, section: DebugSection<'a>) -> Self {
        self.strings.debug_line_str = Some(StringTable::new(section));
        self
    }

    /// Supply .debug_str_offsets.
    pub fn with_debug_str_offsets(mut self, section: DebugSection<'a>) -> Self {
        self.strings.debug_str_offsets =
            Some(StringOffsets::new(section, self.config.little_endian));
        self
    }

    pub fn config(&self) -> &DwarfConfig {
        &self.config
    }

    /// Whether .debug_info has any content.
    pub fn has_debug_info(&self) -> bool {
        !self.debug_info.data.is_empty()
    }

    /// The abbreviation table at `offset` in .debug_abbrev.
    pub fn get_abbrev_table(&self, offset: u64) -> Result<Arc<AbbreviationTable>, ParseError> {
        self.abbrev_cache.get_or_parse(offset)
    }

    /// Number of distinct abbreviation tables parsed so far.
    pub fn abbrev_tables_parsed(&self) -> usize {
        self.abbrev_cache.len()
    }

    /// Number of distinct form tables built so far.
    pub fn form_tables_built(&self) -> usize {
        self.form_tables.len()
    }

    /// Header offsets of the units parsed so far, ascending.
    pub fn cached_unit_offsets(&self) -> Vec<u64> {
        self.units.iter().map(CompileUnit::offset).collect()
    }

    /// The unit whose header starts at `offset`.
    pub fn get_cu_at(&mut self, offset: u64) -> Result<&mut CompileUnit<'a>, ParseError> {
        let index = self.unit_index_at(offset)?;
        Ok(&mut self.units[index])
    }

    /// The unit whose byte range contains `offset`.
    pub fn get_cu_containing(&mut self, offset: u64) -> Result<&mut CompileUnit<'a>, ParseError> {
        let index = self.unit_index_containing(offset)?;
        Ok(&mut self.units[index])
    }

    /// A cursor over every unit in section order.
    pub fn units(&self) -> Units {
        Units { next_offset: 0 }
    }

    /// Header offsets of every unit in the section.
    pub fn unit_offsets(&mut self) -> Result<Vec<u64>, ParseError> {
        let mut cursor = self.units();
        let mut offsets = Vec::new();
        while let Some(unit) = cursor.next(self)? {
            offsets.push(unit.offset());
        }
        Ok(offsets)
    }

    /// Resolve a .debug_info offset to a DIE, in whichever unit holds it.
    pub fn get_die_from_refaddr(&mut self, offset: u64) -> Result<DieRef, ParseError> {
        let index = self.unit_index_containing(offset)?;
        let unit = &mut self.units[index];
        let die = unit.get_die_from_refaddr(offset)?;
        Ok(DieRef {
            unit: unit.offset(),
            die,
        })
    }

    /// The DIE referenced by attribute `name` of `die`. Section-absolute
    /// references may land in another unit.
    pub fn die_from_attribute(&mut self, die: DieRef, name: DwAt) -> Result<DieRef, ParseError> {
        let index = self.unit_index_at(die.unit)?;
        let unit = &mut self.units[index];
        let target = unit
            .die(die.die)
            .require_attr(name)?
            .reference_offset(die.unit)?;
        if unit.contains(target) {
            let id = unit.get_die_at(target)?;
            return Ok(DieRef {
                unit: die.unit,
                die: id,
            });
        }
        self.get_die_from_refaddr(target)
    }

    fn unit_index_at(&mut self, offset: u64) -> Result<usize, ParseError> {
        let index = self.units.partition_point(|unit| unit.offset() < offset);
        if self.units.get(index).is_some_and(|unit| unit.offset() == offset) {
            return Ok(index);
        }

        let header =
            CompilationUnitHeader::parse(&self.debug_info, offset, self.config.little_endian)?;
        let encoding = Encoding {
            little_endian: self.config.little_endian,
            format: header.format,
            address_size: header.address_size,
            version: header.version,
        };
        let unit = CompileUnit::new(
            header,
            self.debug_info,
            self.form_tables.get_or_build(encoding),
            Rc::clone(&self.abbrev_cache),
            self.strings,
            self.config.sibling_policy,
        );
        self.units.insert(index, unit);
        Ok(index)
    }

    fn unit_index_containing(&mut self, offset: u64) -> Result<usize, ParseError> {
        // Start from the closest known unit at or before `offset`.
        let known = self.units.partition_point(|unit| unit.offset() <= offset);
        let mut next = match known.checked_sub(1) {
            Some(index) if self.units[index].contains(offset) => return Ok(index),
            Some(index) => self.units[index].end_offset(),
            None => 0,
        };

        while next <= offset && next < self.debug_info.size() {
            let index = self.unit_index_at(next)?;
            if self.units[index].contains(offset) {
                return Ok(index);
            }
            next = self.units[index].end_offset();
        }
        Err(ParseError::NoContainingUnit { offset })
    }
}

/// Cursor over the units of a [`DebugInfo`], in section order.
#[derive(Debug, Clone)]
pub struct Units {
    next_offset: u64,
}

impl Units {
    pub fn next<'i, 'a>(
        &mut self,
        info: &'i mut DebugInfo<'a>,
    ) -> Result<Option<&'i mut CompileUnit<'a>>, ParseError> {
        if self.next_offset >= info.debug_info.size() {
            return Ok(None);
        }
        let index = info.unit_index_at(self.next_offset)?;
        self.next_offset = info.units[index].end_offset();
        Ok(Some(&mut info.units[index]))
    }
}

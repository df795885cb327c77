//! DWARF abbreviation table parsing (.debug_abbrev).
//!
//! The abbreviation table defines the structure of DIEs (Debug Information Entries).
//! Each abbreviation specifies a tag and a list of attribute specifications.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::types::{DwAt, DwForm, DwTag};
use crate::section::{DebugSection, Reader};
use crate::ParseError;

/// An attribute specification in an abbreviation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    /// The attribute name (DW_AT_*).
    pub name: DwAt,
    /// The attribute form (DW_FORM_*).
    pub form: DwForm,
    /// Implicit constant value (for DW_FORM_implicit_const).
    pub implicit_const: Option<i64>,
}

/// An abbreviation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    /// The abbreviation code. Never 0.
    pub code: u64,
    /// The tag for this abbreviation (DW_TAG_*).
    pub tag: DwTag,
    /// Whether DIEs with this abbreviation have children.
    pub has_children: bool,
    /// The attribute specifications, in declaration order.
    pub attributes: Vec<AttributeSpec>,
}

/// A table of abbreviations.
#[derive(Debug, Default)]
pub struct AbbreviationTable {
    /// Offset of the table in .debug_abbrev.
    pub offset: u64,
    /// Map from abbreviation code to abbreviation.
    pub entries: HashMap<u64, Abbreviation>,
}

impl AbbreviationTable {
    /// Parse the abbreviation table starting at `offset` in .debug_abbrev.
    ///
    /// The whole table is read, up to its terminating zero code. A code that
    /// appears twice keeps its last declaration.
    pub fn parse(reader: &mut Reader<'_>, offset: u64) -> Result<Self, ParseError> {
        let mut table = AbbreviationTable {
            offset,
            entries: HashMap::new(),
        };
        reader.seek(offset);

        loop {
            // Code 0 marks end of abbreviation table
            let code = reader.read_uleb128()?;
            if code == 0 {
                break;
            }

            let tag = DwTag::from(narrow(reader.read_uleb128()?, "abbreviation tag")?);
            let has_children = reader.read_u8()? != 0;

            let mut attributes = Vec::new();
            loop {
                let name_value = reader.read_uleb128()?;
                let form_value = reader.read_uleb128()?;

                // (0, 0) marks end of attribute list
                if name_value == 0 && form_value == 0 {
                    break;
                }

                let name = DwAt::from(narrow(name_value, "attribute name")?);
                let form = DwForm::from(narrow(form_value, "attribute form")?);

                // Handle implicit constant (DWARF 5)
                let implicit_const = if matches!(form, DwForm::ImplicitConst) {
                    Some(reader.read_sleb128()?)
                } else {
                    None
                };

                attributes.push(AttributeSpec {
                    name,
                    form,
                    implicit_const,
                });
            }

            table.entries.insert(
                code,
                Abbreviation {
                    code,
                    tag,
                    has_children,
                    attributes,
                },
            );
        }

        debug!(
            offset,
            declarations = table.entries.len(),
            "parsed abbreviation table"
        );
        Ok(table)
    }

    /// Get an abbreviation by code.
    ///
    /// `die_offset` only feeds the error when the code has no declaration.
    pub fn get(&self, code: u64, die_offset: u64) -> Result<&Abbreviation, ParseError> {
        self.entries
            .get(&code)
            .ok_or(ParseError::UnknownAbbrevCode {
                code,
                offset: die_offset,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn narrow(value: u64, context: &'static str) -> Result<u16, ParseError> {
    u16::try_from(value).map_err(|_| ParseError::Overflow { context })
}

/// Abbreviation tables keyed by their .debug_abbrev offset.
///
/// Units that declare the same `debug_abbrev_offset` share one table. The
/// cache is handed to every unit of a context, so lookups go through a
/// `RefCell`; a table is inserted only after it parsed successfully.
#[derive(Debug)]
pub struct AbbrevCache<'a> {
    section: DebugSection<'a>,
    little_endian: bool,
    tables: RefCell<HashMap<u64, Arc<AbbreviationTable>>>,
}

impl<'a> AbbrevCache<'a> {
    pub fn new(section: DebugSection<'a>, little_endian: bool) -> Self {
        Self {
            section,
            little_endian,
            tables: RefCell::new(HashMap::new()),
        }
    }

    /// Return the table at `offset`, parsing it on first use.
    pub fn get_or_parse(&self, offset: u64) -> Result<Arc<AbbreviationTable>, ParseError> {
        if let Some(table) = self.tables.borrow().get(&offset) {
            return Ok(Arc::clone(table));
        }

        self.section.check_offset(offset)?;
        let mut reader = self.section.reader_at(offset, self.little_endian);
        let table = Arc::new(AbbreviationTable::parse(&mut reader, offset)?);
        self.tables.borrow_mut().insert(offset, Arc::clone(&table));
        Ok(table)
    }

    /// Number of tables parsed so far.
    pub fn len(&self) -> usize {
        self.tables.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.borrow().is_empty()
    }
}

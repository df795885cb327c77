//! Raw section access.
//!
//! The decoder never looks at container structure (ELF section headers and
//! the like). It is handed already-resolved byte ranges, one per DWARF
//! section, and reads them through a [`Reader`] cursor.

use crate::dwarf::{decode_sleb128, decode_uleb128};
use crate::ParseError;

/// A DWARF section handed over by the object-file layer.
#[derive(Debug, Clone, Copy)]
pub struct DebugSection<'a> {
    /// Section name in the container file (for messages only).
    pub name: &'static str,
    /// Raw section contents.
    pub data: &'a [u8],
    /// Offset of the section within its container file.
    pub global_offset: u64,
    /// Virtual address of the section data.
    pub address: u64,
}

impl<'a> DebugSection<'a> {
    /// Create a section descriptor with no file placement information.
    pub fn new(name: &'static str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            global_offset: 0,
            address: 0,
        }
    }

    /// Set the placement of the section within its container file.
    pub fn with_placement(mut self, global_offset: u64, address: u64) -> Self {
        self.global_offset = global_offset;
        self.address = address;
        self
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Create a reader positioned at `offset`.
    pub fn reader_at(&self, offset: u64, little_endian: bool) -> Reader<'a> {
        let mut reader = Reader::new(self.data, little_endian);
        reader.seek(offset);
        reader
    }

    /// Fail with `OffsetOutOfRange` unless `offset` lies inside the section.
    pub fn check_offset(&self, offset: u64) -> Result<(), ParseError> {
        if offset < self.size() {
            Ok(())
        } else {
            Err(ParseError::OffsetOutOfRange {
                section: self.name,
                offset,
                size: self.size(),
            })
        }
    }
}

/// A cursor over section bytes.
///
/// Offsets are absolute within the section. Readers are cheap to create, so
/// every parse gets its own and no two components ever share a position.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> Reader<'a> {
    /// Create a reader at the start of `data`.
    pub fn new(data: &'a [u8], little_endian: bool) -> Self {
        Self {
            data,
            offset: 0,
            little_endian,
        }
    }

    /// Move to an absolute offset. Seeking past the end is allowed; the next
    /// read fails.
    pub fn seek(&mut self, offset: u64) {
        self.offset = usize::try_from(offset).unwrap_or(usize::MAX);
    }

    /// Current absolute offset.
    pub fn tell(&self) -> u64 {
        self.offset as u64
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Read `len` bytes at `offset` without moving the cursor.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<&'a [u8], ParseError> {
        let start = usize::try_from(offset)
            .map_err(|_| ParseError::Overflow { context: "read offset" })?;
        let end = start
            .checked_add(len)
            .ok_or(ParseError::Overflow { context: "read length" })?;
        if end > self.data.len() {
            return Err(ParseError::truncated(end, self.data.len(), "byte range"));
        }
        Ok(&self.data[start..end])
    }

    /// Read `len` bytes and advance.
    pub fn read_bytes(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], ParseError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(ParseError::Overflow { context })?;
        if end > self.data.len() {
            return Err(ParseError::truncated(end, self.data.len(), context));
        }
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2, "u16")?;
        let raw = [b[0], b[1]];
        Ok(if self.little_endian {
            u16::from_le_bytes(raw)
        } else {
            u16::from_be_bytes(raw)
        })
    }

    /// Read a 3-byte unsigned integer (`DW_FORM_strx3` / `DW_FORM_addrx3`).
    pub fn read_u24(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(3, "u24")?;
        let (b0, b1, b2) = (b[0] as u32, b[1] as u32, b[2] as u32);
        Ok(if self.little_endian {
            b0 | (b1 << 8) | (b2 << 16)
        } else {
            (b0 << 16) | (b1 << 8) | b2
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4, "u32")?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    pub fn read_u64(&mut self) -> Result<u64, ParseError> {
        let b = self.read_bytes(8, "u64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(if self.little_endian {
            u64::from_le_bytes(raw)
        } else {
            u64::from_be_bytes(raw)
        })
    }

    /// Read an unsigned integer of `width` bytes (1, 2, 3, 4 or 8).
    pub fn read_uint(&mut self, width: u8) -> Result<u64, ParseError> {
        match width {
            1 => Ok(self.read_u8()? as u64),
            2 => Ok(self.read_u16()? as u64),
            3 => Ok(self.read_u24()? as u64),
            4 => Ok(self.read_u32()? as u64),
            8 => self.read_u64(),
            _ => Err(ParseError::InvalidValue("unsupported integer width")),
        }
    }

    /// Read a two's complement integer of `width` bytes, sign-extended.
    pub fn read_int(&mut self, width: u8) -> Result<i64, ParseError> {
        let raw = self.read_uint(width)?;
        let bits = u32::from(width) * 8;
        if bits >= 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn read_uleb128(&mut self) -> Result<u64, ParseError> {
        let (value, len) = decode_uleb128(&self.data[self.offset.min(self.data.len())..])?;
        self.offset += len;
        Ok(value)
    }

    pub fn read_sleb128(&mut self) -> Result<i64, ParseError> {
        let (value, len) = decode_sleb128(&self.data[self.offset.min(self.data.len())..])?;
        self.offset += len;
        Ok(value)
    }

    /// Read a NUL-terminated byte string. The terminator is consumed but not
    /// returned.
    pub fn read_cstr(&mut self) -> Result<&'a [u8], ParseError> {
        let start = self.offset.min(self.data.len());
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                ParseError::truncated(self.data.len() + 1, self.data.len(), "null-terminated string")
            })?;
        let bytes = &self.data[start..start + len];
        self.offset = start + len + 1;
        Ok(bytes)
    }
}

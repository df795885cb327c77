//! Builds small .debug_info / .debug_abbrev images from a tree description.

#![allow(dead_code)]

use std::collections::HashMap;

use dietree::dwarf::{DebugInfo, DwTag};
use dietree::{DebugSection, DwarfConfig, SiblingPolicy};

/// One entry of a synthetic tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub tag: DwTag,
    pub name: Option<String>,
    pub has_children: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn leaf(tag: DwTag, name: &str) -> Self {
        Self {
            tag,
            name: Some(name.to_string()),
            has_children: false,
            children: Vec::new(),
        }
    }

    /// A DIE flagged as having children; `children` may be empty, in which
    /// case only the null terminator follows it.
    pub fn parent(tag: DwTag, name: Option<&str>, children: Vec<Node>) -> Self {
        Self {
            tag,
            name: name.map(str::to_string),
            has_children: true,
            children,
        }
    }
}

/// Unit encoding of a synthetic image.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub version: u16,
    pub dwarf64: bool,
    pub little_endian: bool,
    /// Emit `DW_AT_sibling` (ref4) on every DIE with children. Without it,
    /// those DIEs carry a 4-byte `DW_AT_byte_size` instead.
    pub siblings: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            version: 4,
            dwarf64: false,
            little_endian: true,
            siblings: false,
        }
    }
}

pub struct Image {
    pub info: Vec<u8>,
    pub abbrev: Vec<u8>,
}

impl Image {
    pub fn context(&self, layout: Layout) -> DebugInfo<'_> {
        self.context_with(layout, SiblingPolicy::Strict)
    }

    pub fn context_with(&self, layout: Layout, policy: SiblingPolicy) -> DebugInfo<'_> {
        DebugInfo::new(
            DwarfConfig::default()
                .with_little_endian(layout.little_endian)
                .with_sibling_policy(policy),
            DebugSection::new(".debug_info", &self.info),
            DebugSection::new(".debug_abbrev", &self.abbrev),
        )
    }
}

struct Writer {
    buf: Vec<u8>,
    little_endian: bool,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        let bytes = if self.little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u64(&mut self, v: u64) {
        let bytes = if self.little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn uleb(&mut self, v: u64) {
        self.buf.extend(dietree::dwarf::encode_uleb128(v));
    }

    fn patch_u32(&mut self, pos: usize, v: u32) {
        let bytes = if self.little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        self.buf[pos..pos + 4].copy_from_slice(&bytes);
    }

    fn patch_u64(&mut self, pos: usize, v: u64) {
        let bytes = if self.little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        self.buf[pos..pos + 8].copy_from_slice(&bytes);
    }
}

#[derive(Default)]
struct Abbrevs {
    codes: HashMap<(u16, bool, bool, bool), u64>,
    bytes: Vec<u8>,
}

impl Abbrevs {
    fn code(&mut self, tag: DwTag, has_children: bool, named: bool, sibling: bool) -> u64 {
        let next = self.codes.len() as u64 + 1;
        let key = (tag.value(), has_children, named, sibling);
        if let Some(&code) = self.codes.get(&key) {
            return code;
        }
        self.codes.insert(key, next);
        self.bytes.extend(dietree::dwarf::encode_uleb128(next));
        self.bytes.extend(dietree::dwarf::encode_uleb128(tag.value() as u64));
        self.bytes.push(has_children as u8);
        if sibling {
            self.bytes.extend_from_slice(&[0x01, 0x13]); // DW_AT_sibling, DW_FORM_ref4
        } else if has_children {
            // Same width as the sibling pointer, so both layouts share offsets.
            self.bytes.extend_from_slice(&[0x0b, 0x06]); // DW_AT_byte_size, DW_FORM_data4
        }
        if named {
            self.bytes.extend_from_slice(&[0x03, 0x08]); // DW_AT_name, DW_FORM_string
        }
        self.bytes.extend_from_slice(&[0x00, 0x00]);
        next
    }
}

/// Encode one unit per top-level node; all units share one abbreviation
/// table at offset 0.
pub fn build(units: &[Node], layout: Layout) -> Image {
    let mut w = Writer {
        buf: Vec::new(),
        little_endian: layout.little_endian,
    };
    let mut abbrevs = Abbrevs::default();

    for top in units {
        let unit_offset = w.buf.len();
        let length_pos = if layout.dwarf64 {
            w.u32(0xffff_ffff);
            let pos = w.buf.len();
            w.u64(0);
            pos
        } else {
            let pos = w.buf.len();
            w.u32(0);
            pos
        };
        let after_length = w.buf.len();

        w.u16(layout.version);
        if layout.version >= 5 {
            w.u8(0x01); // DW_UT_compile
            w.u8(8);
            write_offset(&mut w, layout, 0);
        } else {
            write_offset(&mut w, layout, 0);
            w.u8(8);
        }

        write_node(&mut w, &mut abbrevs, top, unit_offset, layout);

        let length = (w.buf.len() - after_length) as u64;
        if layout.dwarf64 {
            w.patch_u64(length_pos, length);
        } else {
            w.patch_u32(length_pos, length as u32);
        }
    }

    abbrevs.bytes.push(0x00);
    Image {
        info: w.buf,
        abbrev: abbrevs.bytes,
    }
}

fn write_offset(w: &mut Writer, layout: Layout, v: u64) {
    if layout.dwarf64 {
        w.u64(v);
    } else {
        w.u32(v as u32);
    }
}

fn write_node(w: &mut Writer, abbrevs: &mut Abbrevs, node: &Node, unit_offset: usize, layout: Layout) {
    let sibling = layout.siblings && node.has_children;
    let code = abbrevs.code(node.tag, node.has_children, node.name.is_some(), sibling);
    w.uleb(code);

    let reserved = w.buf.len();
    if node.has_children {
        w.u32(0);
    }
    if let Some(name) = &node.name {
        w.buf.extend_from_slice(name.as_bytes());
        w.u8(0);
    }
    if node.has_children {
        for child in &node.children {
            write_node(w, abbrevs, child, unit_offset, layout);
        }
        w.u8(0);
    }
    if sibling {
        let target = (w.buf.len() - unit_offset) as u32;
        w.patch_u32(reserved, target);
    }
}

/// A unit exercising leaves, nested scopes and childless parents.
pub fn sample_tree(name: &str) -> Node {
    Node::parent(
        DwTag::CompileUnit,
        Some(name),
        vec![
            Node::leaf(DwTag::BaseType, "int"),
            Node::parent(
                DwTag::StructureType,
                Some("point"),
                vec![Node::leaf(DwTag::Member, "x"), Node::leaf(DwTag::Member, "y")],
            ),
            Node::parent(
                DwTag::Subprogram,
                Some("main"),
                vec![
                    Node::leaf(DwTag::FormalParameter, "argc"),
                    Node::parent(
                        DwTag::LexicalBlock,
                        None,
                        vec![
                            Node::leaf(DwTag::Variable, "i"),
                            Node::parent(DwTag::LexicalBlock, None, vec![]),
                        ],
                    ),
                    Node::leaf(DwTag::Variable, "local"),
                ],
            ),
            Node::parent(DwTag::Namespace, Some("empty"), vec![]),
        ],
    )
}

/// A chain of lexical blocks `depth` levels deep under a compile unit.
pub fn deep_tree(depth: usize) -> Node {
    let mut node = Node::leaf(DwTag::Variable, "innermost");
    for _ in 0..depth {
        node = Node::parent(DwTag::LexicalBlock, None, vec![node]);
    }
    Node::parent(DwTag::CompileUnit, Some("deep.c"), vec![node])
}

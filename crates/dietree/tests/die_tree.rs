//! Tree reconstruction over synthetic units.

mod common;

use common::{build, deep_tree, sample_tree, Layout};
use dietree::dwarf::{AttributeValue, CompileUnit, DebugInfo, DwAt, DwTag};
use dietree::{DebugSection, DieId, DieRef, DwarfConfig, ParseError, SiblingPolicy};

fn layouts() -> Vec<Layout> {
    let mut out = Vec::new();
    for version in [2, 4, 5] {
        for dwarf64 in [false, true] {
            for little_endian in [true, false] {
                out.push(Layout {
                    version,
                    dwarf64,
                    little_endian,
                    siblings: false,
                });
            }
        }
    }
    out
}

/// (offset, tag, size) of every entry in stream order.
fn summary(unit: &mut CompileUnit<'_>) -> Vec<(u64, Option<DwTag>, u64)> {
    unit.all_die_ids()
        .unwrap()
        .into_iter()
        .map(|id| {
            let die = unit.die(id);
            (die.offset, die.tag, die.size)
        })
        .collect()
}

fn name(unit: &CompileUnit<'_>, id: DieId) -> Option<String> {
    unit.die(id).name().map(|n| n.into_owned())
}

#[test]
fn test_sibling_pointers_do_not_change_the_tree() {
    for layout in layouts() {
        let units = [sample_tree("a.c"), sample_tree("b.c")];
        let plain = build(&units, layout);
        let linked = build(&units, Layout { siblings: true, ..layout });
        assert_eq!(plain.info.len(), linked.info.len());

        let mut plain_ctx = plain.context(layout);
        let mut linked_ctx = linked.context(layout);
        let offsets = plain_ctx.unit_offsets().unwrap();
        assert_eq!(offsets.len(), 2);
        assert_eq!(linked_ctx.unit_offsets().unwrap(), offsets);

        for offset in offsets {
            let expected = summary(plain_ctx.get_cu_at(offset).unwrap());
            let actual = summary(linked_ctx.get_cu_at(offset).unwrap());
            assert_eq!(expected, actual, "{layout:?}");
        }
    }
}

#[test]
fn test_sibling_fast_path_agrees_with_full_walk() {
    let layout = Layout {
        siblings: true,
        ..Layout::default()
    };
    let image = build(&[sample_tree("a.c")], layout);

    let mut fast = image.context(layout);
    let unit = fast.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    let children = unit.child_ids(top).unwrap();
    let fast_offsets: Vec<_> = children.iter().map(|&id| unit.die(id).offset).collect();
    // Only the top DIE, its children and its terminator were read.
    assert_eq!(unit.parsed_dies(), children.len() + 2);

    let mut slow = image.context(layout);
    let unit = slow.get_cu_at(0).unwrap();
    let total = unit.all_die_ids().unwrap().len();
    let top = unit.top_die().unwrap();
    let children = unit.child_ids(top).unwrap();
    let slow_offsets: Vec<_> = children.iter().map(|&id| unit.die(id).offset).collect();
    assert_eq!(fast_offsets, slow_offsets);
    assert_eq!(unit.parsed_dies(), total);
}

#[test]
fn test_fast_path_skips_subtrees() {
    #[rustfmt::skip]
    let abbrev = [
        0x01, 0x11, 0x01, 0x00, 0x00,             // 1: compile_unit
        0x02, 0x13, 0x01, 0x01, 0x13, 0x00, 0x00, // 2: structure_type, DW_AT_sibling ref4
        0x03, 0x0d, 0x00, 0x00, 0x00,             // 3: member
        0x00,
    ];
    let info = sibling_unit(20);
    let mut dwarf = context(&info, &abbrev, SiblingPolicy::Strict);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    let children = unit.child_ids(top).unwrap();
    let offsets: Vec<_> = children.iter().map(|&id| unit.die(id).offset).collect();
    assert_eq!(offsets, vec![12, 20]);
    // Top, the two structures and the unit terminator; no members.
    assert_eq!(unit.parsed_dies(), 4);
    assert_eq!(unit.cached_die_at(17), None);

    // The members are still reachable by walking the structure.
    let members = unit.child_ids(children[0]).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(unit.die(children[0]).terminator().map(|t| unit.die(t).offset), Some(19));
}

/// A v4 unit: compile_unit { structure(sibling) { member, member }, structure(sibling) {} }.
fn sibling_unit(first_sibling: u32) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(&23u32.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());
    info.push(8);
    info.push(0x01); // 11: compile_unit
    info.push(0x02); // 12: structure
    info.extend_from_slice(&first_sibling.to_le_bytes());
    info.extend_from_slice(&[0x03, 0x03, 0x00]); // 17, 18: members; 19: null
    info.push(0x02); // 20: structure
    info.extend_from_slice(&26u32.to_le_bytes());
    info.push(0x00); // 25: null
    info.push(0x00); // 26: null
    info
}

fn context<'a>(info: &'a [u8], abbrev: &'a [u8], policy: SiblingPolicy) -> DebugInfo<'a> {
    DebugInfo::new(
        DwarfConfig::default().with_sibling_policy(policy),
        DebugSection::new(".debug_info", info),
        DebugSection::new(".debug_abbrev", abbrev),
    )
}

#[test]
fn test_malformed_sibling_policy() {
    #[rustfmt::skip]
    let abbrev = [
        0x01, 0x11, 0x01, 0x00, 0x00,
        0x02, 0x13, 0x01, 0x01, 0x13, 0x00, 0x00,
        0x03, 0x0d, 0x00, 0x00, 0x00,
        0x00,
    ];
    for bad in [5u32, 12, 100] {
        let info = sibling_unit(bad);

        let mut strict = context(&info, &abbrev, SiblingPolicy::Strict);
        let unit = strict.get_cu_at(0).unwrap();
        let top = unit.top_die().unwrap();
        assert_eq!(
            unit.child_ids(top),
            Err(ParseError::InvalidDieOffset {
                offset: bad as u64,
                unit_offset: 0
            })
        );

        let mut lenient = context(&info, &abbrev, SiblingPolicy::Lenient);
        let unit = lenient.get_cu_at(0).unwrap();
        let top = unit.top_die().unwrap();
        let children = unit.child_ids(top).unwrap();
        let offsets: Vec<_> = children.iter().map(|&id| unit.die(id).offset).collect();
        assert_eq!(offsets, vec![12, 20]);
    }
}

#[test]
fn test_tree_partition() {
    for layout in layouts() {
        let image = build(&[sample_tree("a.c")], layout);
        let mut dwarf = image.context(layout);
        let unit = dwarf.get_cu_at(0).unwrap();
        for id in unit.all_die_ids().unwrap() {
            if !unit.die(id).has_children {
                continue;
            }
            let mut cursor = unit.die(id).end_offset();
            for child in unit.child_ids(id).unwrap() {
                let die = unit.die(child);
                assert_eq!(die.offset, cursor, "{layout:?}");
                cursor = match die.terminator() {
                    Some(t) => unit.die(t).end_offset(),
                    None => die.end_offset(),
                };
            }
            let terminator = unit.die(id).terminator().unwrap();
            assert_eq!(unit.die(terminator).offset, cursor);
            assert_eq!(unit.die(terminator).size, 1);
        }
    }
}

#[test]
fn test_offset_lookup_is_coherent() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    for id in unit.all_die_ids().unwrap() {
        let before = unit.die(id).clone();
        assert_eq!(unit.get_die_at(before.offset).unwrap(), id);
        assert_eq!(unit.die(id), &before);
    }
}

#[test]
fn test_null_entries_only_in_preorder() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let all = unit.all_die_ids().unwrap();
    let nulls = all.iter().filter(|&&id| unit.die(id).is_null()).count();
    let parents = all.iter().filter(|&&id| unit.die(id).has_children).count();
    assert_eq!(nulls, parents);
    assert_eq!(all.len(), 12 + parents);
    for &id in &all {
        for child in unit.child_ids(id).unwrap() {
            assert!(!unit.die(child).is_null());
        }
    }
}

#[test]
fn test_parent_child_symmetry() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    for id in unit.all_die_ids().unwrap() {
        match unit.parent(id).unwrap() {
            Some(parent) => assert!(unit.child_ids(parent).unwrap().contains(&id)),
            None => assert_eq!(id, top),
        }
    }
}

#[test]
fn test_parent_of_die_reached_by_offset() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);

    // Record the expected (offset -> parent offset) pairs from a full walk.
    let mut walked = image.context(layout);
    let unit = walked.get_cu_at(0).unwrap();
    let mut expected = Vec::new();
    for id in unit.all_die_ids().unwrap() {
        if let Some(parent) = unit.parent(id).unwrap() {
            expected.push((unit.die(id).offset, unit.die(parent).offset));
        }
    }

    // In a fresh context, jump straight to each DIE.
    for (offset, parent_offset) in expected {
        let mut fresh = image.context(layout);
        let unit = fresh.get_cu_at(0).unwrap();
        let id = unit.get_die_at(offset).unwrap();
        assert_eq!(unit.die(id).parent(), None);
        let parent = unit.parent(id).unwrap().unwrap();
        assert_eq!(unit.die(parent).offset, parent_offset);
    }
}

#[test]
fn test_parent_search_memoizes_siblings() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    let children = unit.child_ids(top).unwrap();
    let structure = children[1];
    let members = unit.child_ids(structure).unwrap();
    let member_offsets: Vec<_> = members.iter().map(|&id| unit.die(id).offset).collect();

    let mut fresh = image.context(layout);
    let unit = fresh.get_cu_at(0).unwrap();
    let x = unit.get_die_at(member_offsets[0]).unwrap();
    let parent = unit.parent(x).unwrap().unwrap();
    assert_eq!(name(unit, parent).as_deref(), Some("point"));
    // The search recorded the parent of the other member as well.
    let y = unit.cached_die_at(member_offsets[1]).unwrap();
    assert_eq!(unit.die(y).parent(), Some(parent));
}

#[test]
fn test_parent_of_misaligned_offset() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    let int_type = unit.child_ids(top).unwrap()[0];
    // One byte into "int": parses as garbage or fails, but is not in the tree.
    let inside = unit.die(int_type).offset + 1;
    if let Ok(id) = unit.get_die_at(inside) {
        assert!(matches!(
            unit.parent(id),
            Err(ParseError::InvalidDieOffset { .. })
        ));
    }
}

#[test]
fn test_siblings() {
    let layout = Layout::default();
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    assert!(unit.siblings(top).unwrap().is_empty());
    let children = unit.child_ids(top).unwrap();
    let others: Vec<_> = unit
        .siblings(children[0])
        .unwrap()
        .into_iter()
        .map(|id| name(unit, id))
        .collect();
    assert_eq!(
        others,
        vec![Some("point".into()), Some("main".into()), Some("empty".into())]
    );
}

#[test]
fn test_deep_nesting_without_siblings() {
    let layout = Layout::default();
    let image = build(&[deep_tree(1000)], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    // Skipping the one child forces a walk of the whole chain.
    assert_eq!(unit.child_ids(top).unwrap().len(), 1);
    let all = unit.all_die_ids().unwrap();
    assert_eq!(all.len(), 2 * 1001 + 1);
    let innermost = all
        .iter()
        .copied()
        .find(|&id| unit.die(id).tag == Some(DwTag::Variable))
        .unwrap();
    let offset = unit.die(innermost).offset;

    let mut fresh = image.context(layout);
    let unit = fresh.get_cu_at(0).unwrap();
    let id = unit.get_die_at(offset).unwrap();
    let mut depth = 0;
    let mut current = id;
    while let Some(parent) = unit.parent(current).unwrap() {
        depth += 1;
        current = parent;
    }
    assert_eq!(depth, 1001);
}

#[test]
fn test_unit_accessors() {
    let layout = Layout {
        version: 5,
        dwarf64: true,
        ..Layout::default()
    };
    let image = build(&[sample_tree("a.c")], layout);
    let mut dwarf = image.context(layout);
    let unit = dwarf.get_cu_at(0).unwrap();
    assert_eq!(unit.version(), 5);
    assert_eq!(unit.address_size(), 8);
    assert_eq!(unit.dwarf_format().bits(), 64);
    assert_eq!(unit.size(), image.info.len() as u64);
    assert!(unit.contains(unit.end_offset() - 1));
    assert!(!unit.contains(unit.end_offset()));
    // 12-byte initial length, version, unit type, address size, 8-byte
    // abbreviation offset.
    assert_eq!(unit.die_offset(), 24);
}

#[test]
fn test_references_within_and_across_units() {
    #[rustfmt::skip]
    let abbrev = [
        0x01, 0x11, 0x01, 0x00, 0x00,             // 1: compile_unit
        0x02, 0x24, 0x00, 0x03, 0x08, 0x00, 0x00, // 2: base_type, name string
        0x03, 0x34, 0x00, 0x49, 0x10, 0x00, 0x00, // 3: variable, type ref_addr
        0x04, 0x34, 0x00, 0x49, 0x13, 0x00, 0x00, // 4: variable, type ref4
        0x00,
    ];
    let mut info = Vec::new();
    // Unit A at 0: compile_unit { base_type "int" }
    info.extend_from_slice(&14u32.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());
    info.push(8);
    info.push(0x01); // 11
    info.extend_from_slice(&[0x02, b'i', b'n', b't', 0x00]); // 12
    info.push(0x00); // 17
    // Unit B at 18: compile_unit { variable -> A.int, variable -> B.variable }
    info.extend_from_slice(&19u32.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());
    info.push(8);
    info.push(0x01); // 29
    info.push(0x03); // 30
    info.extend_from_slice(&12u32.to_le_bytes());
    info.push(0x04); // 35
    info.extend_from_slice(&12u32.to_le_bytes());
    info.push(0x00); // 40
    assert_eq!(info.len(), 41);

    let mut dwarf = context(&info, &abbrev, SiblingPolicy::Strict);
    let unit = dwarf.get_cu_at(18).unwrap();
    let top = unit.top_die().unwrap();
    let vars = unit.child_ids(top).unwrap();
    assert_eq!(vars.len(), 2);

    // ref_addr lands in the other unit.
    let target = dwarf
        .die_from_attribute(DieRef { unit: 18, die: vars[0] }, DwAt::Type)
        .unwrap();
    assert_eq!(target.unit, 0);
    let unit_a = dwarf.get_cu_at(0).unwrap();
    assert_eq!(unit_a.die(target.die).tag, Some(DwTag::BaseType));
    assert_eq!(
        unit_a.die(target.die).attr_value(DwAt::Name),
        Some(&AttributeValue::String("int".into()))
    );

    // ref4 is relative to unit B.
    let local = dwarf
        .die_from_attribute(DieRef { unit: 18, die: vars[1] }, DwAt::Type)
        .unwrap();
    assert_eq!(local, DieRef { unit: 18, die: vars[0] });

    // A unit alone cannot follow a reference out of itself.
    let unit_b = dwarf.get_cu_at(18).unwrap();
    assert_eq!(unit_b.die_from_attribute(vars[1], DwAt::Type).unwrap(), vars[0]);
    assert!(matches!(
        unit_b.die_from_attribute(vars[0], DwAt::Type),
        Err(ParseError::InvalidDieOffset { offset: 12, unit_offset: 18 })
    ));
    assert_eq!(
        unit_b.die_from_attribute(vars[0], DwAt::Name),
        Err(ParseError::MissingAttribute { name: DwAt::Name })
    );

    let by_addr = dwarf.get_die_from_refaddr(35).unwrap();
    assert_eq!(by_addr, DieRef { unit: 18, die: vars[1] });
    assert_eq!(
        dwarf.get_die_from_refaddr(41),
        Err(ParseError::NoContainingUnit { offset: 41 })
    );
}

#[test]
fn test_strings_and_full_path() {
    #[rustfmt::skip]
    let abbrev = [
        0x01, 0x11, 0x00,
        0x03, 0x0e, // DW_AT_name, DW_FORM_strp
        0x1b, 0x1f, // DW_AT_comp_dir, DW_FORM_line_strp
        0x00, 0x00, 0x00,
    ];
    let mut info = Vec::new();
    info.extend_from_slice(&16u32.to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());
    info.push(8);
    info.push(0x01);
    info.extend_from_slice(&0u32.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());

    let mut dwarf = context(&info, &abbrev, SiblingPolicy::Strict)
        .with_debug_str(DebugSection::new(".debug_str", b"hello.c\0"))
        .with_debug_line_str(DebugSection::new(".debug_line_str", b"/src\0"));
    let unit = dwarf.get_cu_at(0).unwrap();
    let top = unit.top_die().unwrap();
    assert_eq!(unit.full_path(top), "/src/hello.c");
    let text = unit.die(top).to_string();
    assert!(text.starts_with("DIE DW_TAG_compile_unit, size=9, has_children=false\n"));
    assert!(text.contains("|DW_AT_comp_dir    :  /src\n"));
}

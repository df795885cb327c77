#![no_main]

use dietree::dwarf::DebugInfo;
use dietree::{DebugSection, DwarfConfig, SiblingPolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Byte 0 picks the configuration, byte 1 how much of the rest is
    // .debug_abbrev; the remainder is .debug_info.
    if data.len() < 2 {
        return;
    }
    let flags = data[0];
    let split = (data[1] as usize).min(data.len() - 2);
    let (abbrev, info) = data[2..].split_at(split);

    let config = DwarfConfig::default()
        .with_little_endian(flags & 1 == 0)
        .with_sibling_policy(if flags & 2 == 0 {
            SiblingPolicy::Strict
        } else {
            SiblingPolicy::Lenient
        });
    let mut dwarf = DebugInfo::new(
        config,
        DebugSection::new(".debug_info", info),
        DebugSection::new(".debug_abbrev", abbrev),
    )
    .with_debug_str(DebugSection::new(".debug_str", abbrev))
    .with_debug_line_str(DebugSection::new(".debug_line_str", info));

    let mut units = dwarf.units();
    while let Ok(Some(unit)) = units.next(&mut dwarf) {
        let Ok(ids) = unit.all_die_ids() else {
            continue;
        };
        for id in ids {
            let _ = unit.parent(id);
            let _ = unit.siblings(id);
            let _ = unit.full_path(id);
            let _ = unit.die(id).to_string();
        }
    }

    // Random lookups by offset.
    for chunk in info.chunks(4).take(16) {
        let offset = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let _ = dwarf.get_die_from_refaddr(offset % (info.len() as u64 + 1));
    }
});

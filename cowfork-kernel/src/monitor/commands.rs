//! Monitor commands

use std::fmt::{self, Write};

use cowfork_api::{EnvId, PhysAddr, PteFlags, VirtAddr, PAGE_SIZE};
use cowfork_memory::DEFAULT_LAYOUT;

use super::{Command, Monitor};

/// The command table
pub static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        desc: "Display this list of commands",
        func: mon_help,
    },
    Command {
        name: "kerninfo",
        desc: "Display the user address-space layout and frame usage",
        func: mon_kerninfo,
    },
    Command {
        name: "showmappings",
        desc: "Display the physical page mappings in a virtual range",
        func: mon_showmappings,
    },
    Command {
        name: "permission",
        desc: "Explicitly set or clear the permissions of a mapping",
        func: mon_permission,
    },
    Command {
        name: "dumpmem",
        desc: "Dump the contents of a range of memory",
        func: mon_dumpmem,
    },
    Command {
        name: "env",
        desc: "List environments or switch the target environment",
        func: mon_env,
    },
];

/// Parses a hex word the way the monitor always has: optional `0x`, zero rejected.
fn parse_hex(word: &str) -> Option<usize> {
    let digits = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")).unwrap_or(word);
    usize::from_str_radix(digits, 16).ok().filter(|value| *value != 0)
}

/// Parses a count in decimal or `0x` hex.
fn parse_count(word: &str) -> Option<usize> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(digits) => usize::from_str_radix(digits, 16).ok(),
        None => word.parse().ok(),
    }
}

/// Most words one `dumpmem` prints
pub const DUMPMEM_MAX_WORDS: usize = 1024;

/// End of a dump of `count` words at `addr`, if it stays inside the 32-bit address space
fn dump_end(addr: usize, count: usize) -> Option<usize> {
    count
        .checked_mul(4)
        .and_then(|len| addr.checked_add(len))
        .filter(|end| u32::try_from(end.saturating_sub(1)).is_ok())
}

fn usage(out: &mut dyn Write, line: &str) -> fmt::Result {
    writeln!(out, "Not expected format! Usage")?;
    writeln!(out, " > {}", line)
}

fn mon_help(_mon: &mut Monitor, _argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    for command in COMMANDS {
        writeln!(out, "{} - {}", command.name, command.desc)?;
    }
    Ok(())
}

fn mon_kerninfo(mon: &mut Monitor, _argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    let kernel = mon.kernel();
    writeln!(out, "User address-space layout:")?;
    for (name, va) in DEFAULT_LAYOUT.regions() {
        writeln!(out, "  {:<10} {}", name, va)?;
    }
    writeln!(
        out,
        "Physical frames: {} in use of {}",
        kernel.frames_in_use(),
        kernel.config().max_frames
    )?;
    writeln!(out, "Environments: {}", kernel.env_ids().len())
}

fn mon_showmappings(mon: &mut Monitor, argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    let range = match argv {
        [_, low, high] => parse_hex(low).zip(parse_hex(high)),
        _ => None,
    }
    .filter(|(low, high)| {
        low % PAGE_SIZE == 0 && high % PAGE_SIZE == 0 && low <= high && u32::try_from(*high).is_ok()
    });
    let Some((low, high)) = range else {
        return usage(out, "showmappings 0xva_low 0xva_high");
    };

    for va in (low..=high).step_by(PAGE_SIZE) {
        let va = VirtAddr::new(va);
        match mon.kernel().translate(mon.target(), va) {
            Some((pa, flags)) => writeln!(out, "{} -> {:#010x}\t{}", va, pa.as_usize(), flags)?,
            None => writeln!(out, "{} not mapped", va)?,
        }
    }
    Ok(())
}

fn mon_permission(mon: &mut Monitor, argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    let parsed = match argv {
        [_, va, kind, flag] => {
            let va = parse_hex(va).filter(|va| va % PAGE_SIZE == 0);
            let set = match *kind {
                "c" => Some(false),
                "s" => Some(true),
                _ => None,
            };
            let bit = match *flag {
                "P" => Some(PteFlags::PRESENT),
                "W" => Some(PteFlags::WRITABLE),
                "U" => Some(PteFlags::USER),
                _ => None,
            };
            va.zip(set).zip(bit).map(|((va, set), bit)| (VirtAddr::new(va), set, bit))
        }
        _ => None,
    };
    let Some((va, set, bit)) = parsed else {
        return usage(out, "permission 0xva [c|s :clear or set] [P|W|U]");
    };

    let kernel = mon.kernel();
    let Some((_, before)) = kernel.translate(mon.target(), va) else {
        return writeln!(out, "no mapping at {}", va);
    };
    writeln!(out, "origin:  {}\t{}", va, before)?;
    let after = if set {
        writeln!(out, "setting virtual addr {} permission", va)?;
        before | bit
    } else {
        writeln!(out, "clearing virtual addr {} permission", va)?;
        before - bit
    };
    if kernel.set_pte_flags(mon.target(), va, after).is_err() {
        return writeln!(out, "no mapping at {}", va);
    }
    writeln!(out, "current: {}\t{}", va, after)
}

fn mon_dumpmem(mon: &mut Monitor, argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    let parsed = match argv {
        [_, kind, addr, count] => {
            let physical = match *kind {
                "p" => Some(true),
                "v" => Some(false),
                _ => None,
            };
            let addr = parse_hex(addr).filter(|addr| addr % PAGE_SIZE == 0);
            let count = parse_count(count).filter(|n| (1..=DUMPMEM_MAX_WORDS).contains(n));
            physical
                .zip(addr)
                .zip(count)
                .map(|((physical, addr), count)| (physical, addr, count))
                .filter(|(_, addr, count)| dump_end(*addr, *count).is_some())
        }
        _ => None,
    };
    let Some((physical, addr, count)) = parsed else {
        return usage(out, "dumpmem [p|v addr type] 0xaddr N");
    };

    let kernel = mon.kernel();
    for word in 0..count {
        let at = addr + word * 4;
        if physical {
            match kernel.read_phys_u32(PhysAddr::new(at)) {
                Some(value) => writeln!(out, "physical memory:{:#010x}\tvalue:{:#010x}", at, value)?,
                None => writeln!(out, "physical memory:{:#010x}\tnot allocated", at)?,
            }
        } else {
            match kernel.read_virt_u32(mon.target(), VirtAddr::new(at)) {
                Some(value) => writeln!(out, "virtual memory:{:#010x}\tvalue:{:#010x}", at, value)?,
                None => writeln!(out, "virtual memory:{:#010x}\tnot mapped", at)?,
            }
        }
    }
    Ok(())
}

fn mon_env(mon: &mut Monitor, argv: &[&str], out: &mut dyn Write) -> fmt::Result {
    match argv {
        [_] => {
            for id in mon.kernel().env_ids() {
                let Some(info) = mon.kernel().env_info(id) else {
                    continue;
                };
                let marker = if id == mon.target() { '*' } else { ' ' };
                writeln!(
                    out,
                    "{} {} parent {} {} faults {}",
                    marker,
                    id,
                    info.parent_id,
                    info.status,
                    mon.kernel().fault_count(id)
                )?;
                if let Some(diagnostic) = mon.kernel().diagnostic(id) {
                    writeln!(out, "    {}", diagnostic)?;
                }
            }
            Ok(())
        }
        [_, id] => {
            let Some(id) = parse_hex(id).and_then(|id| u32::try_from(id).ok()).map(EnvId) else {
                return usage(out, "env [0xid]");
            };
            if mon.kernel().env_status(id).is_none() {
                return writeln!(out, "no environment {}", id);
            }
            mon.set_target(id);
            writeln!(out, "target environment {}", id)
        }
        _ => usage(out, "env [0xid]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x800000"), Some(0x0080_0000));
        assert_eq!(parse_hex("800000"), Some(0x0080_0000));
        assert_eq!(parse_hex("0x0"), None);
        assert_eq!(parse_hex("zz"), None);
    }

    #[test]
    fn test_dump_end() {
        assert_eq!(dump_end(0x1000, 4), Some(0x1010));
        assert!(dump_end(0xffff_f000, 0x400).is_some());
        assert_eq!(dump_end(0xffff_f000, 0x401), None);
        assert_eq!(dump_end(usize::MAX - 0xfff, 0x401), None);
        assert_eq!(dump_end(0x1000, usize::MAX), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("16"), Some(16));
        assert_eq!(parse_count("0x10"), Some(16));
        assert_eq!(parse_count("-1"), None);
    }
}

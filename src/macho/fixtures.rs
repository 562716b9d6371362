//! Builders for small in-memory Mach-O images used by unit tests.

use super::constants::*;
use super::structs::*;
use crate::util::align_up;

/// Encodes a header followed by the given commands, filling in `ncmds` and
/// `sizeofcmds` from the command bytes.
pub fn image(filetype: u32, commands: &[Vec<u8>]) -> Vec<u8> {
    let sizeofcmds: usize = commands.iter().map(Vec::len).sum();
    let header = MachHeader64 {
        cputype: CPU_TYPE_X86_64,
        cpusubtype: CPU_SUBTYPE_I386_ALL,
        filetype,
        ncmds: commands.len() as u32,
        sizeofcmds: sizeofcmds as u32,
        ..Default::default()
    };

    let mut out = Vec::new();
    header.write_to(&mut out).unwrap();
    for cmd in commands {
        out.extend_from_slice(cmd);
    }
    out
}

/// A command with the given tag and size and a zero payload.
pub fn raw_command(cmd: u32, cmdsize: u32) -> Vec<u8> {
    let mut out = Vec::new();
    LoadCommand { cmd, cmdsize }.write_to(&mut out).unwrap();
    out.resize(cmdsize as usize, 0);
    out
}

/// A section record.
pub fn section(name: &str, segment: &str, offset: u32, size: u64) -> Section64 {
    let mut sect = Section64 {
        offset,
        size,
        ..Default::default()
    };
    sect.set_name(name);
    sect.set_segment_name(segment);
    sect
}

/// A segment command followed by its sections and `trailing` zero bytes.
pub fn segment(name: &str, sections: &[Section64], trailing: usize) -> Vec<u8> {
    let mut seg = SegmentCommand64 {
        cmdsize: (SegmentCommand64::SIZE + sections.len() * Section64::SIZE + trailing) as u32,
        nsects: sections.len() as u32,
        ..Default::default()
    };
    seg.set_name(name);

    let mut out = Vec::new();
    seg.write_to(&mut out).unwrap();
    for sect in sections {
        sect.write_to(&mut out).unwrap();
    }
    out.resize(seg.cmdsize as usize, 0);
    out
}

/// An LC_MAIN command.
pub fn entry_point(entryoff: u64) -> Vec<u8> {
    let mut out = Vec::new();
    EntryPointCommand {
        entryoff,
        ..Default::default()
    }
    .write_to(&mut out)
    .unwrap();
    out
}

/// An LC_LOAD_DYLIB command carrying `path`.
pub fn dylib(current_version: u32, path: &str) -> Vec<u8> {
    let cmdsize = align_up((DylibCommand::SIZE + path.len() + 1) as u64, 8) as u32;
    let mut out = Vec::new();
    DylibCommand {
        cmd: LC_LOAD_DYLIB,
        cmdsize,
        dylib: Dylib {
            name_offset: DylibCommand::SIZE as u32,
            timestamp: 2,
            current_version,
            compatibility_version: 0x10000,
        },
    }
    .write_to(&mut out)
    .unwrap();
    out.extend_from_slice(path.as_bytes());
    out.resize(cmdsize as usize, 0);
    out
}

/// Bytes of `mov eax, 0x3c; syscall` padded to 11 bytes.
pub const EXIT_CODE: [u8; 11] = [0xB8, 0x3C, 0x00, 0x00, 0x00, 0x0F, 0x05, 0x00, 0x00, 0x00, 0x00];

/// An object file whose only segment holds one `__text` section at offset
/// 184 with the 11 bytes of [`EXIT_CODE`].
pub fn exit_object() -> Vec<u8> {
    let text = section(SECT_TEXT, SEG_TEXT, 184, EXIT_CODE.len() as u64);
    let mut bytes = image(MH_OBJECT, &[segment("", &[text], 0)]);
    assert_eq!(bytes.len(), 184);
    bytes.extend_from_slice(&EXIT_CODE);
    bytes
}

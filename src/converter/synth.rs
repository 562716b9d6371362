//! Synthesis of a minimal, directly loadable x86_64 executable.
//!
//! The output carries exactly six load commands:
//!
//! 1. `__PAGEZERO` segment reserving the bottom of the address space
//! 2. `__TEXT` segment with a single `__text` section holding the code
//! 3. `__LINKEDIT` segment placeholder
//! 4. `LC_LOAD_DYLINKER` naming the dynamic linker
//! 5. `LC_MAIN` pointing at the first byte of the code
//! 6. `LC_LOAD_DYLIB` naming the system library
//!
//! followed by the code bytes and one page of zero padding. `sizeofcmds`, the
//! section offset and the entry offset are all derived from the encoded sizes
//! of the commands actually emitted.

use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};
use crate::macho::*;
use crate::util::align_up;

/// Load commands in a 64-bit image are padded to this alignment.
const COMMAND_ALIGN: u64 = 8;

/// Policy for the synthesized executable.
///
/// None of these values come from the input object; they are fixed choices
/// that produce a file the loader accepts.
#[derive(Debug, Clone)]
pub struct ExecutableLayout {
    /// CPU type written to the header
    pub cputype: u32,
    /// CPU subtype written to the header
    pub cpusubtype: u32,
    /// Size of the `__PAGEZERO` reservation
    pub pagezero_size: u64,
    /// Virtual address of `__TEXT` and its `__text` section
    pub text_vmaddr: u64,
    /// Virtual size of `__TEXT`
    pub text_vmsize: u64,
    /// Alignment of `__text` as a power of two
    pub text_align: u32,
    /// Virtual address of `__LINKEDIT`
    pub linkedit_vmaddr: u64,
    /// Virtual size of `__LINKEDIT`
    pub linkedit_vmsize: u64,
    /// Path of the dynamic linker
    pub dylinker_path: String,
    /// Path of the system library
    pub library_path: String,
    /// Build timestamp recorded for the system library
    pub library_timestamp: u32,
    /// Current version recorded for the system library
    pub library_current_version: u32,
    /// Compatibility version recorded for the system library
    pub library_compatibility_version: u32,
    /// Stack size requested by `LC_MAIN` (0 = default)
    pub stack_size: u64,
    /// Zero bytes appended after the code
    pub trailing_padding: usize,
}

impl Default for ExecutableLayout {
    fn default() -> Self {
        Self {
            cputype: CPU_TYPE_X86_64,
            cpusubtype: CPU_SUBTYPE_LIB64 | CPU_SUBTYPE_I386_ALL,
            pagezero_size: 0x1000,
            text_vmaddr: 0x1000,
            text_vmsize: 0x1000,
            text_align: 4,
            linkedit_vmaddr: 0x9000,
            linkedit_vmsize: 0x1000,
            dylinker_path: "/usr/lib/dyld".to_string(),
            library_path: "/usr/lib/libSystem.B.dylib".to_string(),
            library_timestamp: 2,
            library_current_version: 0x4ca0a01,
            library_compatibility_version: 0x10000,
            stack_size: 0,
            trailing_padding: 0x1000,
        }
    }
}

// =============================================================================
// Emitted Commands
// =============================================================================

/// A load command as it will be encoded in the output.
#[derive(Debug, Clone)]
enum EmittedCommand {
    Segment {
        command: SegmentCommand64,
        sections: Vec<Section64>,
    },
    Dylinker {
        command: DylinkerCommand,
        path: Vec<u8>,
    },
    EntryPoint(EntryPointCommand),
    Dylib {
        command: DylibCommand,
        path: Vec<u8>,
    },
}

impl EmittedCommand {
    /// Encoded size in bytes.
    fn size(&self) -> usize {
        match self {
            EmittedCommand::Segment { sections, .. } => {
                SegmentCommand64::SIZE + sections.len() * Section64::SIZE
            }
            EmittedCommand::Dylinker { path, .. } => DylinkerCommand::SIZE + path.len(),
            EmittedCommand::EntryPoint(_) => EntryPointCommand::SIZE,
            EmittedCommand::Dylib { path, .. } => DylibCommand::SIZE + path.len(),
        }
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            EmittedCommand::Segment { command, sections } => {
                command.write_to(w)?;
                for sect in sections {
                    sect.write_to(w)?;
                }
                Ok(())
            }
            EmittedCommand::Dylinker { command, path } => {
                command.write_to(w)?;
                w.write_all(path)
            }
            EmittedCommand::EntryPoint(command) => command.write_to(w),
            EmittedCommand::Dylib { command, path } => {
                command.write_to(w)?;
                w.write_all(path)
            }
        }
    }

    /// Sets `cmdsize` (and `nsects` for segments) from the encoded contents.
    fn finalize(&mut self) -> Result<()> {
        let size = to_u32(self.size(), "load command")?;
        match self {
            EmittedCommand::Segment { command, sections } => {
                command.cmdsize = size;
                command.nsects = to_u32(sections.len(), "section count")?;
            }
            EmittedCommand::Dylinker { command, .. } => command.cmdsize = size,
            EmittedCommand::EntryPoint(command) => command.cmdsize = size,
            EmittedCommand::Dylib { command, .. } => command.cmdsize = size,
        }
        Ok(())
    }

    /// Points every code-relative field at `offset`.
    fn set_code_offset(&mut self, offset: u32) {
        match self {
            EmittedCommand::Segment { sections, .. } => {
                for sect in sections.iter_mut().filter(|s| s.is_named(SECT_TEXT)) {
                    sect.offset = offset;
                }
            }
            EmittedCommand::EntryPoint(command) => command.entryoff = offset as u64,
            EmittedCommand::Dylinker { .. } | EmittedCommand::Dylib { .. } => {}
        }
    }
}

/// Returns `path` NUL-terminated and padded so that a command of `fixed`
/// bytes plus the string is a multiple of 8 bytes.
fn padded_path(path: &str, fixed: usize) -> Vec<u8> {
    let total = align_up((fixed + path.len() + 1) as u64, COMMAND_ALIGN) as usize;
    let mut bytes = path.as_bytes().to_vec();
    bytes.resize(total - fixed, 0);
    bytes
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::LayoutOverflow {
        what,
        size: value as u64,
    })
}

fn segment(name: &str) -> SegmentCommand64 {
    let mut seg = SegmentCommand64::default();
    seg.set_name(name);
    seg
}

impl ExecutableLayout {
    /// Builds the six load commands with sizes set and code offsets left at zero.
    fn build_commands(&self, code_len: u64) -> Result<Vec<EmittedCommand>> {
        let pagezero = SegmentCommand64 {
            vmaddr: 0,
            vmsize: self.pagezero_size,
            maxprot: VmProt::empty().bits(),
            initprot: VmProt::empty().bits(),
            ..segment(SEG_PAGEZERO)
        };

        let mut text_section = Section64 {
            addr: self.text_vmaddr,
            size: code_len,
            align: self.text_align,
            flags: S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS,
            ..Default::default()
        };
        text_section.set_name(SECT_TEXT);
        text_section.set_segment_name(SEG_TEXT);
        let text = SegmentCommand64 {
            vmaddr: self.text_vmaddr,
            vmsize: self.text_vmsize,
            maxprot: VmProt::ALL.bits(),
            initprot: (VmProt::READ | VmProt::EXECUTE).bits(),
            ..segment(SEG_TEXT)
        };

        let linkedit = SegmentCommand64 {
            vmaddr: self.linkedit_vmaddr,
            vmsize: self.linkedit_vmsize,
            maxprot: VmProt::ALL.bits(),
            initprot: VmProt::DEFAULT.bits(),
            ..segment(SEG_LINKEDIT)
        };

        let dylinker_path = padded_path(&self.dylinker_path, DylinkerCommand::SIZE);
        let dylinker = DylinkerCommand {
            cmd: LC_LOAD_DYLINKER,
            cmdsize: 0,
            name_offset: DylinkerCommand::SIZE as u32,
        };

        let entry = EntryPointCommand {
            stacksize: self.stack_size,
            ..Default::default()
        };

        let library_path = padded_path(&self.library_path, DylibCommand::SIZE);
        let library = DylibCommand {
            cmd: LC_LOAD_DYLIB,
            cmdsize: 0,
            dylib: Dylib {
                name_offset: DylibCommand::SIZE as u32,
                timestamp: self.library_timestamp,
                current_version: self.library_current_version,
                compatibility_version: self.library_compatibility_version,
            },
        };

        let mut commands = vec![
            EmittedCommand::Segment {
                command: pagezero,
                sections: Vec::new(),
            },
            EmittedCommand::Segment {
                command: text,
                sections: vec![text_section],
            },
            EmittedCommand::Segment {
                command: linkedit,
                sections: Vec::new(),
            },
            EmittedCommand::Dylinker {
                command: dylinker,
                path: dylinker_path,
            },
            EmittedCommand::EntryPoint(entry),
            EmittedCommand::Dylib {
                command: library,
                path: library_path,
            },
        ];
        for command in &mut commands {
            command.finalize()?;
        }
        Ok(commands)
    }

    /// Returns the file offset at which the code will be placed.
    pub fn code_offset(&self) -> Result<u64> {
        let sizeofcmds: usize = self.build_commands(0)?.iter().map(|c| c.size()).sum();
        Ok((MachHeader64::SIZE + sizeofcmds) as u64)
    }
}

/// Wraps `code` in a minimal executable and returns the complete file image.
pub fn synthesize_executable(code: &[u8], layout: &ExecutableLayout) -> Result<Vec<u8>> {
    let mut commands = layout.build_commands(code.len() as u64)?;

    let sizeofcmds: usize = commands.iter().map(|c| c.size()).sum();
    let code_offset = to_u32(MachHeader64::SIZE + sizeofcmds, "load command block")?;
    for command in &mut commands {
        command.set_code_offset(code_offset);
    }

    let header = MachHeader64 {
        magic: MH_MAGIC_64,
        cputype: layout.cputype,
        cpusubtype: layout.cpusubtype,
        filetype: MH_EXECUTE,
        ncmds: commands.len() as u32,
        sizeofcmds: to_u32(sizeofcmds, "load command block")?,
        flags: MachOFlags::NOUNDEFS.bits(),
        reserved: 0,
    };

    debug!(
        "synthesizing {} commands, sizeofcmds {:#x}, code at {:#x} ({} bytes)",
        header.ncmds,
        sizeofcmds,
        code_offset,
        code.len()
    );

    let total = code_offset as usize + code.len() + layout.trailing_padding;
    let mut out = Vec::with_capacity(total);
    header.write_to(&mut out)?;
    for command in &commands {
        command.write_to(&mut out)?;
    }
    debug_assert_eq!(out.len(), code_offset as usize);

    out.extend_from_slice(code);
    out.resize(total, 0);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::converter::first_segment;
    use crate::macho::fixtures::EXIT_CODE;

    fn decode(bytes: Vec<u8>) -> (MachOContext, ByteReader<Cursor<Vec<u8>>>) {
        let mut r = ByteReader::new(Cursor::new(bytes)).unwrap();
        let ctx = MachOContext::parse(&mut r).unwrap();
        (ctx, r)
    }

    #[test]
    fn test_default_layout_sizes() {
        let layout = ExecutableLayout::default();
        let out = synthesize_executable(&EXIT_CODE, &layout).unwrap();

        // 72 + (72 + 80) + 72 + 32 + 24 + 56
        assert_eq!(&out[20..24], &408u32.to_le_bytes());
        assert_eq!(layout.code_offset().unwrap(), 440);
        assert_eq!(out.len(), 440 + EXIT_CODE.len() + 0x1000);
        assert_eq!(&out[440..451], &EXIT_CODE);
        assert!(out[451..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_fields() {
        let out = synthesize_executable(&EXIT_CODE, &ExecutableLayout::default()).unwrap();
        let (ctx, _) = decode(out);

        assert_eq!(ctx.header.magic, MH_MAGIC_64);
        assert_eq!(ctx.header.cputype, CPU_TYPE_X86_64);
        assert_eq!(ctx.header.cpusubtype, 0x8000_0003);
        assert!(ctx.is_executable());
        assert_eq!(ctx.header.ncmds, 6);
        assert_eq!(ctx.header.mach_flags(), MachOFlags::NOUNDEFS);
    }

    #[test]
    fn test_command_sequence() {
        let out = synthesize_executable(&EXIT_CODE, &ExecutableLayout::default()).unwrap();
        let (ctx, _) = decode(out);

        let tags: Vec<_> = ctx.load_commands.iter().map(|lc| lc.cmd()).collect();
        assert_eq!(
            tags,
            [
                LC_SEGMENT_64,
                LC_SEGMENT_64,
                LC_SEGMENT_64,
                LC_LOAD_DYLINKER,
                LC_MAIN,
                LC_LOAD_DYLIB
            ]
        );

        let segs: Vec<_> = ctx.segments().map(|s| s.name().to_string()).collect();
        assert_eq!(segs, [SEG_PAGEZERO, SEG_TEXT, SEG_LINKEDIT]);

        let pagezero = ctx.segment(SEG_PAGEZERO).unwrap();
        assert_eq!(pagezero.command.vmsize, 0x1000);
        assert_eq!(pagezero.command.filesize, 0);
        assert_eq!(pagezero.command.init_prot(), VmProt::empty());

        let text = ctx.text_segment().unwrap();
        assert_eq!(text.command.init_prot(), VmProt::READ | VmProt::EXECUTE);
        assert_eq!(text.command.max_prot(), VmProt::ALL);

        let linkedit = ctx.segment(SEG_LINKEDIT).unwrap();
        assert_eq!(linkedit.command.vmaddr, 0x9000);
        assert_eq!(linkedit.command.init_prot(), VmProt::DEFAULT);

        let dylib = ctx.dylibs().next().unwrap();
        assert_eq!(dylib.name, "/usr/lib/libSystem.B.dylib");
        assert_eq!(dylib.command.cmdsize, 56);
        assert_eq!(dylib.current_version(), 0x4ca0a01);
        assert_eq!(dylib.compatibility_version(), 0x10000);
        assert_eq!(dylib.command.dylib.timestamp, 2);
    }

    #[test]
    fn test_dylinker_path_bytes() {
        let out = synthesize_executable(&[], &ExecutableLayout::default()).unwrap();

        // Header, three segments and one section precede the dylinker command.
        let at = 32 + 72 + 152 + 72;
        assert_eq!(&out[at..at + 4], &LC_LOAD_DYLINKER.to_le_bytes());
        assert_eq!(&out[at + 4..at + 8], &32u32.to_le_bytes());
        assert_eq!(&out[at + 8..at + 12], &12u32.to_le_bytes());
        assert_eq!(&out[at + 12..at + 32], b"/usr/lib/dyld\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_round_trip_recovers_code() {
        let code: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let layout = ExecutableLayout::default();
        let out = synthesize_executable(&code, &layout).unwrap();
        let (ctx, mut r) = decode(out);

        let text = ctx.text_segment().unwrap().section(SECT_TEXT).unwrap();
        assert_eq!(text.section.offset as u64, layout.code_offset().unwrap());
        assert_eq!(text.section.size, code.len() as u64);
        assert_eq!(ctx.entry_point().unwrap().entryoff, text.section.offset as u64);

        r.seek_to(text.section.offset as u64).unwrap();
        assert_eq!(r.read_bytes(text.section.size).unwrap(), code);

        let preview = ctx.entry_preview(&mut r).unwrap().unwrap();
        assert_eq!(&preview[..], &code[..PREVIEW_LEN]);
    }

    #[test]
    fn test_empty_code() {
        let out = synthesize_executable(&[], &ExecutableLayout::default()).unwrap();
        assert_eq!(out.len(), 440 + 0x1000);

        let (ctx, mut r) = decode(out);
        let text = ctx.text_segment().unwrap().section(SECT_TEXT).unwrap();
        assert_eq!(text.section.size, 0);
        assert_eq!(text.section.offset, 440);
        assert_eq!(ctx.entry_preview(&mut r).unwrap().unwrap(), [0u8; PREVIEW_LEN]);

        let header = ctx.header;
        let seg = first_segment(&mut r, &header).unwrap().unwrap();
        assert_eq!(seg.name(), SEG_PAGEZERO);
    }

    #[test]
    fn test_longer_paths_shift_offsets() {
        let layout = ExecutableLayout {
            dylinker_path: "/opt/custom/lib/dyld".to_string(),
            ..Default::default()
        };
        let out = synthesize_executable(&EXIT_CODE, &layout).unwrap();

        // 12 + 20 + 1 = 33 -> 40 byte command instead of 32
        assert_eq!(layout.code_offset().unwrap(), 448);
        let (ctx, _) = decode(out);
        assert_eq!(ctx.entry_point().unwrap().entryoff, 448);
        assert_eq!(ctx.header.sizeofcmds, 416);
    }

    #[test]
    fn test_padded_path() {
        assert_eq!(padded_path("/usr/lib/dyld", 12).len(), 20);
        assert_eq!(padded_path("/usr/lib/libSystem.B.dylib", 24).len(), 32);
        assert_eq!(padded_path("abc", 12).len(), 4);
        assert_eq!(padded_path("abcd", 12), b"abcd\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_declared_sizes_match_encoding() {
        let commands = ExecutableLayout::default().build_commands(11).unwrap();
        for command in &commands {
            let mut bytes = Vec::new();
            command.write_to(&mut bytes).unwrap();
            let cmdsize = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
            assert_eq!(cmdsize as usize, bytes.len());
            assert_eq!(bytes.len() % 8, 0);

            if let EmittedCommand::Segment { command, sections } = command {
                assert_eq!(command.nsects as usize, sections.len());
            }
        }
    }
}

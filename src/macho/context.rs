//! Decoded view of a Mach-O file.

use std::collections::HashMap;
use std::io::{Read, Seek};

use tracing::debug;

use super::constants::*;
use super::reader::ByteReader;
use super::structs::*;
use super::walker::{LoadCommandHeader, LoadCommandWalker};
use crate::error::Result;
use crate::util::memchr_null;

/// Number of bytes shown from the entry point of an executable.
pub const PREVIEW_LEN: usize = 32;

// =============================================================================
// Segment Info
// =============================================================================

/// Parsed segment information.
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    /// The segment command
    pub command: SegmentCommand64,
    /// Offset of the segment command in the file
    pub command_offset: u64,
    /// Sections in this segment, in file order
    pub sections: Vec<SectionInfo>,
}

impl SegmentInfo {
    /// Returns the segment name.
    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Returns the first section whose name field equals `name` exactly.
    pub fn section(&self, name: &str) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.section.is_named(name))
    }

    /// Reads the segment command and the `nsects` section records that
    /// immediately follow it.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>, command_offset: u64) -> Result<Self> {
        let command = SegmentCommand64::read_from(r)?;

        // Sections are contiguous and fixed-size; never reserve more than the
        // file could possibly hold.
        let room = r.remaining()? / Section64::SIZE as u64;
        let mut sections = Vec::with_capacity(room.min(command.nsects as u64) as usize);

        for _ in 0..command.nsects {
            let struct_offset = r.tell()?;
            let section = Section64::read_from(r)?;
            sections.push(SectionInfo {
                section,
                struct_offset,
            });
        }

        Ok(Self {
            command,
            command_offset,
            sections,
        })
    }
}

/// Parsed section information.
#[derive(Debug, Clone)]
pub struct SectionInfo {
    /// The section structure
    pub section: Section64,
    /// Offset of the section structure in the file
    pub struct_offset: u64,
}

impl SectionInfo {
    /// Returns the section name.
    pub fn name(&self) -> &str {
        self.section.name()
    }

    /// Returns the full name (segment,section).
    pub fn full_name(&self) -> String {
        format!("{},{}", self.section.segment_name(), self.section.name())
    }
}

// =============================================================================
// Dylib Info
// =============================================================================

/// A library reference from an LC_LOAD_DYLIB command.
#[derive(Debug, Clone)]
pub struct DylibInfo {
    /// The dylib command
    pub command: DylibCommand,
    /// Library path, empty if the name offset points outside the command
    pub name: String,
    /// Offset of the command in the file
    pub offset: u64,
}

impl DylibInfo {
    /// Reads the fixed dylib record and the path string it references.
    fn read_from<R: Read + Seek>(r: &mut ByteReader<R>, lc: &LoadCommandHeader) -> Result<Self> {
        let command = DylibCommand::read_from(r)?;

        let name_offset = command.dylib.name_offset as u64;
        let name = if name_offset >= DylibCommand::SIZE as u64 && name_offset < lc.cmdsize as u64
        {
            r.seek_to(lc.offset + name_offset)?;
            let bytes = r.read_bytes(lc.cmdsize as u64 - name_offset)?;
            String::from_utf8_lossy(&bytes[..memchr_null(&bytes)]).to_string()
        } else {
            String::new()
        };

        Ok(Self {
            command,
            name,
            offset: lc.offset,
        })
    }

    /// Returns the library's current version.
    #[inline]
    pub fn current_version(&self) -> u32 {
        self.command.dylib.current_version
    }

    /// Returns the library's compatibility version.
    #[inline]
    pub fn compatibility_version(&self) -> u32 {
        self.command.dylib.compatibility_version
    }
}

// =============================================================================
// Load Command Info
// =============================================================================

/// Parsed load command information.
///
/// Only segments, the entry point and library references are interpreted;
/// everything else is recorded by tag and size and skipped.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum LoadCommandInfo {
    Segment(SegmentInfo),
    EntryPoint {
        command: EntryPointCommand,
        offset: u64,
    },
    Dylib(DylibInfo),
    Unknown {
        cmd: u32,
        cmdsize: u32,
        offset: u64,
    },
}

impl LoadCommandInfo {
    /// Returns the load command offset.
    pub fn offset(&self) -> u64 {
        match self {
            LoadCommandInfo::Segment(s) => s.command_offset,
            LoadCommandInfo::EntryPoint { offset, .. } => *offset,
            LoadCommandInfo::Dylib(d) => d.offset,
            LoadCommandInfo::Unknown { offset, .. } => *offset,
        }
    }

    /// Returns the load command tag.
    pub fn cmd(&self) -> u32 {
        match self {
            LoadCommandInfo::Segment(s) => s.command.cmd,
            LoadCommandInfo::EntryPoint { command, .. } => command.cmd,
            LoadCommandInfo::Dylib(d) => d.command.cmd,
            LoadCommandInfo::Unknown { cmd, .. } => *cmd,
        }
    }
}

// =============================================================================
// Mach-O Context
// =============================================================================

/// Result of one forward decode pass over a Mach-O file.
#[derive(Debug)]
pub struct MachOContext {
    /// The Mach-O header
    pub header: MachHeader64,
    /// Parsed load commands, in file order
    pub load_commands: Vec<LoadCommandInfo>,
    /// First segment index by name
    segment_indices: HashMap<String, usize>,
}

impl MachOContext {
    /// Decodes the header and every load command.
    ///
    /// The reader is rewound to offset 0 first. On success the cursor rests at
    /// the end of the load command block.
    pub fn parse<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<Self> {
        reader.seek_to(0)?;
        let header = MachHeader64::read_from(reader)?;
        debug!("{}", header);

        let mut ctx = Self {
            header,
            load_commands: Vec::with_capacity(header.ncmds.min(256) as usize),
            segment_indices: HashMap::new(),
        };

        let mut walker = LoadCommandWalker::new(reader, &header);
        while let Some(lc) = walker.next_command()? {
            let info = Self::parse_load_command(walker.reader(), &lc)?;

            if let LoadCommandInfo::Segment(ref seg) = info {
                ctx.segment_indices
                    .entry(seg.name().to_string())
                    .or_insert(ctx.load_commands.len());
            }

            ctx.load_commands.push(info);
        }
        walker.finish()?;

        Ok(ctx)
    }

    /// Dispatches one command to its fixed-size decoder.
    fn parse_load_command<R: Read + Seek>(
        r: &mut ByteReader<R>,
        lc: &LoadCommandHeader,
    ) -> Result<LoadCommandInfo> {
        match lc.cmd {
            LC_SEGMENT_64 => Ok(LoadCommandInfo::Segment(SegmentInfo::read_from(
                r, lc.offset,
            )?)),

            LC_MAIN => Ok(LoadCommandInfo::EntryPoint {
                command: EntryPointCommand::read_from(r)?,
                offset: lc.offset,
            }),

            LC_LOAD_DYLIB => {
                let dylib = DylibInfo::read_from(r, lc)?;
                debug!(
                    "dylib {} current {} compat {}",
                    dylib.name,
                    Dylib::format_version(dylib.current_version()),
                    Dylib::format_version(dylib.compatibility_version())
                );
                Ok(LoadCommandInfo::Dylib(dylib))
            }

            cmd => {
                debug!(
                    "skipping {} ({:#x}) at {:#x}",
                    load_command_name(cmd),
                    cmd,
                    lc.offset
                );
                Ok(LoadCommandInfo::Unknown {
                    cmd,
                    cmdsize: lc.cmdsize,
                    offset: lc.offset,
                })
            }
        }
    }

    /// Returns a reference to the first segment with the given name.
    pub fn segment(&self, name: &str) -> Option<&SegmentInfo> {
        self.segment_indices.get(name).and_then(|&idx| {
            if let LoadCommandInfo::Segment(ref seg) = self.load_commands[idx] {
                Some(seg)
            } else {
                None
            }
        })
    }

    /// Returns an iterator over all segments.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentInfo> {
        self.load_commands.iter().filter_map(|lc| {
            if let LoadCommandInfo::Segment(seg) = lc {
                Some(seg)
            } else {
                None
            }
        })
    }

    /// Returns the __TEXT segment.
    pub fn text_segment(&self) -> Option<&SegmentInfo> {
        self.segments().find(|seg| seg.command.is_text())
    }

    /// Returns the entry point command.
    ///
    /// If a malformed file carries several, the last one wins.
    pub fn entry_point(&self) -> Option<&EntryPointCommand> {
        self.load_commands.iter().rev().find_map(|lc| {
            if let LoadCommandInfo::EntryPoint { command, .. } = lc {
                Some(command)
            } else {
                None
            }
        })
    }

    /// Returns an iterator over library references, in file order.
    pub fn dylibs(&self) -> impl Iterator<Item = &DylibInfo> {
        self.load_commands.iter().filter_map(|lc| {
            if let LoadCommandInfo::Dylib(dylib) = lc {
                Some(dylib)
            } else {
                None
            }
        })
    }

    /// Returns true if this is an executable.
    pub fn is_executable(&self) -> bool {
        self.header.is_executable()
    }

    /// Returns true if this is an object file.
    pub fn is_object(&self) -> bool {
        self.header.is_object()
    }

    /// Reads the bytes at the entry point of an executable.
    ///
    /// Returns `None` unless the file is an executable with an entry point
    /// and a `__TEXT` segment. The window must lie inside the file.
    pub fn entry_preview<R: Read + Seek>(
        &self,
        reader: &mut ByteReader<R>,
    ) -> Result<Option<[u8; PREVIEW_LEN]>> {
        if !self.is_executable() {
            return Ok(None);
        }
        let Some(entry) = self.entry_point() else {
            return Ok(None);
        };
        if self.text_segment().is_none() {
            debug!("no {} segment, skipping entry preview", SEG_TEXT);
            return Ok(None);
        }

        reader.seek_to(entry.entryoff)?;
        Ok(Some(reader.read_array::<PREVIEW_LEN>()?))
    }
}

//! Mach-O binary structures.
//!
//! These structures mirror the on-disk records of a 64-bit little-endian
//! Mach-O file. Each record is decoded and encoded one field at a time with an
//! explicit size per field, so nothing depends on in-memory struct layout.

use std::fmt;
use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::constants::*;
use super::reader::ByteReader;
use crate::error::{Error, Result};
use crate::util::{encode_name, fixed_name, name_eq, NAME_LEN};

// =============================================================================
// Header Structures
// =============================================================================

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    /// Reads the header at the reader's current position.
    ///
    /// The magic is checked before any other byte is consumed; an unsupported
    /// signature fails with [`Error::BadMagic`] and leaves the cursor just past
    /// the four magic bytes.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        let magic = r.read_u32()?;
        if magic != MH_MAGIC_64 {
            return Err(Error::BadMagic(magic));
        }
        Ok(Self {
            magic,
            cputype: r.read_u32()?,
            cpusubtype: r.read_u32()?,
            filetype: r.read_u32()?,
            ncmds: r.read_u32()?,
            sizeofcmds: r.read_u32()?,
            flags: r.read_u32()?,
            reserved: r.read_u32()?,
        })
    }

    /// Encodes the header.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u32::<LittleEndian>(self.cputype)?;
        w.write_u32::<LittleEndian>(self.cpusubtype)?;
        w.write_u32::<LittleEndian>(self.filetype)?;
        w.write_u32::<LittleEndian>(self.ncmds)?;
        w.write_u32::<LittleEndian>(self.sizeofcmds)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_u32::<LittleEndian>(self.reserved)
    }

    /// Returns true if this is an object file.
    #[inline]
    pub fn is_object(&self) -> bool {
        self.filetype == MH_OBJECT
    }

    /// Returns true if this is an executable.
    #[inline]
    pub fn is_executable(&self) -> bool {
        self.filetype == MH_EXECUTE
    }

    /// Returns the header flags, ignoring unknown bits.
    #[inline]
    pub fn mach_flags(&self) -> MachOFlags {
        MachOFlags::from_bits_truncate(self.flags)
    }

    /// Returns the offset just past the load command block.
    #[inline]
    pub fn commands_end(&self) -> u64 {
        Self::SIZE as u64 + self.sizeofcmds as u64
    }

    /// Returns the architecture as a string.
    pub fn arch_name(&self) -> &'static str {
        match self.cputype {
            CPU_TYPE_ARM64 => "arm64",
            CPU_TYPE_X86_64 => "x86_64",
            CPU_TYPE_ARM => "arm",
            CPU_TYPE_X86 => "i386",
            _ => "unknown",
        }
    }

    /// Returns the file type as a string.
    pub fn filetype_name(&self) -> &'static str {
        match self.filetype {
            MH_OBJECT => "object",
            MH_EXECUTE => "executable",
            MH_DYLIB => "dylib",
            MH_DYLINKER => "dylinker",
            MH_BUNDLE => "bundle",
            _ => "other",
        }
    }
}

impl Default for MachHeader64 {
    fn default() -> Self {
        Self {
            magic: MH_MAGIC_64,
            cputype: 0,
            cpusubtype: 0,
            filetype: 0,
            ncmds: 0,
            sizeofcmds: 0,
            flags: 0,
            reserved: 0,
        }
    }
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;

    /// Reads the (tag, size) pair.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        Ok(Self {
            cmd: r.read_u32()?,
            cmdsize: r.read_u32()?,
        })
    }

    /// Encodes the (tag, size) pair.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.cmd)?;
        w.write_u32::<LittleEndian>(self.cmdsize)
    }
}

// =============================================================================
// Segment Command
// =============================================================================

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: u32,
    /// Size of this load command, including its sections
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file to map
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand64 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 72;

    /// Reads the fixed segment record.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        Ok(Self {
            cmd: r.read_u32()?,
            cmdsize: r.read_u32()?,
            segname: r.read_name()?,
            vmaddr: r.read_u64()?,
            vmsize: r.read_u64()?,
            fileoff: r.read_u64()?,
            filesize: r.read_u64()?,
            maxprot: r.read_u32()?,
            initprot: r.read_u32()?,
            nsects: r.read_u32()?,
            flags: r.read_u32()?,
        })
    }

    /// Encodes the fixed segment record (sections are written separately).
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.cmd)?;
        w.write_u32::<LittleEndian>(self.cmdsize)?;
        w.write_all(&self.segname)?;
        w.write_u64::<LittleEndian>(self.vmaddr)?;
        w.write_u64::<LittleEndian>(self.vmsize)?;
        w.write_u64::<LittleEndian>(self.fileoff)?;
        w.write_u64::<LittleEndian>(self.filesize)?;
        w.write_u32::<LittleEndian>(self.maxprot)?;
        w.write_u32::<LittleEndian>(self.initprot)?;
        w.write_u32::<LittleEndian>(self.nsects)?;
        w.write_u32::<LittleEndian>(self.flags)
    }

    /// Returns the segment name as a string.
    pub fn name(&self) -> &str {
        fixed_name(&self.segname)
    }

    /// Sets the segment name from a string.
    pub fn set_name(&mut self, name: &str) {
        self.segname = encode_name(name);
    }

    /// Returns true if this is the __TEXT segment.
    #[inline]
    pub fn is_text(&self) -> bool {
        name_eq(&self.segname, SEG_TEXT)
    }

    /// Returns the initial protection.
    #[inline]
    pub fn init_prot(&self) -> VmProt {
        VmProt::from_bits_truncate(self.initprot)
    }

    /// Returns the maximum protection.
    #[inline]
    pub fn max_prot(&self) -> VmProt {
        VmProt::from_bits_truncate(self.maxprot)
    }
}

impl Default for SegmentCommand64 {
    fn default() -> Self {
        Self {
            cmd: LC_SEGMENT_64,
            cmdsize: Self::SIZE as u32,
            segname: [0u8; NAME_LEN],
            vmaddr: 0,
            vmsize: 0,
            fileoff: 0,
            filesize: 0,
            maxprot: 0,
            initprot: 0,
            nsects: 0,
            flags: 0,
        }
    }
}

// =============================================================================
// Section
// =============================================================================

/// 64-bit section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section64 {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved (for runtime use)
    pub reserved1: u32,
    /// Reserved (for runtime use)
    pub reserved2: u32,
    /// Reserved
    pub reserved3: u32,
}

impl Section64 {
    /// Size of a section entry.
    pub const SIZE: usize = 80;

    /// Reads one section record.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        Ok(Self {
            sectname: r.read_name()?,
            segname: r.read_name()?,
            addr: r.read_u64()?,
            size: r.read_u64()?,
            offset: r.read_u32()?,
            align: r.read_u32()?,
            reloff: r.read_u32()?,
            nreloc: r.read_u32()?,
            flags: r.read_u32()?,
            reserved1: r.read_u32()?,
            reserved2: r.read_u32()?,
            reserved3: r.read_u32()?,
        })
    }

    /// Encodes one section record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.sectname)?;
        w.write_all(&self.segname)?;
        w.write_u64::<LittleEndian>(self.addr)?;
        w.write_u64::<LittleEndian>(self.size)?;
        w.write_u32::<LittleEndian>(self.offset)?;
        w.write_u32::<LittleEndian>(self.align)?;
        w.write_u32::<LittleEndian>(self.reloff)?;
        w.write_u32::<LittleEndian>(self.nreloc)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_u32::<LittleEndian>(self.reserved1)?;
        w.write_u32::<LittleEndian>(self.reserved2)?;
        w.write_u32::<LittleEndian>(self.reserved3)
    }

    /// Returns the section name as a string.
    pub fn name(&self) -> &str {
        fixed_name(&self.sectname)
    }

    /// Returns the segment name as a string.
    pub fn segment_name(&self) -> &str {
        fixed_name(&self.segname)
    }

    /// Sets the section name from a string.
    pub fn set_name(&mut self, name: &str) {
        self.sectname = encode_name(name);
    }

    /// Sets the owning segment name from a string.
    pub fn set_segment_name(&mut self, name: &str) {
        self.segname = encode_name(name);
    }

    /// Returns true if the section name field equals `name` exactly.
    #[inline]
    pub fn is_named(&self, name: &str) -> bool {
        name_eq(&self.sectname, name)
    }

    /// Returns the absolute end of the section's file range.
    #[inline]
    pub fn file_end(&self) -> Option<u64> {
        (self.offset as u64).checked_add(self.size)
    }
}

// =============================================================================
// Dylib Command
// =============================================================================

/// Dylib reference (shared by several load commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dylib {
    /// Library's path name offset, from the start of the load command
    pub name_offset: u32,
    /// Library's build timestamp
    pub timestamp: u32,
    /// Library's current version number
    pub current_version: u32,
    /// Library's compatibility version number
    pub compatibility_version: u32,
}

impl Dylib {
    /// Formats a packed `xxxx.yy.zz` version number.
    pub fn format_version(version: u32) -> String {
        format!(
            "{}.{}.{}",
            version >> 16,
            (version >> 8) & 0xFF,
            version & 0xFF
        )
    }
}

/// Dylib load command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DylibCommand {
    /// LC_LOAD_DYLIB, LC_ID_DYLIB, etc.
    pub cmd: u32,
    /// Total size (includes path string)
    pub cmdsize: u32,
    /// Library identification
    pub dylib: Dylib,
}

impl DylibCommand {
    /// Size of this command without the path string.
    pub const SIZE: usize = 24;

    /// Reads the fixed dylib record.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        Ok(Self {
            cmd: r.read_u32()?,
            cmdsize: r.read_u32()?,
            dylib: Dylib {
                name_offset: r.read_u32()?,
                timestamp: r.read_u32()?,
                current_version: r.read_u32()?,
                compatibility_version: r.read_u32()?,
            },
        })
    }

    /// Encodes the fixed dylib record (the path string is written separately).
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.cmd)?;
        w.write_u32::<LittleEndian>(self.cmdsize)?;
        w.write_u32::<LittleEndian>(self.dylib.name_offset)?;
        w.write_u32::<LittleEndian>(self.dylib.timestamp)?;
        w.write_u32::<LittleEndian>(self.dylib.current_version)?;
        w.write_u32::<LittleEndian>(self.dylib.compatibility_version)
    }
}

// =============================================================================
// Dylinker Command
// =============================================================================

/// Dynamic linker load command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DylinkerCommand {
    /// LC_LOAD_DYLINKER
    pub cmd: u32,
    /// Total size (includes path string)
    pub cmdsize: u32,
    /// Path name offset, from the start of the load command
    pub name_offset: u32,
}

impl DylinkerCommand {
    /// Size of this command without the path string.
    pub const SIZE: usize = 12;

    /// Encodes the fixed record (the path string is written separately).
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.cmd)?;
        w.write_u32::<LittleEndian>(self.cmdsize)?;
        w.write_u32::<LittleEndian>(self.name_offset)
    }
}

// =============================================================================
// Entry Point Command
// =============================================================================

/// Main entry point command (LC_MAIN).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPointCommand {
    /// LC_MAIN
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// File offset of the first instruction
    pub entryoff: u64,
    /// Initial stack size, 0 for the default
    pub stacksize: u64,
}

impl EntryPointCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;

    /// Reads the entry point record.
    pub fn read_from<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self> {
        Ok(Self {
            cmd: r.read_u32()?,
            cmdsize: r.read_u32()?,
            entryoff: r.read_u64()?,
            stacksize: r.read_u64()?,
        })
    }

    /// Encodes the entry point record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.cmd)?;
        w.write_u32::<LittleEndian>(self.cmdsize)?;
        w.write_u64::<LittleEndian>(self.entryoff)?;
        w.write_u64::<LittleEndian>(self.stacksize)
    }
}

impl Default for EntryPointCommand {
    fn default() -> Self {
        Self {
            cmd: LC_MAIN,
            cmdsize: Self::SIZE as u32,
            entryoff: 0,
            stacksize: 0,
        }
    }
}

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for MachHeader64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachO {{ arch: {}, type: {}, cmds: {}, sizeofcmds: {:#x}, flags: {:#x} }}",
            self.arch_name(),
            self.filetype_name(),
            self.ncmds,
            self.sizeofcmds,
            self.flags
        )
    }
}

impl fmt::Display for SegmentCommand64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment {{ name: \"{}\", vm: {:#x}+{:#x}, file: {:#x}+{:#x}, prot: {}/{}, sects: {} }}",
            self.name(),
            self.vmaddr,
            self.vmsize,
            self.fileoff,
            self.filesize,
            self.init_prot().to_rwx(),
            self.max_prot().to_rwx(),
            self.nsects
        )
    }
}

impl fmt::Display for Section64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Section {{ name: \"{},{}\", addr: {:#x}+{:#x}, offset: {:#x} }}",
            self.segment_name(),
            self.name(),
            self.addr,
            self.size,
            self.offset
        )
    }
}

impl fmt::Display for EntryPointCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntryPoint {{ offset: {:#x}, stack: {:#x} }}",
            self.entryoff, self.stacksize
        )
    }
}

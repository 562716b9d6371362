//! Mach-O constants and flags.

use bitflags::bitflags;

// =============================================================================
// Magic Numbers
// =============================================================================

/// 64-bit Mach-O magic (little-endian)
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;

/// 64-bit Mach-O magic (big-endian, needs byte swap)
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE;

/// 32-bit Mach-O magic (little-endian)
pub const MH_MAGIC: u32 = 0xFEEDFACE;

/// FAT binary magic
pub const FAT_MAGIC: u32 = 0xCAFEBABE;

// =============================================================================
// File Types
// =============================================================================

/// Object file
pub const MH_OBJECT: u32 = 0x1;
/// Executable
pub const MH_EXECUTE: u32 = 0x2;
/// Dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;
/// Dynamic link editor
pub const MH_DYLINKER: u32 = 0x7;
/// Bundle
pub const MH_BUNDLE: u32 = 0x8;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;

/// ARM CPU type
pub const CPU_TYPE_ARM: u32 = 12;
/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;

/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;

// =============================================================================
// CPU Subtypes
// =============================================================================

/// 64-bit libraries (capability bit in the subtype)
pub const CPU_SUBTYPE_LIB64: u32 = 0x8000_0000;
/// All x86 / x86_64 processors
pub const CPU_SUBTYPE_I386_ALL: u32 = 3;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command requiring dynamic linker
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Unix thread
pub const LC_UNIXTHREAD: u32 = 0x5;
/// Dynamic link-edit symbol table info
pub const LC_DYSYMTAB: u32 = 0xB;
/// Load a dynamically linked shared library
pub const LC_LOAD_DYLIB: u32 = 0xC;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Load a dynamic linker
pub const LC_LOAD_DYLINKER: u32 = 0xE;
/// 64-bit segment
pub const LC_SEGMENT_64: u32 = 0x19;
/// UUID
pub const LC_UUID: u32 = 0x1B;
/// Compressed dyld info only
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
/// Build for macOS min version
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
/// Main entry point (replacement for LC_UNIXTHREAD)
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
/// Source version
pub const LC_SOURCE_VERSION: u32 = 0x2A;
/// Build for platform min version
pub const LC_BUILD_VERSION: u32 = 0x32;

/// Returns a printable name for a load command tag.
pub fn load_command_name(cmd: u32) -> &'static str {
    match cmd {
        LC_SYMTAB => "LC_SYMTAB",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_UUID => "LC_UUID",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_MAIN => "LC_MAIN",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        _ => "unknown",
    }
}

// =============================================================================
// Canonical Names
// =============================================================================

/// Page zero segment
pub const SEG_PAGEZERO: &str = "__PAGEZERO";
/// Text segment
pub const SEG_TEXT: &str = "__TEXT";
/// Text section within the text segment
pub const SECT_TEXT: &str = "__text";
/// Link-edit segment
pub const SEG_LINKEDIT: &str = "__LINKEDIT";

// =============================================================================
// Section Attributes
// =============================================================================

/// Section contains only true machine instructions
pub const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;

/// Section contains some machine instructions
pub const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

// =============================================================================
// VM Protections
// =============================================================================

bitflags! {
    /// Virtual memory protection bits used by segment commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmProt: u32 {
        /// Read permission
        const READ = 0x1;
        /// Write permission
        const WRITE = 0x2;
        /// Execute permission
        const EXECUTE = 0x4;
        /// Read and write (VM_PROT_DEFAULT)
        const DEFAULT = Self::READ.bits() | Self::WRITE.bits();
        /// Read, write and execute (VM_PROT_ALL)
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl VmProt {
    /// Returns an `rwx`-style rendering.
    pub fn to_rwx(self) -> String {
        format!(
            "{}{}{}",
            if self.contains(VmProt::READ) { "r" } else { "-" },
            if self.contains(VmProt::WRITE) { "w" } else { "-" },
            if self.contains(VmProt::EXECUTE) { "x" } else { "-" },
        )
    }
}

// =============================================================================
// Header Flags
// =============================================================================

bitflags! {
    /// Mach-O header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MachOFlags: u32 {
        /// The object file has no undefined references
        const NOUNDEFS = 0x1;
        /// The object file is the output of an incremental link
        const INCRLINK = 0x2;
        /// The object file is input for the dynamic linker
        const DYLDLINK = 0x4;
        /// The object file's undefined references are bound by the dynamic linker
        const BINDATLOAD = 0x8;
        /// The file has its dynamic undefined references prebound
        const PREBOUND = 0x10;
        /// The image is using two-level name space bindings
        const TWOLEVEL = 0x80;
        /// Safe to divide up the sections into sub-sections via symbols for dead code stripping
        const SUBSECTIONS_VIA_SYMBOLS = 0x2000;
        /// When this bit is set, the OS will load the main executable at a random address
        const PIE = 0x200000;
    }
}

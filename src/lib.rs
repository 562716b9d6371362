//! macholite - Decode 64-bit Mach-O load commands and build minimal executables.
//!
//! Two paths share one header decoder and load command walker:
//!
//! - **Decode**: walk the load commands of an object file or executable and
//!   recover its segments, sections, entry point and library references.
//! - **Encode**: pull the raw `__text` bytes out of an object file and wrap
//!   them in a six-command executable the loader can run directly.
//!
//! # Example
//!
//! ```no_run
//! use macholite::{convert_object, inspect_file, ExecutableLayout};
//!
//! fn main() -> macholite::Result<()> {
//!     let inspection = inspect_file("/bin/ls")?;
//!     for dylib in inspection.context.dylibs() {
//!         println!("{}", dylib.name);
//!     }
//!
//!     convert_object("exit.o", "exit", &ExecutableLayout::default())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod converter;
pub mod error;
pub mod macho;
pub mod util;

// Re-export main types
pub use converter::{
    extract_text_section, synthesize_executable, write_executable, ExecutableLayout,
};
pub use error::{Error, ErrorKind, Result};
pub use macho::{ByteReader, MachOContext};

use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tracing::info;

use macho::{Dylib, LoadCommandInfo, PREVIEW_LEN};

/// Outcome of decoding one file.
#[derive(Debug)]
pub struct Inspection {
    /// Decoded header and load commands
    pub context: MachOContext,
    /// Bytes at the entry point, for executables with a `__TEXT` segment
    pub preview: Option<[u8; PREVIEW_LEN]>,
}

impl Inspection {
    /// Writes the diagnostic report.
    ///
    /// One lowercase hex line per library reference (its current version), in
    /// file order, then for executables one line of 32 space-separated hex
    /// bytes from the entry point.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for dylib in self.context.dylibs() {
            writeln!(out, "{:x}", dylib.current_version())?;
        }
        if let Some(preview) = &self.preview {
            for byte in preview {
                write!(out, "{:02x} ", byte)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes a human-readable summary of the header and every load command.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let ctx = &self.context;
        writeln!(out, "{}", ctx.header)?;
        let flags: Vec<&str> = ctx
            .header
            .mach_flags()
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        if !flags.is_empty() {
            writeln!(out, "  flags: {}", flags.join(" | "))?;
        }

        for (i, lc) in ctx.load_commands.iter().enumerate() {
            match lc {
                LoadCommandInfo::Segment(seg) => {
                    writeln!(out, "  [{:2}] {:#06x} {}", i, seg.command_offset, seg.command)?;
                    for sect in &seg.sections {
                        writeln!(out, "         {}", sect.section)?;
                    }
                }
                LoadCommandInfo::EntryPoint { command, offset } => {
                    writeln!(out, "  [{:2}] {:#06x} {}", i, offset, command)?;
                }
                LoadCommandInfo::Dylib(dylib) => {
                    writeln!(
                        out,
                        "  [{:2}] {:#06x} Dylib {{ name: \"{}\", current: {}, compat: {} }}",
                        i,
                        dylib.offset,
                        dylib.name,
                        Dylib::format_version(dylib.current_version()),
                        Dylib::format_version(dylib.compatibility_version())
                    )?;
                }
                LoadCommandInfo::Unknown {
                    cmd,
                    cmdsize,
                    offset,
                } => {
                    writeln!(
                        out,
                        "  [{:2}] {:#06x} {} ({:#x}), {} bytes",
                        i,
                        offset,
                        macho::load_command_name(*cmd),
                        cmd,
                        cmdsize
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Decodes a Mach-O byte source and reads the entry point preview.
pub fn inspect<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<Inspection> {
    let context = MachOContext::parse(reader)?;
    let preview = context.entry_preview(reader)?;
    Ok(Inspection { context, preview })
}

/// Decodes the Mach-O file at `path`.
pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<Inspection> {
    let mut reader = ByteReader::open(path)?;
    inspect(&mut reader)
}

/// Extracts the code of an object file and wraps it in an executable image.
pub fn convert<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    layout: &ExecutableLayout,
) -> Result<Vec<u8>> {
    let code = extract_text_section(reader)?;
    synthesize_executable(&code, layout)
}

/// Converts the object file at `input` into an executable at `output`.
///
/// The input is closed before the output is created. Returns the size of the
/// written file.
pub fn convert_object<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    layout: &ExecutableLayout,
) -> Result<usize> {
    let image = {
        let mut reader = ByteReader::open(input.as_ref())?;
        convert(&mut reader, layout)?
    };

    write_executable(output.as_ref(), &image)?;
    info!(
        "Converted {} -> {}",
        input.as_ref().display(),
        output.as_ref().display()
    );
    Ok(image.len())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use super::*;
    use crate::macho::fixtures;
    use crate::macho::*;

    fn open(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_report_for_synthesized_executable() {
        let image = synthesize_executable(&fixtures::EXIT_CODE, &ExecutableLayout::default())
            .unwrap();
        let inspection = inspect(&mut open(image)).unwrap();

        let mut out = Vec::new();
        inspection.write_report(&mut out).unwrap();
        let expected = "4ca0a01\n\
            b8 3c 00 00 00 0f 05 00 00 00 00 00 00 00 00 00 \
            00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 \n";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_report_for_object_has_no_preview() {
        let inspection = inspect(&mut open(fixtures::exit_object())).unwrap();
        assert!(inspection.preview.is_none());

        let mut out = Vec::new();
        inspection.write_report(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_executable_without_text_segment() {
        let bytes = fixtures::image(
            MH_EXECUTE,
            &[
                fixtures::segment("__DATA", &[], 0),
                fixtures::entry_point(0),
                fixtures::dylib(0x10000, "/usr/lib/libSystem.B.dylib"),
            ],
        );
        let inspection = inspect(&mut open(bytes)).unwrap();

        let mut out = Vec::new();
        inspection.write_report(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "10000\n");
    }

    #[test]
    fn test_summary_lists_every_command() {
        let image = synthesize_executable(&[], &ExecutableLayout::default()).unwrap();
        let inspection = inspect(&mut open(image)).unwrap();

        let mut out = Vec::new();
        inspection.write_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("MachO { arch: x86_64, type: executable, cmds: 6"));
        assert!(text.contains("\n  flags: NOUNDEFS\n"));
        assert!(text.contains("\"__TEXT,__text\""));
        assert!(text.contains("LC_LOAD_DYLINKER"));
        assert!(text.contains("name: \"/usr/lib/libSystem.B.dylib\", current: 1226.10.1"));
        assert!(text.contains("EntryPoint { offset: 0x1b8"));
    }

    #[test]
    fn test_convert_object_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("exit.o");
        let output = dir.path().join("exit");
        fs::write(&input, fixtures::exit_object()).unwrap();

        let written = convert_object(&input, &output, &ExecutableLayout::default()).unwrap();
        assert_eq!(written, 440 + 11 + 0x1000);

        let inspection = inspect_file(&output).unwrap();
        let text = inspection
            .context
            .text_segment()
            .and_then(|seg| seg.section(SECT_TEXT))
            .unwrap();
        assert_eq!(text.section.offset, 440);
        assert_eq!(text.section.size, 11);
        assert_eq!(&inspection.preview.unwrap()[..11], &fixtures::EXIT_CODE);
    }

    #[test]
    fn test_convert_missing_text_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.o");
        let output = dir.path().join("out");
        let sect = fixtures::section("__data", "__DATA", 0, 0);
        fs::write(&input, fixtures::image(MH_OBJECT, &[fixtures::segment("", &[sect], 0)]))
            .unwrap();

        let err = convert_object(&input, &output, &ExecutableLayout::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTextSection);
        assert_eq!(err.exit_code(), 2);
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect_file(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}

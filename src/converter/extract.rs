//! Extraction of raw machine code from an object file's `__text` section.

use std::io::{Read, Seek};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::macho::{
    ByteReader, LoadCommandWalker, MachHeader64, SegmentInfo, LC_SEGMENT_64, SECT_TEXT,
};

/// Decodes the first `LC_SEGMENT_64` command and its sections.
///
/// Commands before it are skipped by their declared size. Returns `None` if
/// the file has no segment command at all.
pub fn first_segment<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    header: &MachHeader64,
) -> Result<Option<SegmentInfo>> {
    let mut walker = LoadCommandWalker::new(reader, header);
    while let Some(lc) = walker.next_command()? {
        if lc.cmd == LC_SEGMENT_64 {
            return SegmentInfo::read_from(walker.reader(), lc.offset).map(Some);
        }
    }
    Ok(None)
}

/// Reads the bytes of the `__text` section of an object file.
///
/// Only the first segment command is searched; a `__text` section declared
/// under a later segment is reported as missing. The section's
/// `(offset, size)` range must lie within the file.
///
/// # Errors
///
/// * [`Error::BadMagic`] if the file is not a 64-bit Mach-O
/// * [`Error::NotObjectFile`] if the file type is not `MH_OBJECT`
/// * [`Error::MissingTextSection`] if no matching section exists
/// * [`Error::OutOfBounds`] if the section range runs past the end of the file
pub fn extract_text_section<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<Vec<u8>> {
    reader.seek_to(0)?;
    let header = MachHeader64::read_from(reader)?;
    if !header.is_object() {
        return Err(Error::NotObjectFile {
            filetype: header.filetype,
        });
    }

    let Some(segment) = first_segment(reader, &header)? else {
        debug!("object file has no segment command");
        return Err(Error::MissingTextSection);
    };

    let Some(text) = segment.section(SECT_TEXT) else {
        debug!(
            "first segment '{}' has no {} among {} sections",
            segment.name(),
            SECT_TEXT,
            segment.sections.len()
        );
        return Err(Error::MissingTextSection);
    };

    let section = &text.section;
    let end = section
        .file_end()
        .ok_or_else(|| Error::out_of_bounds(u64::MAX, reader.len()))?;
    if end > reader.len() {
        return Err(Error::out_of_bounds(end, reader.len()));
    }

    reader.seek_to(section.offset as u64)?;
    let code = reader.read_bytes(section.size)?;

    info!(
        "Extracted {} bytes from {} at {:#x}",
        code.len(),
        text.full_name(),
        section.offset
    );

    Ok(code)
}

//! Load command iteration with mandatory re-synchronization.
//!
//! The walker never trusts a command decoder to consume the right number of
//! bytes. Before handing out command `i + 1` it seeks to
//! `offset(i) + cmdsize(i)`, whatever the decoder for command `i` did.

use std::io::{Read, Seek};

use tracing::trace;

use super::constants::load_command_name;
use super::reader::ByteReader;
use super::structs::{LoadCommand, MachHeader64};
use crate::error::{Error, Result};

/// Position and generic header of one load command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCommandHeader {
    /// Absolute offset of the command in the file
    pub offset: u64,
    /// Type of load command
    pub cmd: u32,
    /// Declared size of the command
    pub cmdsize: u32,
}

impl LoadCommandHeader {
    /// Returns the only valid start of the next command.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.cmdsize as u64
    }
}

/// Iterates the load commands declared by a header.
///
/// Each call to [`next_command`](Self::next_command) leaves the cursor at the
/// start of the returned command, ready for a fixed-size decoder.
#[derive(Debug)]
pub struct LoadCommandWalker<'a, R> {
    reader: &'a mut ByteReader<R>,
    remaining: u32,
    next_offset: u64,
    commands_end: u64,
}

impl<'a, R: Read + Seek> LoadCommandWalker<'a, R> {
    /// Creates a walker over the command block following `header`.
    pub fn new(reader: &'a mut ByteReader<R>, header: &MachHeader64) -> Self {
        Self {
            reader,
            remaining: header.ncmds,
            next_offset: MachHeader64::SIZE as u64,
            commands_end: header.commands_end(),
        }
    }

    /// Returns the underlying reader for command decoders.
    #[inline]
    pub fn reader(&mut self) -> &mut ByteReader<R> {
        self.reader
    }

    /// Advances to the next command.
    ///
    /// Returns `None` once `ncmds` commands have been visited.
    pub fn next_command(&mut self) -> Result<Option<LoadCommandHeader>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let offset = self.next_offset;
        self.reader.seek_to(offset)?;
        let lc = LoadCommand::read_from(self.reader)?;

        if (lc.cmdsize as usize) < LoadCommand::SIZE {
            return Err(Error::malformed(
                offset,
                format!("load command size {} is smaller than its header", lc.cmdsize),
            ));
        }

        let header = LoadCommandHeader {
            offset,
            cmd: lc.cmd,
            cmdsize: lc.cmdsize,
        };
        if header.end() > self.reader.len() {
            return Err(Error::LoadCommandOverflow {
                offset,
                cmdsize: lc.cmdsize,
            });
        }

        trace!(
            "load command {} ({:#x}) at {:#x}, size {:#x}",
            load_command_name(lc.cmd),
            lc.cmd,
            offset,
            lc.cmdsize
        );

        self.reader.seek_to(offset)?;
        self.next_offset = header.end();
        self.remaining -= 1;

        Ok(Some(header))
    }

    /// Re-synchronizes after the last command and checks that the walk ended
    /// exactly at `32 + sizeofcmds`.
    pub fn finish(self) -> Result<()> {
        self.reader.seek_to(self.next_offset)?;
        let actual = self.reader.tell()?;
        if actual != self.commands_end {
            return Err(Error::CommandSizeMismatch {
                expected: self.commands_end,
                actual,
            });
        }
        Ok(())
    }
}

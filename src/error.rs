//! Error types for Mach-O decoding and executable synthesis.
//!
//! Every failure at the byte-source boundary is surfaced as a typed error.
//! Nothing is retried: the format is deterministic, so a second parse of the
//! same bytes gives the same answer.
//!
//! Wrapped I/O errors are exposed through [`std::error::Error::source`] and
//! are not repeated in the message. Paths are carried as fields for callers
//! to report.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for Mach-O operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("failed to open file")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("offset {offset:#x} is past the end of the file (size: {len:#x})")]
    OutOfBounds { offset: u64, len: u64 },

    // ==================== Mach-O Errors ====================
    #[error("unsupported or unrecognized format {0:#010x}")]
    BadMagic(u32),

    #[error("is not an object file (file type {filetype:#x})")]
    NotObjectFile { filetype: u32 },

    #[error("couldn't find text section in file")]
    MissingTextSection,

    #[error("load command at offset {offset:#x} with size {cmdsize:#x} extends beyond end of file")]
    LoadCommandOverflow { offset: u64, cmdsize: u32 },

    #[error("load commands end at {actual:#x}, header declares {expected:#x}")]
    CommandSizeMismatch { expected: u64, actual: u64 },

    #[error("malformed input at offset {offset:#x}: {reason}")]
    Malformed { offset: u64, reason: String },

    // ==================== Synthesis Errors ====================
    #[error("{what} of {size:#x} bytes does not fit the executable layout")]
    LayoutOverflow { what: &'static str, size: u64 },
}

/// A specialized Result type for Mach-O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classes used for reporting and process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Leading signature is not the 64-bit native magic.
    BadMagic,
    /// Extraction was requested on a file that is not an object file.
    NotObjectKind,
    /// No section matched the canonical text section name.
    MissingTextSection,
    /// Open/read/write/seek failure, or input too malformed to walk.
    IoFailure,
}

impl Error {
    /// Returns the coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadMagic(_) => ErrorKind::BadMagic,
            Error::NotObjectFile { .. } => ErrorKind::NotObjectKind,
            Error::MissingTextSection => ErrorKind::MissingTextSection,
            Error::Io(_)
            | Error::FileOpen { .. }
            | Error::FileWrite { .. }
            | Error::OutOfBounds { .. }
            | Error::LoadCommandOverflow { .. }
            | Error::CommandSizeMismatch { .. }
            | Error::Malformed { .. }
            | Error::LayoutOverflow { .. } => ErrorKind::IoFailure,
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// A missing text section is the only failure with its own code (2);
    /// everything else exits with 1.
    #[inline]
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::MissingTextSection => 2,
            _ => 1,
        }
    }

    /// Creates a malformed-input error with a formatted message.
    #[inline]
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Error::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an out-of-bounds error.
    #[inline]
    pub fn out_of_bounds(offset: u64, len: u64) -> Self {
        Error::OutOfBounds { offset, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::MissingTextSection.exit_code(), 2);
        assert_eq!(Error::BadMagic(0xCAFEBABE).exit_code(), 1);
        assert_eq!(Error::NotObjectFile { filetype: 2 }.exit_code(), 1);
        assert_eq!(Error::out_of_bounds(0x2000, 0x100).exit_code(), 1);
    }

    #[test]
    fn test_kinds() {
        let io = Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert_eq!(io.kind(), ErrorKind::IoFailure);
        assert_eq!(Error::malformed(8, "zero-sized").kind(), ErrorKind::IoFailure);
        assert_eq!(Error::BadMagic(0).kind(), ErrorKind::BadMagic);
    }

    #[test]
    fn test_wrapped_source_not_repeated() {
        use std::error::Error as _;

        let err = Error::FileWrite {
            path: PathBuf::from("/missing/a.out"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_string(), "failed to write output file");
        assert!(err.source().is_some());

        let err = Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert_eq!(err.to_string(), "I/O error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_bad_magic_message() {
        assert_eq!(
            Error::BadMagic(0xfeedface).to_string(),
            "unsupported or unrecognized format 0xfeedface"
        );
    }
}

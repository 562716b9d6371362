//! File writer for synthesized executables.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Writes a fully assembled executable image to `output_path`.
///
/// The file is created only once the bytes are ready. On Unix it is marked
/// executable. If writing fails part way, the partial file is removed.
pub fn write_executable<P: AsRef<Path>>(output_path: P, image: &[u8]) -> Result<()> {
    let path = output_path.as_ref();

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o755);
    }

    let file = options.open(path).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut writer = BufWriter::new(file);
    let result = writer.write_all(image).and_then(|_| writer.flush());

    if let Err(e) = result {
        drop(writer);
        let _ = fs::remove_file(path);
        return Err(Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        });
    }

    info!("Wrote {} bytes to {}", image.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.out");

        write_executable(&path, b"\xcf\xfa\xed\xfe").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"\xcf\xfa\xed\xfe");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("a.out");

        let err = write_executable(&path, b"x").unwrap_err();
        assert!(matches!(err, Error::FileWrite { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}

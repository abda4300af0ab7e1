//! Canvas export as binary PGM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Default output path.
pub const DEFAULT_OUTPUT: &str = "image.pgm";

/// Write `pixels` as a `P5` (binary, maxval 255) grayscale image.
///
/// # Errors
///
/// `Error::InvalidJob` if `pixels` is not `width × height` bytes,
/// `Error::Io` if the file cannot be written.
pub fn write_pgm(path: impl AsRef<Path>, width: usize, height: usize, pixels: &[u8]) -> Result<()> {
    if pixels.len() != width * height {
        return Err(Error::InvalidJob(format!(
            "{} pixels for a {}x{} image",
            pixels.len(),
            width,
            height
        )));
    }
    let mut out = BufWriter::new(File::create(path.as_ref())?);
    write!(out, "P5\n{} {}\n255\n", width, height)?;
    out.write_all(pixels)?;
    out.flush()?;
    tracing::debug!(path = %path.as_ref().display(), width, height, "image written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_pgm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pgm");

        write_pgm(&path, 3, 2, &[0, 1, 2, 253, 254, 255]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = b"P5\n3 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0, 1, 2, 253, 254, 255]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pgm");
        assert!(write_pgm(&path, 2, 2, &[0; 3]).is_err());
        assert!(!path.exists());
    }
}

//! Content hash calculation.

use crate::core::error::{Error, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Streaming hash calculator producing the 128-bit content digest used for
/// signature matching.
pub struct HashCalculator;

impl HashCalculator {
    /// Calculate the digest of a file without loading it into memory.
    pub fn digest_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut hasher = Md5::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_read(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Calculate the digest of a byte slice.
    pub fn digest_bytes(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify a file matches an expected digest.
    pub fn verify(path: &Path, expected: &str) -> Result<bool> {
        let actual = Self::digest_file(path)?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_digest_bytes() {
        // Test vector: MD5("hello")
        let hash = HashCalculator::digest_bytes(b"hello");
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_digest_empty() {
        // Test vector: MD5("")
        let hash = HashCalculator::digest_bytes(b"");
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_digest_file_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let from_file = HashCalculator::digest_file(file.path()).unwrap();
        let from_bytes = HashCalculator::digest_bytes(b"test content");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_verify() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        assert!(
            HashCalculator::verify(file.path(), "5D41402ABC4B2A76B9719D911017C592").unwrap()
        );
        assert!(!HashCalculator::verify(file.path(), "not_a_hash").unwrap());
    }

    #[test]
    fn test_missing_file() {
        let err = HashCalculator::digest_file(Path::new("/nonexistent/file")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}

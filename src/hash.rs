// src/hash.rs

//! Content fingerprints for change detection
//!
//! Fingerprints only detect that a file changed between two runs; they are
//! not a security boundary.

use crate::error::{Result, io_err};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read size for streaming a file through the hasher
const BLOCK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 of a file's content
///
/// The file is streamed in fixed-size blocks so memory use does not grow
/// with file size. A path that does not exist yields an empty fingerprint.
pub fn hash_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }

    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];

    loop {
        let read = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_known_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"first").unwrap();

        let first = hash_file(&path).unwrap();
        assert_eq!(first, hash_file(&path).unwrap());

        std::fs::write(&path, b"second").unwrap();
        assert_ne!(first, hash_file(&path).unwrap());
    }

    #[test]
    fn test_hash_spans_multiple_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let content: Vec<u8> = (0..(BLOCK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let expected = format!("{:x}", Sha256::digest(&content));
        assert_eq!(hash_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_hash_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(hash_file(&dir.path().join("missing")).unwrap(), "");
    }
}

//! Content hashing for the triggering-file idempotency guard. Grounded
//! on the original system's `get_file_hash`/`get_dir_hash` pair, reduced
//! to the single SHA-256 algorithm the original actually exposes.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file's contents. Mirrors `_get_file_sha256`.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(hash_bytes(&bytes))
}

/// Hash a directory's listing rather than its contents, matching the
/// original's deliberately shallow `_get_dir_sha256` (its own TODO notes
/// this should be more robust; we keep the same limitation).
pub fn hash_dir_listing(path: &Path) -> Result<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .map_err(|e| Error::io(path, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    Ok(hash_bytes(format!("{:?}", names).as_bytes()))
}

pub fn hash_path(path: &Path) -> Result<String> {
    if path.is_file() {
        hash_file(path)
    } else {
        hash_dir_listing(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_same_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"content").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"content"));
    }
}

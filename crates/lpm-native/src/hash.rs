//! SHA-256 content digests of in-memory buffers and files.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::{Error, Result};

/// Files are streamed through the digest in chunks of this size.
pub const CHUNK_SIZE: usize = 4096;

/// A 32-byte SHA-256 value. Displays as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// How the `hash` capability interprets its input string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// Digest the bytes themselves.
    #[default]
    String,
    /// Treat the input as a path and digest the file's contents.
    File,
}

impl HashMode {
    /// Anything other than `"file"` means string mode.
    pub fn parse(mode: &str) -> Self {
        if mode == "file" {
            HashMode::File
        } else {
            HashMode::String
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HashInput<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

pub fn hash(input: HashInput<'_>) -> Result<Digest> {
    match input {
        HashInput::Bytes(bytes) => Ok(hash_bytes(bytes)),
        HashInput::File(path) => hash_file(path),
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Digest {
    Digest(Sha256::digest(bytes).into())
}

pub fn hash_file(path: &Path) -> Result<Digest> {
    let display = path.display().to_string();
    log::debug!("Hashing {}", display);
    let file = File::open(path).map_err(|source| Error::fs("open", display.as_str(), source))?;
    hash_reader(file).map_err(|source| Error::fs("read", display, source))
}

/// Digest everything `reader` yields, [`CHUNK_SIZE`] bytes at a time.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => hasher.update(&chunk[..read]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Digest(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_bytes_known_vectors() {
        assert_eq!(
            hash_bytes(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_bytes(b"hello world").to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hash_hello_lpm() {
        let digest = hash(HashInput::Bytes(b"hello lpm!")).unwrap();
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(digest, hash_bytes("hello lpm!".as_bytes()));
    }

    #[test]
    fn test_hash_file_matches_bytes_across_chunk_boundaries() {
        for size in [0, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 3 * CHUNK_SIZE + 17] {
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let file = NamedTempFile::new().unwrap();
            std::fs::write(file.path(), &data).unwrap();

            let from_file = hash(HashInput::File(file.path())).unwrap();
            assert_eq!(from_file, hash_bytes(&data), "size {}", size);
        }
    }

    #[test]
    fn test_hash_reader_handles_short_reads() {
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.0.len().min(buf.len()).min(7);
                buf[..n].copy_from_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Ok(n)
            }
        }

        let data = vec![42u8; 10_000];
        assert_eq!(hash_reader(Trickle(&data)).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn test_hash_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let error = hash(HashInput::File(&missing)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().starts_with("can't open "));
    }

    #[test]
    fn test_hash_mode_parse() {
        assert_eq!(HashMode::parse("file"), HashMode::File);
        assert_eq!(HashMode::parse("string"), HashMode::String);
        assert_eq!(HashMode::parse("anything"), HashMode::String);
    }
}

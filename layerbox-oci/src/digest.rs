use sha2::{Digest, Sha256};
use std::io::Read;

use crate::{OciError, Result};

/// Compute the SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// Strip a leading `sha256:` algorithm prefix, returning the bare hex.
pub fn strip_algorithm(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

/// Verify that `data` hashes to `expected` (with or without algorithm prefix).
pub fn verify(what: &'static str, data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    let expected = strip_algorithm(expected);
    if actual != expected {
        return Err(OciError::DigestMismatch {
            what,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A reader that hashes everything read through it.
pub(crate) struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub(crate) fn hex(self) -> String {
        hex_encode(&self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA);
    }

    #[test]
    fn strip_prefix_only_when_present() {
        assert_eq!(strip_algorithm("sha256:abc"), "abc");
        assert_eq!(strip_algorithm("abc"), "abc");
    }

    #[test]
    fn verify_reports_mismatch() {
        assert!(verify("blob", b"", &format!("sha256:{}", EMPTY_SHA)).is_ok());
        match verify("blob", b"x", EMPTY_SHA) {
            Err(OciError::DigestMismatch { what, expected, .. }) => {
                assert_eq!(what, "blob");
                assert_eq!(expected, EMPTY_SHA);
            }
            other => panic!("expected DigestMismatch, got {:?}", other),
        }
    }

    #[test]
    fn hashing_reader_matches_one_shot_digest() {
        let data = b"hello layer".to_vec();
        let mut reader = HashingReader::new(&data[..]);
        std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        assert_eq!(reader.hex(), sha256_hex(&data));
    }
}

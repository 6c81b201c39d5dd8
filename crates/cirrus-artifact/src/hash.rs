//! SHA-256 content hashing.
//!
//! Hashes are computed while bytes stream through, so packaging never
//! holds a whole archive in memory.

use std::io::{self, Write};

use cirrus_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// Writer that hashes every byte it forwards to `inner`.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Returns the wrapped writer, the digest, and the number of bytes seen.
    pub fn finish(self) -> (W, Sha256Hash, u64) {
        let digest = self.hasher.finalize();
        (self.inner, Sha256Hash::from_digest(&digest), self.bytes)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

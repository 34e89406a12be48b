use std::io::{Read, Result};

/// Read adapter that feeds every byte it passes through into a digest.
pub struct HashingReader<R: Read, H: DigestSink> {
    inner: R,
    hasher: H,
    pub counted: u64,
}

/// The minimal surface the checksum verifier needs from a hasher.
pub trait DigestSink {
    fn absorb(&mut self, buf: &[u8]);
    fn finish_hex(self) -> String;
}

impl DigestSink for blake3::Hasher {
    fn absorb(&mut self, buf: &[u8]) {
        self.update(buf);
    }
    fn finish_hex(self) -> String {
        self.finalize().to_hex().to_string()
    }
}

impl DigestSink for sha2::Sha256 {
    fn absorb(&mut self, buf: &[u8]) {
        sha2::Digest::update(self, buf);
    }
    fn finish_hex(self) -> String {
        hex::encode(sha2::Digest::finalize(self))
    }
}

impl DigestSink for md5::Md5 {
    fn absorb(&mut self, buf: &[u8]) {
        md5::Digest::update(self, buf);
    }
    fn finish_hex(self) -> String {
        hex::encode(md5::Digest::finalize(self))
    }
}

impl<R: Read, H: DigestSink> HashingReader<R, H> {
    pub fn new(inner: R, hasher: H) -> Self {
        Self {
            inner,
            hasher,
            counted: 0,
        }
    }

    /// Drain the remaining input and return the hex digest.
    pub fn finish(mut self) -> Result<String> {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
        }
        Ok(self.hasher.finish_hex())
    }
}

impl<R: Read, H: DigestSink> Read for HashingReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.absorb(&buf[..n]);
        self.counted += n as u64;
        Ok(n)
    }
}

//! Content identity of a binary image.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::debug;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const CHUNK_SIZE: usize = 8192;

/// Incremental 64-bit FNV-1a.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Fnv1a {
    #[must_use]
    pub const fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    #[must_use]
    pub const fn finish(self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_reader(mut reader: impl Read) -> io::Result<u64> {
    let mut hasher = Fnv1a::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(hasher.finish()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
}

/// Checksum a file's contents. `None` if it cannot be read.
#[must_use]
pub fn compute_checksum(path: &Path) -> Option<u64> {
    let result = File::open(path).and_then(hash_reader);
    match result {
        Ok(sum) => Some(sum),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "checksum unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(Fnv1a::new().finish(), 0xcbf2_9ce4_8422_2325);

        let mut h = Fnv1a::new();
        h.update(b"a");
        assert_eq!(h.finish(), 0xaf63_dc4c_8601_ec8c);

        let mut h = Fnv1a::new();
        h.update(b"foobar");
        assert_eq!(h.finish(), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        let mut whole = Fnv1a::new();
        whole.update(&data);
        assert_eq!(hash_reader(&data[..]).unwrap(), whole.finish());
    }

    #[test]
    fn test_compute_checksum_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.bin");
        std::fs::write(&path, b"foobar").unwrap();
        assert_eq!(compute_checksum(&path), Some(0x8594_4171_f739_67e8));
        assert_eq!(compute_checksum(&dir.path().join("missing.bin")), None);
    }
}

use crate::constants::hash::{FNV1A64_OFFSET, FNV1A64_PRIME};
use crate::types::{ExampleIndex, Fingerprint};

/// Platform-stable FNV-1a 64-bit hasher.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a64 {
    state: u64,
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self {
            state: FNV1A64_OFFSET,
        }
    }
}

impl Fnv1a64 {
    pub fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV1A64_PRIME);
        }
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hasher = Fnv1a64::default();
    hasher.update(bytes);
    hasher.finish()
}

/// Fingerprint of an ascending index list (little-endian `u64` words).
pub fn index_fingerprint<'a>(indices: impl IntoIterator<Item = &'a ExampleIndex>) -> Fingerprint {
    let mut hasher = Fnv1a64::default();
    for index in indices {
        hasher.update(&index.to_le_bytes());
    }
    format!("{:016x}", hasher.finish())
}

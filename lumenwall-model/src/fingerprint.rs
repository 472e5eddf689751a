use sha2::{Digest, Sha256};

use crate::storage_key::StorageKey;

/// SHA-256 of a [`StorageKey`]'s textual form.
///
/// Deterministic and stateless: the same descriptor always produces the same
/// fingerprint, the same shard path, and the same origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(key: &StorageKey) -> Self {
        let digest = Sha256::digest(key.as_str().as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The three shard bytes used verbatim as nested directory names.
    pub fn shard(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Lowercase hex of the three shard bytes, in order: `(hh1, hh2, hh3)`.
    pub fn shard_hex(&self) -> (String, String, String) {
        let shard = self.shard();
        (
            hex::encode([shard[0]]),
            hex::encode([shard[1]]),
            hex::encode([shard[2]]),
        )
    }

    /// Full lowercase hex of the fingerprint, used in origin URL construction.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_bytes_match_hash_prefix() {
        let key = StorageKey::for_test("01234567-89ab-cdef-0123-456789abcdef");
        let fp = Fingerprint::of(&key);
        let full = Sha256::digest(key.as_str().as_bytes());
        assert_eq!(fp.shard(), [full[0], full[1], full[2]]);
        let (a, b, c) = fp.shard_hex();
        assert_eq!(format!("{a}{b}{c}"), hex::encode(&full[0..3]));
    }
}

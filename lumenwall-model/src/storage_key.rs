use std::fmt;

use uuid::Uuid;

/// The 16-byte opaque storage identifier carried in an [`AssetDescriptor`](crate::descriptor::AssetDescriptor).
///
/// Treated as an opaque byte string end to end; it is UUID-*shaped* only
/// because that gives a free, collision-resistant 36-character textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetId(pub [u8; 16]);

impl AssetId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Canonical 36-character textual form used everywhere else in the
    /// system (vault paths, origin URLs, failure-tracker keys).
    pub fn storage_key(&self) -> StorageKey {
        StorageKey(Uuid::from_bytes(self.0).hyphenated().to_string())
    }
}

/// Canonical 36-char textual form of an [`AssetId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageKey(String);

impl StorageKey {
    pub const LEN: usize = 36;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
impl StorageKey {
    pub(crate) fn for_test(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_is_36_chars_and_stable() {
        let id = AssetId::from_bytes([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45,
            0x67, 0x89, 0xab, 0xcd, 0xef,
        ]);
        let key = id.storage_key();
        assert_eq!(key.as_str().len(), StorageKey::LEN);
        assert_eq!(key.as_str(), id.storage_key().as_str());
    }
}

//! Per-channel catalog index: a flat, fixed-record binary stream mirrored to
//! local storage by an external refresh subsystem, and the registry that
//! maps channel ids to loaded handles.

use std::collections::HashMap;
use std::path::Path;

use lumenwall_model::{AssetDescriptor, ChannelId, RECORD_LEN};
use tracing::warn;

use crate::error::{FrameError, Result};

/// One channel's catalog, parsed into fixed-size descriptor records.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    descriptors: Vec<AssetDescriptor>,
}

impl ChannelHandle {
    /// Parse a raw catalog stream. The file size must be a multiple of
    /// [`RECORD_LEN`]; otherwise the channel is unavailable this epoch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % RECORD_LEN != 0 {
            return Err(FrameError::InvalidResponse(format!(
                "catalog stream length {} is not a multiple of {RECORD_LEN}",
                bytes.len()
            )));
        }

        let mut descriptors = Vec::with_capacity(bytes.len() / RECORD_LEN);
        for chunk in bytes.chunks_exact(RECORD_LEN) {
            match AssetDescriptor::parse(chunk) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => {
                    warn!(%err, "skipping malformed catalog record");
                }
            }
        }
        Ok(Self { descriptors })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(FrameError::IoFailure)?;
        Self::from_bytes(&bytes)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Advance `cursor` forward, returning the next descriptor in stream
    /// order, or `None` at end of stream. Whether that descriptor is
    /// already present in the vault is the caller's concern (the scheduler
    /// checks `Vault::exists` itself); this keeps the catalog index a pure,
    /// stateless scan rather than duplicating a second availability index.
    pub fn next_missing(&self, cursor: &mut usize) -> Option<AssetDescriptor> {
        let descriptor = self.descriptors.get(*cursor).cloned();
        if descriptor.is_some() {
            *cursor += 1;
        }
        descriptor
    }
}

/// Maps channel ids to their loaded catalog handle. A channel absent from
/// the registry (no local index file yet) is silently skipped by the
/// scheduler rather than treated as an error.
#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    handles: HashMap<ChannelId, ChannelHandle>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ChannelId, handle: ChannelHandle) {
        self.handles.insert(id, handle);
    }

    pub fn remove(&mut self, id: &ChannelId) {
        self.handles.remove(id);
    }

    pub fn find(&self, id: &ChannelId) -> Option<&ChannelHandle> {
        self.handles.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwall_model::{AssetId, ContainerTag, EntryKind};

    fn sample_record(byte_fill: u8) -> [u8; RECORD_LEN] {
        AssetDescriptor {
            id: AssetId::from_bytes([byte_fill; 16]),
            container: ContainerTag::Png,
            kind: EntryKind::Artwork,
            reserved: [0u8; RECORD_LEN - 18],
        }
        .to_record()
    }

    #[test]
    fn parses_multiple_records_and_advances_cursor() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&sample_record(1));
        bytes.extend_from_slice(&sample_record(2));
        let handle = ChannelHandle::from_bytes(&bytes).unwrap();
        assert_eq!(handle.len(), 2);

        let mut cursor = 0usize;
        let first = handle.next_missing(&mut cursor).unwrap();
        assert_eq!(first.id.as_bytes(), &[1u8; 16]);
        assert_eq!(cursor, 1);

        let second = handle.next_missing(&mut cursor).unwrap();
        assert_eq!(second.id.as_bytes(), &[2u8; 16]);
        assert_eq!(cursor, 2);

        assert!(handle.next_missing(&mut cursor).is_none());
    }

    #[test]
    fn rejects_stream_not_a_multiple_of_record_len() {
        let bytes = vec![0u8; RECORD_LEN + 1];
        assert!(ChannelHandle::from_bytes(&bytes).is_err());
    }

    #[test]
    fn registry_lookup_misses_are_not_errors() {
        let registry = ChannelRegistry::new();
        let id = ChannelId::new("missing").unwrap();
        assert!(registry.find(&id).is_none());
    }
}

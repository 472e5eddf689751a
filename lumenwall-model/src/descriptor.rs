use crate::container::{ContainerTag, EntryKind};
use crate::error::ModelError;
use crate::storage_key::AssetId;

/// Fixed-size 64-byte catalog record.
///
/// Layout: byte 0..15 storage identifier, byte 16 container tag, byte 17
/// entry kind, bytes 18..63 reserved for caller-defined use.
pub const RECORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub id: AssetId,
    pub container: ContainerTag,
    pub kind: EntryKind,
    pub reserved: [u8; RECORD_LEN - 18],
}

impl AssetDescriptor {
    /// Parse one fixed-size record. Callers are responsible for handing in
    /// exactly [`RECORD_LEN`] bytes; the channel index enforces the
    /// file-size-is-a-multiple-of-64 rule before this is ever called.
    pub fn parse(record: &[u8]) -> Result<Self, ModelError> {
        if record.len() != RECORD_LEN {
            return Err(ModelError::MalformedRecord(format!(
                "expected {RECORD_LEN}-byte record, got {}",
                record.len()
            )));
        }

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&record[0..16]);
        let container = ContainerTag::from_byte(record[16])?;
        let kind = EntryKind::from_byte(record[17])?;
        let mut reserved = [0u8; RECORD_LEN - 18];
        reserved.copy_from_slice(&record[18..]);

        Ok(Self {
            id: AssetId::from_bytes(id_bytes),
            container,
            kind,
            reserved,
        })
    }

    /// Encode back into a fixed-size record, inverse of [`Self::parse`].
    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[0..16].copy_from_slice(self.id.as_bytes());
        record[16] = self.container.as_byte();
        record[17] = self.kind.as_byte();
        record[18..].copy_from_slice(&self.reserved);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetDescriptor {
        AssetDescriptor {
            id: AssetId::from_bytes([7; 16]),
            container: ContainerTag::Gif,
            kind: EntryKind::Artwork,
            reserved: [0; RECORD_LEN - 18],
        }
    }

    #[test]
    fn round_trips_through_record_bytes() {
        let d = sample();
        let record = d.to_record();
        assert_eq!(record.len(), RECORD_LEN);
        let parsed = AssetDescriptor::parse(&record).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = AssetDescriptor::parse(&[0u8; 10]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_container_tag() {
        let mut record = sample().to_record();
        record[16] = 9;
        assert!(AssetDescriptor::parse(&record).is_err());
    }
}

use std::fmt;

use crate::error::ModelError;

/// Maximum channels the scheduler will track at once (§3 Channel State).
pub const MAX_CHANNELS: usize = 16;

/// UTF-8 channel identifier, bounded to 63 bytes per the data model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId(String);

impl ChannelId {
    pub const MAX_LEN: usize = 63;

    pub fn new(id: impl Into<String>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.is_empty() || id.len() > Self::MAX_LEN {
            return Err(ModelError::InvalidChannelId(format!(
                "channel id must be 1..={} bytes, got {}",
                Self::MAX_LEN,
                id.len()
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_ids() {
        assert!(ChannelId::new("").is_err());
        assert!(ChannelId::new("a".repeat(64)).is_err());
        assert!(ChannelId::new("a".repeat(63)).is_ok());
    }
}

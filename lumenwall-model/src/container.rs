use std::fmt;

use crate::error::ModelError;

/// Container format tag carried in byte 16 of an [`AssetDescriptor`](crate::descriptor::AssetDescriptor) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerTag {
    AnimatedWebp,
    Gif,
    Png,
    Jpeg,
}

impl ContainerTag {
    /// Decode the raw catalog byte. Unknown values are rejected rather than
    /// silently mapped, since they would otherwise corrupt vault paths.
    pub fn from_byte(byte: u8) -> Result<Self, ModelError> {
        match byte {
            0 => Ok(ContainerTag::AnimatedWebp),
            1 => Ok(ContainerTag::Gif),
            2 => Ok(ContainerTag::Png),
            3 => Ok(ContainerTag::Jpeg),
            other => Err(ModelError::MalformedRecord(format!(
                "unknown container tag byte {other}"
            ))),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ContainerTag::AnimatedWebp => 0,
            ContainerTag::Gif => 1,
            ContainerTag::Png => 2,
            ContainerTag::Jpeg => 3,
        }
    }

    /// Vault file extension for this container, per the glossary mapping.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerTag::AnimatedWebp => "webp",
            ContainerTag::Gif => "gif",
            ContainerTag::Png => "png",
            ContainerTag::Jpeg => "jpg",
        }
    }

    /// Whether this container format is a multi-frame animation the decode
    /// pipeline can iterate frame-by-frame.
    pub fn is_animated(&self) -> bool {
        matches!(self, ContainerTag::AnimatedWebp | ContainerTag::Gif)
    }
}

impl fmt::Display for ContainerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Entry-kind discriminator carried in byte 17 of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryKind {
    Playlist,
    Artwork,
}

impl EntryKind {
    pub fn from_byte(byte: u8) -> Result<Self, ModelError> {
        match byte {
            0 => Ok(EntryKind::Playlist),
            1 => Ok(EntryKind::Artwork),
            other => Err(ModelError::MalformedRecord(format!(
                "unknown entry kind byte {other}"
            ))),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            EntryKind::Playlist => 0,
            EntryKind::Artwork => 1,
        }
    }
}

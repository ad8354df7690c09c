//! Modality tags and the enabled-modalities mask

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::error::MalformedRecord;

/// One of the three captured stream kinds.
///
/// The discriminant is the tag written in front of every record and the bit
/// the modality occupies in [`Modalities`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[repr(i32)]
pub enum Modality {
    Color = 1,
    Depth = 2,
    Skeleton = 4,
}

impl Modality {
    /// Wire tag for this modality
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Parse a wire tag
    pub fn from_tag(tag: i32) -> Result<Self, MalformedRecord> {
        match tag {
            1 => Ok(Modality::Color),
            2 => Ok(Modality::Depth),
            4 => Ok(Modality::Skeleton),
            other => Err(MalformedRecord::UnknownTag(other)),
        }
    }
}

bitflags! {
    /// Modalities enabled in a recording
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct Modalities: i32 {
        const COLOR = 0b001;
        const DEPTH = 0b010;
        const SKELETON = 0b100;

        /// Everything a composite replay needs
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::SKELETON.bits();
    }
}

impl Default for Modalities {
    fn default() -> Self {
        Modalities::ALL
    }
}

impl Modalities {
    /// Check whether a single modality is enabled
    pub fn allows(&self, modality: Modality) -> bool {
        self.contains(Modalities::from(modality))
    }
}

impl From<Modality> for Modalities {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Color => Modalities::COLOR,
            Modality::Depth => Modalities::DEPTH,
            Modality::Skeleton => Modalities::SKELETON,
        }
    }
}

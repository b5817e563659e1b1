use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct Speaking {
    pub speaking: SpeakingFlags,
    /// Should be zero for bots using the voice gateway.
    #[serde(default)]
    pub delay: u32,
    pub ssrc: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct SpeakingFlags: u8 {
        const MICROPHONE = 1 << 0;
        const SOUNDSHARE = 1 << 1;
        const PRIORITY = 1 << 2;
    }
}

impl<'de> Deserialize<'de> for SpeakingFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self::from_bits_truncate(u8::deserialize(deserializer)?))
    }
}

impl Serialize for SpeakingFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::SpeakingFlags;
    use serde::{Serialize, de::DeserializeOwned};
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, hash::Hash};

    assert_impl_all!(
        SpeakingFlags: Copy,
        Clone,
        Debug,
        DeserializeOwned,
        Eq,
        Hash,
        PartialEq,
        Send,
        Serialize,
        Sync,
    );
}

use serde::{Deserialize, Serialize};
use std::fmt::Display;

// Snowflakes travel as decimal strings on the wire but some payloads
// carry them as bare integers, so deserialization accepts both.
macro_rules! id_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Gets the inner snowflake value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                crate::deserializers::snowflake::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                crate::deserializers::snowflake::deserialize(deserializer).map(Self)
            }
        }
    };
}

id_type! {
    /// Unique identifier of a guild.
    GuildId
}

id_type! {
    /// Unique identifier of a user.
    UserId
}

id_type! {
    /// Unique identifier of a channel.
    ChannelId
}

#[cfg(test)]
mod tests {
    use super::{ChannelId, GuildId, UserId};
    use serde::{Serialize, de::DeserializeOwned};
    use serde_test::Token;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;
    use std::hash::Hash;

    assert_impl_all!(
        GuildId: Clone,
        Copy,
        Debug,
        DeserializeOwned,
        Eq,
        Hash,
        PartialEq,
        Send,
        Serialize,
        Sync,
    );
    assert_impl_all!(UserId: DeserializeOwned, Serialize);
    assert_impl_all!(ChannelId: DeserializeOwned, Serialize);

    #[test]
    fn serializes_as_string() {
        serde_test::assert_tokens(&GuildId::new(81384788765712384), &[Token::Str("81384788765712384")]);
    }

    #[test]
    fn deserializes_from_integer() {
        serde_test::assert_de_tokens(&UserId::new(1234), &[Token::U64(1234)]);
    }
}

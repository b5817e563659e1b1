use serde_repr::{Deserialize_repr, Serialize_repr};
use std::{error::Error, fmt::Display};

/// What the reconnect logic must do after a closure with a given code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClosePolicy {
    /// The session survived the closure, reattach to it with a resume.
    Resume,
    /// The session is gone, a fresh identify handshake is required.
    Reidentify,
    /// The closure is not recoverable and must surface to the caller.
    Fatal,
}

/// Gateway close event codes.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[non_exhaustive]
#[repr(u16)]
pub enum CloseCode {
    /// An unknown error occurred.
    UnknownError = 4000,
    /// An invalid opcode was sent.
    UnknownOpcode = 4001,
    /// An invalid payload was sent.
    DecodeError = 4002,
    /// A payload was sent prior to identifying.
    NotAuthenticated = 4003,
    /// An invalid token was sent when identifying.
    AuthenticationFailed = 4004,
    /// Multiple identify payloads were sent.
    AlreadyAuthenticated = 4005,
    /// An invalid sequence was sent for resuming.
    InvalidSequence = 4007,
    /// Too many payloads were sent in a short span of time.
    RateLimited = 4008,
    /// The session timed out.
    SessionTimedOut = 4009,
    /// An invalid shard was sent when identifying.
    InvalidShard = 4010,
    /// The session would have handled too many guilds, sharding is required.
    ShardingRequired = 4011,
    /// An invalid API version was sent.
    InvalidApiVersion = 4012,
    /// An invalid intents bitfield was sent.
    InvalidIntents = 4013,
    /// An intents bitfield with intents the client is not allowed to use
    /// was sent.
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// How the closure must be handled by the reconnect logic.
    #[must_use]
    pub const fn policy(self) -> ClosePolicy {
        match self {
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated => ClosePolicy::Resume,
            Self::InvalidSequence | Self::RateLimited | Self::SessionTimedOut => {
                ClosePolicy::Reidentify
            }
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => ClosePolicy::Fatal,
        }
    }

    /// Whether this close code is one that allows to reconnect the connection.
    #[must_use]
    pub const fn can_reconnect(self) -> bool {
        !matches!(self.policy(), ClosePolicy::Fatal)
    }
}

impl From<CloseCode> for u16 {
    fn from(val: CloseCode) -> Self {
        val as u16
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = CloseCodeConversionError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let close_code = match value {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            _ => return Err(CloseCodeConversionError::new(value)),
        };

        Ok(close_code)
    }
}

/// Voice gateway close event codes.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[non_exhaustive]
#[repr(u16)]
pub enum VoiceCloseCode {
    /// An invalid opcode was sent.
    UnknownOpcode = 4001,
    /// An invalid payload was sent.
    DecodeError = 4002,
    /// A payload was sent prior to identifying.
    NotAuthenticated = 4003,
    /// An invalid token was sent when identifying.
    AuthenticationFailed = 4004,
    /// Multiple identify payloads were sent.
    AlreadyAuthenticated = 4005,
    /// The session was invalidated.
    SessionNoLongerValid = 4006,
    /// The session timed out.
    SessionTimedOut = 4009,
    /// The specified voice server was not found.
    ServerNotFound = 4011,
    /// An unknown protocol was sent.
    UnknownProtocol = 4012,
    /// Disconnected from the voice channel.
    Disconnected = 4014,
    /// The voice server crashed.
    VoiceServerCrashed = 4015,
    /// The encryption mode could not be recognized.
    UnknownEncryptionMode = 4016,
}

impl VoiceCloseCode {
    /// How the closure must be handled by the reconnect logic.
    ///
    /// [`ClosePolicy::Reidentify`] means the voice session itself is gone;
    /// the owning connection has to tear down and let its caller decide
    /// whether to establish a fresh one.
    #[must_use]
    pub const fn policy(self) -> ClosePolicy {
        match self {
            Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::UnknownProtocol
            | Self::VoiceServerCrashed
            | Self::UnknownEncryptionMode => ClosePolicy::Resume,
            Self::SessionNoLongerValid | Self::SessionTimedOut | Self::Disconnected => {
                ClosePolicy::Reidentify
            }
            Self::AuthenticationFailed | Self::ServerNotFound => ClosePolicy::Fatal,
        }
    }

    /// Whether this close code is one that allows to resume the voice
    /// connection on a new socket.
    #[must_use]
    pub const fn can_reconnect(self) -> bool {
        matches!(self.policy(), ClosePolicy::Resume)
    }
}

impl From<VoiceCloseCode> for u16 {
    fn from(val: VoiceCloseCode) -> Self {
        val as u16
    }
}

impl TryFrom<u16> for VoiceCloseCode {
    type Error = CloseCodeConversionError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let close_code = match value {
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4006 => Self::SessionNoLongerValid,
            4009 => Self::SessionTimedOut,
            4011 => Self::ServerNotFound,
            4012 => Self::UnknownProtocol,
            4014 => Self::Disconnected,
            4015 => Self::VoiceServerCrashed,
            4016 => Self::UnknownEncryptionMode,
            _ => return Err(CloseCodeConversionError::new(value)),
        };

        Ok(close_code)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CloseCodeConversionError {
    code: u16,
}

impl CloseCodeConversionError {
    #[must_use]
    const fn new(code: u16) -> Self {
        Self { code }
    }

    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }
}

impl Display for CloseCodeConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.code, f)?;
        f.write_str(" is not a valid close code")
    }
}

impl Error for CloseCodeConversionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(
        CloseCode: Clone,
        Copy,
        Debug,
        Deserialize<'static>,
        Eq,
        PartialEq,
        Send,
        Serialize,
        Sync,
    );
    assert_impl_all!(
        VoiceCloseCode: Clone,
        Copy,
        Debug,
        Deserialize<'static>,
        Eq,
        PartialEq,
        Send,
        Serialize,
        Sync,
    );
    assert_impl_all!(CloseCodeConversionError: Debug, PartialEq, Eq, Send, Sync, Error);

    #[test]
    fn authentication_failures_are_fatal() {
        assert_eq!(CloseCode::AuthenticationFailed.policy(), ClosePolicy::Fatal);
        assert_eq!(CloseCode::DisallowedIntents.policy(), ClosePolicy::Fatal);
        assert_eq!(
            VoiceCloseCode::AuthenticationFailed.policy(),
            ClosePolicy::Fatal
        );
        assert!(!CloseCode::AuthenticationFailed.can_reconnect());
    }

    #[test]
    fn invalidated_sessions_require_identify() {
        assert_eq!(CloseCode::InvalidSequence.policy(), ClosePolicy::Reidentify);
        assert_eq!(CloseCode::RateLimited.policy(), ClosePolicy::Reidentify);
        assert_eq!(CloseCode::SessionTimedOut.policy(), ClosePolicy::Reidentify);
        assert_eq!(
            VoiceCloseCode::Disconnected.policy(),
            ClosePolicy::Reidentify
        );
    }

    #[test]
    fn generic_closures_are_resumable() {
        assert_eq!(CloseCode::UnknownError.policy(), ClosePolicy::Resume);
        assert_eq!(
            VoiceCloseCode::VoiceServerCrashed.policy(),
            ClosePolicy::Resume
        );
        assert_eq!(
            VoiceCloseCode::UnknownEncryptionMode.policy(),
            ClosePolicy::Resume
        );
    }

    #[test]
    fn rejects_codes_outside_the_table() {
        assert_eq!(
            CloseCode::try_from(1000),
            Err(CloseCodeConversionError::new(1000))
        );
        assert_eq!(
            VoiceCloseCode::try_from(4000),
            Err(CloseCodeConversionError::new(4000))
        );
    }
}

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Gateway opcodes.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[non_exhaustive]
#[repr(u8)]
pub enum OpCode {
    /// Received when an event was dispatched.
    Dispatch = 0,
    /// Fired periodically to keep the connection alive, also received when
    /// the gateway requests an immediate heartbeat.
    Heartbeat = 1,
    /// Starts a new session during the initial handshake.
    Identify = 2,
    /// Sent to join, move between or leave voice channels.
    UpdateVoiceState = 4,
    /// Resumes a previously disconnected session.
    Resume = 6,
    /// Received to tell the client to reconnect and resume immediately.
    Reconnect = 7,
    /// Received to indicate that the session is no longer valid.
    InvalidSession = 9,
    /// Received after connecting, contains the heartbeat interval.
    Hello = 10,
    /// Received in response to a heartbeat.
    HeartbeatAck = 11,
}

impl OpCode {
    /// Tries to match an integer value to an opcode.
    ///
    /// Returns [`None`] if no match is found.
    #[must_use]
    pub const fn from(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            4 => Some(Self::UpdateVoiceState),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        val as u8
    }
}

/// Voice gateway opcodes.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[non_exhaustive]
#[repr(u8)]
pub enum VoiceOpCode {
    /// Starts a voice websocket connection.
    Identify = 0,
    /// Selects the protocol to use.
    SelectProtocol = 1,
    /// Received to indicate completion of the handshake.
    Ready = 2,
    /// Fired periodically to keep the connection alive.
    Heartbeat = 3,
    /// Received to indicate the session description.
    SessionDescription = 4,
    /// Sent and received to indicate speaking status.
    Speaking = 5,
    /// Received in response to a heartbeat.
    HeartbeatAck = 6,
    /// Resumes a previously disconnected session.
    Resume = 7,
    /// Received after connecting, contains the heartbeat interval.
    Hello = 8,
    /// Received to indicate a successful resume.
    Resumed = 9,
}

impl VoiceOpCode {
    /// Tries to match an integer value to an opcode.
    ///
    /// Returns [`None`] if no match is found.
    #[must_use]
    pub const fn from(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Identify),
            1 => Some(Self::SelectProtocol),
            2 => Some(Self::Ready),
            3 => Some(Self::Heartbeat),
            4 => Some(Self::SessionDescription),
            5 => Some(Self::Speaking),
            6 => Some(Self::HeartbeatAck),
            7 => Some(Self::Resume),
            8 => Some(Self::Hello),
            9 => Some(Self::Resumed),
            _ => None,
        }
    }
}

impl From<VoiceOpCode> for u8 {
    fn from(val: VoiceOpCode) -> Self {
        val as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(
        OpCode: Clone,
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
        VoiceOpCode: Clone,
        Copy,
        Debug,
        Deserialize<'static>,
        Eq,
        PartialEq,
        Send,
        Serialize,
        Sync,
    );

    #[test]
    fn roundtrips_raw_codes() {
        for code in 0..=u8::MAX {
            if let Some(op) = OpCode::from(code) {
                assert_eq!(u8::from(op), code);
            }
            if let Some(op) = VoiceOpCode::from(code) {
                assert_eq!(u8::from(op), code);
            }
        }
    }
}

use crate::client::Token;
use heliograph_types::{GuildId, UserId};

/// This struct holds connection parameters for the [`VoiceConnection`].
///
/// All of these values come from the voice state update and voice server
/// update dispatch events, which the gateway sends after it was asked to
/// join a voice channel with an update voice state command.
///
/// [`VoiceConnection`]: super::VoiceConnection
#[derive(Debug, Clone)]
pub struct VoiceConnectionInfo {
    /// Voice gateway host, without the URL scheme.
    pub endpoint: String,

    pub guild_id: GuildId,

    /// Voice session id from the voice state update event.
    pub session_id: String,

    /// Voice token from the voice server update event. This is not the
    /// account token.
    pub token: Token,

    pub user_id: UserId,
}

impl VoiceConnectionInfo {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        guild_id: GuildId,
        user_id: UserId,
        session_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            guild_id,
            session_id: session_id.into(),
            token: Token::new(token.into().into_boxed_str()),
            user_id,
        }
    }
}

use crate::id::GuildId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct VoiceResume {
    #[serde(rename = "server_id")]
    pub guild_id: GuildId,
    pub session_id: String,
    pub token: String,
}

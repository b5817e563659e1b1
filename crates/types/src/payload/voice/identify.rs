use crate::id::{GuildId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct VoiceIdentify {
    #[serde(rename = "server_id")]
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub session_id: String,
    pub token: String,
}

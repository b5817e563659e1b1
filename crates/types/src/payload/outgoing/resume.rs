use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Resume {
    pub token: String,
    pub session_id: String,
    /// Last dispatch sequence number the client observed. The gateway
    /// replays everything after it.
    pub seq: u64,
}

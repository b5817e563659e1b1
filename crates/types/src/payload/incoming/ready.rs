use serde::{Deserialize, Serialize};

// Ready carries much more than this (the bot user, unavailable guilds,
// application info); only the fields the connection itself needs are
// modeled and the rest flows to dispatch handlers as raw JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ready {
    /// Gateway API version confirmed by the server.
    pub v: u8,
    /// Session id used for resuming.
    pub session_id: String,
    /// Endpoint to reconnect to when resuming the session.
    pub resume_gateway_url: String,
}

#[cfg(test)]
mod tests {
    use super::Ready;

    #[test]
    fn ignores_unmodeled_fields() {
        let raw = r#"{
            "v": 10,
            "user": {"id": "1", "username": "bot"},
            "guilds": [],
            "session_id": "33ea9f1a",
            "resume_gateway_url": "wss://gateway-us-east1-b.example.gg",
            "shard": [0, 1]
        }"#;

        let ready: Ready = serde_json::from_str(raw).expect("should parse");
        assert_eq!(ready.v, 10);
        assert_eq!(ready.session_id, "33ea9f1a");
        assert_eq!(
            ready.resume_gateway_url,
            "wss://gateway-us-east1-b.example.gg"
        );
    }
}

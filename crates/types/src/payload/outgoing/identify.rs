use crate::Intents;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identify {
    pub token: String,
    pub properties: ConnectionProperties,
    /// Whether the server may compress individual dispatch payloads.
    pub compress: bool,
    pub intents: Intents,
}

/// Client metadata reported during identification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ConnectionProperties {
    /// Properties describing this library on the current platform.
    #[must_use]
    pub fn library() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "heliograph".to_string(),
            device: "heliograph".to_string(),
        }
    }
}

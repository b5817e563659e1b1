use serde::{Deserialize, Serialize};

// The voice gateway hello differs from the gateway one with
// `heartbeat_interval` being a floating value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VoiceHello {
    pub heartbeat_interval: f64,
}

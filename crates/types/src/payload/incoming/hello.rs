use serde::{Deserialize, Serialize};

// The gateway sends the interval as integer milliseconds, unlike the
// voice gateway where the same field is a floating value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

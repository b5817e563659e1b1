pub mod incoming;
pub mod outgoing;
pub mod speaking;
pub mod voice;

pub use self::speaking::{Speaking, SpeakingFlags};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::borrow::Cow;

/// Wire envelope shared by the gateway and the voice gateway.
///
/// The inner `d` payload is kept as raw JSON so dispatch events can be
/// routed to their handlers without decoding shapes this crate does not
/// model. `s` and `t` are only present on dispatch events.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Box<RawValue>>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    /// Decodes the inner `d` payload.
    ///
    /// A missing `d` field decodes like an explicit JSON null.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let raw = self.d.as_deref().map_or("null", RawValue::get);
        serde_json::from_str(raw)
    }
}

/// WebSocket close frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloseFrame<'a> {
    /// Numeric close code.
    pub code: u16,

    /// Textual reason of the closure.
    pub reason: Cow<'a, str>,
}

impl CloseFrame<'static> {
    /// Normal closure. The gateway invalidates the session when it sees
    /// this code, so it must only be used for deliberate shutdowns.
    pub const NORMAL: Self = Self::new(1000, "closing connection");

    /// Non-1000 closure that keeps the session resumable on the next
    /// connection.
    pub const RESUME: Self = Self::new(4000, "resuming connection");
}

impl<'a> CloseFrame<'a> {
    #[must_use]
    pub const fn new(code: u16, reason: &'a str) -> Self {
        Self {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    /// Converts the frame into one that owns its reason.
    #[must_use]
    pub fn into_owned(self) -> CloseFrame<'static> {
        CloseFrame {
            code: self.code,
            reason: Cow::Owned(self.reason.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Envelope;

    #[test]
    fn parses_a_dispatch_envelope() {
        let raw = r#"{"op":0,"t":"MESSAGE_CREATE","s":42,"d":{"id":"1","content":"hi"}}"#;
        let envelope: Envelope = serde_json::from_str(raw).expect("should parse");

        assert_eq!(envelope.op, 0);
        assert_eq!(envelope.s, Some(42));
        assert_eq!(envelope.t.as_deref(), Some("MESSAGE_CREATE"));
        assert!(envelope.d.is_some());
    }

    #[test]
    fn tolerates_missing_and_unknown_fields() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"op":11,"_trace":["gateway"]}"#).expect("should parse");

        assert_eq!(envelope.op, 11);
        assert_eq!(envelope.s, None);
        assert_eq!(envelope.t, None);
        assert_eq!(envelope.data::<Option<u8>>().expect("should decode"), None);
    }
}

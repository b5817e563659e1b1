use std::error::Error;
use std::fmt::Display;

/// Receiving the next [`Client`] event failed.
///
/// [`Client`]: super::Client
#[derive(Debug)]
pub struct ReceiveEventError {
    pub(crate) kind: ReceiveEventErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl ReceiveEventError {
    #[must_use]
    pub const fn kind(&self) -> &ReceiveEventErrorType {
        &self.kind
    }
}

impl Display for ReceiveEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ReceiveEventErrorType::Reconnect => {
                f.write_str("could not reconnect to the gateway")
            }
            ReceiveEventErrorType::Deserializing => {
                f.write_str("a handshake payload could not be deserialized")
            }
        }
    }
}

impl Error for ReceiveEventError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ReceiveEventErrorType {
    /// Could not reconnect to the gateway.
    Reconnect,

    /// A payload the handshake depends on could not be deserialized.
    Deserializing,
}

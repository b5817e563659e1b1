use std::error::Error;
use std::fmt::Display;

/// Receiving the next [`VoiceConnection`] event failed.
///
/// [`VoiceConnection`]: super::VoiceConnection
#[derive(Debug)]
pub struct VoiceConnectionError {
    pub(crate) kind: VoiceConnectionErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl VoiceConnectionError {
    #[must_use]
    pub const fn kind(&self) -> &VoiceConnectionErrorType {
        &self.kind
    }
}

impl Display for VoiceConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            VoiceConnectionErrorType::Deserializing => {
                f.write_str("a handshake payload could not be deserialized")
            }
            VoiceConnectionErrorType::Handshaking => {
                f.write_str("could not handshake the voice UDP connection")
            }
            VoiceConnectionErrorType::Reconnect => {
                f.write_str("could not reconnect to the voice gateway")
            }
            VoiceConnectionErrorType::UnsupportedMode => {
                f.write_str("the voice server offered no supported encryption mode")
            }
        }
    }
}

impl Error for VoiceConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum VoiceConnectionErrorType {
    /// A payload the handshake depends on could not be deserialized.
    Deserializing,

    /// Could not handshake the UDP leg of the connection.
    Handshaking,

    /// Could not reconnect to the voice gateway.
    Reconnect,

    /// The voice server offered no supported encryption mode.
    UnsupportedMode,
}

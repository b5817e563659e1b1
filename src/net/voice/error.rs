use std::error::Error;
use std::fmt::Display;

#[derive(Debug)]
pub struct VoiceSocketError {
    pub(crate) kind: VoiceSocketErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl VoiceSocketError {
    #[must_use]
    pub fn kind(&self) -> &VoiceSocketErrorType {
        &self.kind
    }
}

impl Display for VoiceSocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            VoiceSocketErrorType::WebSocket => match self.source.as_ref() {
                Some(source) => Display::fmt(source, f),
                None => f.write_str("websocket error"),
            },
        }
    }
}

impl Error for VoiceSocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum VoiceSocketErrorType {
    /// WebSocket error while connecting or exchanging frames.
    WebSocket,
}

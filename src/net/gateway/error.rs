use std::error::Error;
use std::fmt::Display;

#[derive(Debug)]
pub struct GatewaySocketError {
    pub(crate) kind: GatewaySocketErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl GatewaySocketError {
    #[must_use]
    pub fn kind(&self) -> &GatewaySocketErrorType {
        &self.kind
    }
}

impl Display for GatewaySocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            GatewaySocketErrorType::WebSocket => match self.source.as_ref() {
                Some(source) => Display::fmt(source, f),
                None => f.write_str("websocket error"),
            },
        }
    }
}

impl Error for GatewaySocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum GatewaySocketErrorType {
    /// WebSocket error while connecting or exchanging frames.
    WebSocket,
}

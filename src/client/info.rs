use heliograph_types::Intents;

/// Connection parameters for the [`Client`].
///
/// The gateway endpoint and the account token come from the REST API
/// (`GET /gateway/bot`), which is not part of this crate; pass them in
/// from whatever request layer the application uses.
///
/// [`Client`]: super::Client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host to connect to, without the URL scheme.
    pub endpoint: String,

    /// Event groups the session subscribes to.
    pub intents: Intents,

    pub token: Token,

    /// Whether the socket negotiates shared-context transport
    /// compression for the whole stream.
    pub transport_compression: bool,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, intents: Intents) -> Self {
        Self {
            endpoint: endpoint.into(),
            intents,
            token: Token::new(token.into().into_boxed_str()),
            transport_compression: false,
        }
    }

    /// Enables shared-context transport compression.
    #[must_use]
    pub fn with_transport_compression(mut self) -> Self {
        self.transport_compression = true;
        self
    }
}

/// Wrapper for an authorization token with a debug implementation
/// that redacts the string.
#[derive(Clone, Default)]
pub struct Token {
    /// Authorization token that is redacted in the Debug implementation.
    inner: Box<str>,
}

impl Token {
    /// Create a new authorization wrapper.
    #[must_use]
    pub const fn new(token: Box<str>) -> Self {
        Self { inner: token }
    }

    /// Exposes the authorization token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::Token;

    #[test]
    fn debug_output_redacts_the_token() {
        let token = Token::new("very-secret".into());
        assert_eq!(format!("{token:?}"), "<redacted>");
        assert_eq!(token.expose(), "very-secret");
    }
}

use std::error::Error;
use std::fmt::Display;

#[derive(Debug)]
pub struct VoiceUdpError {
    pub(crate) kind: VoiceUdpErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl VoiceUdpError {
    #[must_use]
    pub fn kind(&self) -> &VoiceUdpErrorType {
        &self.kind
    }
}

impl Display for VoiceUdpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VoiceUdpErrorType::Connect => f.write_str("could not connect the voice UDP socket"),
            VoiceUdpErrorType::DiscoveringIp => f.write_str("could not discover the external address"),
            VoiceUdpErrorType::Encrypting => f.write_str("could not encrypt the audio frame"),
            VoiceUdpErrorType::KeyAlreadyInstalled => {
                f.write_str("a secret key is already installed for this session")
            }
            VoiceUdpErrorType::NoSecretKey => {
                f.write_str("no secret key has been installed for this session")
            }
            VoiceUdpErrorType::Sending => f.write_str("could not send the audio frame"),
        }
    }
}

impl Error for VoiceUdpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum VoiceUdpErrorType {
    /// Could not bind or connect the UDP socket.
    Connect,

    /// The IP discovery exchange failed or returned garbage.
    DiscoveringIp,

    /// The frame could not be encrypted.
    Encrypting,

    /// A secret key was installed twice for the same session.
    KeyAlreadyInstalled,

    /// A frame was submitted before the secret key arrived.
    NoSecretKey,

    /// The socket rejected the datagram.
    Sending,
}

use crate::net::VoiceUdp;
use heliograph_types::CloseFrame;
use std::sync::Arc;

/// The resulting value of `.next()` function in [`VoiceConnection`].
///
/// [`VoiceConnection`]: super::VoiceConnection
#[derive(Debug)]
pub enum VoiceEvent {
    /// The handshake completed and the transport is ready to carry
    /// audio. This fires once per fresh session, after the session
    /// description installed the secret key.
    Connected(VoiceServerInfo),

    /// The control channel resumed; the existing UDP transport keeps its
    /// discovered address and secret key.
    Resumed,

    /// The control channel dropped; the connection is reconnecting and
    /// resuming on its own. Audio sending is paused until then.
    Reconnecting,

    /// The voice connection ended for good. Establishing a fresh one
    /// (with fresh credentials from the gateway) is the owner's call.
    Closed(Option<CloseFrame<'static>>),
}

/// Voice server parameters handed out once the session description
/// completed.
#[derive(Debug)]
pub struct VoiceServerInfo {
    /// SSRC dedicated to this client by the voice server.
    pub ssrc: u32,

    /// Shared handle to the UDP transport. The audio encode loop pushes
    /// encrypted frames through it for as long as sending is enabled.
    pub udp: Arc<VoiceUdp>,
}

mod channel;
mod event;
mod info;

pub mod error;

pub use self::channel::VoiceSender;
pub use self::event::{VoiceEvent, VoiceServerInfo};
pub use self::info::VoiceConnectionInfo;

use self::channel::{MessageChannel, VoiceCommand};
use self::error::{VoiceConnectionError, VoiceConnectionErrorType};
use crate::crypto::EncryptMode;
use crate::net::internal::ConnectionFuture;
use crate::net::udp::error::VoiceUdpError;
use crate::net::udp::{DiscoverIpResult, VoiceUdp};
use crate::net::voice::{VoiceSocket, VoiceSocketEvent};
use crate::reconnect::{self, CloseEvent, Decision, Initiator};
use futures::{Stream, ready};
use heliograph_types::payload::voice::{
    SelectProtocol, SelectProtocolData, SessionDescription, VoiceIdentify, VoiceReady, VoiceResume,
};
use heliograph_types::payload::{Speaking, SpeakingFlags};
use heliograph_types::{CloseFrame, Envelope, VoiceOpCode};
use serde_json::json;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// The current state of a [`VoiceConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceConnectionState {
    /// Not connected. The socket (re)establishes the control channel on
    /// its own with backoff.
    Disconnected,

    /// Sent identify, waiting for the voice ready payload.
    Identifying,

    /// Sent resume on a fresh control channel; the UDP transport and its
    /// discovered address are kept.
    Resuming,

    /// Connecting the UDP socket and discovering the external address.
    UdpHandshaking,

    /// The session description installed the secret key; audio may flow.
    Active,

    /// A deliberate local shutdown is in progress.
    Closing,

    /// The voice connection ended for good.
    Closed,
}

impl VoiceConnectionState {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Current session of a [`VoiceConnection`], assigned by the voice
/// server from the ready payload.
#[derive(Debug)]
struct VoiceSession {
    mode: EncryptMode,
    ssrc: u32,
}

/// Manages one voice connection end to end: drives the [`VoiceSocket`]
/// control channel through the hello → identify/resume → ready →
/// select protocol → session description handshake, provisions the
/// [`VoiceUdp`] transport (including IP discovery), and reports speaking
/// status.
///
/// The stream yields lifecycle events; once [`VoiceEvent::Connected`]
/// hands out the [`VoiceServerInfo`], the audio encode loop owns frame
/// timing and uses the UDP transport directly. A control-channel resume
/// keeps the UDP socket: the discovered external address and the secret
/// key survive, so only the WebSocket side is re-established.
#[derive(Debug)]
pub struct VoiceConnection {
    channel: MessageChannel,

    /// Connection parameters to connect to the voice gateway.
    info: VoiceConnectionInfo,

    /// Set when the transport reconnected and the next hello has to
    /// resume instead of identify.
    reconnected: bool,

    session: Option<VoiceSession>,

    /// The WebSocket control channel of the voice connection.
    socket: VoiceSocket,

    state: VoiceConnectionState,

    /// UDP transport, shared with the audio encode loop once the
    /// handshake finished.
    udp: Option<Arc<VoiceUdp>>,

    /// Future connecting the UDP socket and discovering the external
    /// address.
    udp_future: Option<ConnectionFuture<(VoiceUdp, DiscoverIpResult), VoiceUdpError>>,
}

impl VoiceConnection {
    #[must_use]
    pub fn new(info: VoiceConnectionInfo) -> Self {
        Self {
            channel: MessageChannel::new(),
            socket: VoiceSocket::new(info.endpoint.clone()),
            info,
            reconnected: false,
            session: None,
            state: VoiceConnectionState::Disconnected,
            udp: None,
            udp_future: None,
        }
    }

    /// Gets the current state of [`VoiceConnection`].
    #[must_use]
    pub fn state(&self) -> VoiceConnectionState {
        self.state
    }

    /// Gets a handle to control this connection from other tasks.
    #[must_use]
    pub fn sender(&self) -> VoiceSender {
        self.channel.sender()
    }

    /// Queues a deliberate shutdown of the voice connection.
    pub fn close(&mut self, frame: CloseFrame<'static>) {
        self.state = VoiceConnectionState::Closing;
        if let Some(udp) = self.udp.as_ref() {
            udp.stop_sending();
        }
        self.socket.close(frame);
    }
}

impl VoiceConnection {
    fn send_identify(&mut self) {
        debug!(guild = %self.info.guild_id, "identifying a fresh voice session");
        self.state = VoiceConnectionState::Identifying;
        self.socket.send(&json!({
            "op": VoiceOpCode::Identify,
            "d": VoiceIdentify {
                guild_id: self.info.guild_id,
                user_id: self.info.user_id,
                session_id: self.info.session_id.clone(),
                token: self.info.token.expose().into(),
            },
        }));
    }

    fn send_resume(&mut self) {
        debug!(guild = %self.info.guild_id, "resuming the voice session");
        self.state = VoiceConnectionState::Resuming;
        self.socket.send(&json!({
            "op": VoiceOpCode::Resume,
            "d": VoiceResume {
                guild_id: self.info.guild_id,
                session_id: self.info.session_id.clone(),
                token: self.info.token.expose().into(),
            },
        }));
    }

    fn send_speaking(&mut self, flags: SpeakingFlags) {
        let Some(ssrc) = self.session.as_ref().map(|session| session.ssrc) else {
            warn!("cannot report speaking without a voice session");
            return;
        };

        self.socket.send(&json!({
            "op": VoiceOpCode::Speaking,
            "d": Speaking {
                speaking: flags,
                delay: 0,
                ssrc,
            },
        }));
    }

    /// Updates the connection's state from one decoded envelope and
    /// returns the lifecycle event to surface, if any.
    fn process_event(
        &mut self,
        envelope: &Envelope,
    ) -> Result<Option<VoiceEvent>, VoiceConnectionError> {
        match VoiceOpCode::from(envelope.op) {
            Some(VoiceOpCode::Hello) => {
                // The socket already started heartbeating from hello.
                if self.reconnected && self.session.is_some() {
                    self.reconnected = false;
                    self.send_resume();
                } else {
                    self.reconnected = false;
                    self.send_identify();
                }
                Ok(None)
            }
            Some(VoiceOpCode::Ready) => {
                let ready =
                    envelope
                        .data::<VoiceReady>()
                        .map_err(|source| VoiceConnectionError {
                            kind: VoiceConnectionErrorType::Deserializing,
                            source: Some(Box::new(source)),
                        })?;

                let mode = EncryptMode::negotiate(&ready.modes).ok_or_else(|| {
                    VoiceConnectionError {
                        kind: VoiceConnectionErrorType::UnsupportedMode,
                        source: None,
                    }
                })?;
                debug!(ssrc = ?ready.ssrc, ?mode, "received voice ready event");

                let (ip, port, ssrc) = (ready.ip, ready.port, ready.ssrc);
                self.session = Some(VoiceSession { mode, ssrc });
                self.state = VoiceConnectionState::UdpHandshaking;
                self.udp_future = Some(ConnectionFuture::new(async move {
                    debug!(?ip, ?port, "connecting to the voice UDP server");

                    let udp = VoiceUdp::connect(ip, port, ssrc).await?;
                    let external = udp.discover().await?;
                    Ok((udp, external))
                }));
                Ok(None)
            }
            Some(VoiceOpCode::SessionDescription) => {
                let description = envelope.data::<SessionDescription>().map_err(|source| {
                    VoiceConnectionError {
                        kind: VoiceConnectionErrorType::Deserializing,
                        source: Some(Box::new(source)),
                    }
                })?;
                debug!("received session description voice event");

                let Some(session) = self.session.as_mut() else {
                    warn!("session description arrived without a voice session");
                    return Ok(None);
                };

                // The server may answer with a different mode than the
                // one selected; it wins the negotiation.
                if session.mode.as_str() != description.mode {
                    let responded = EncryptMode::from_str(&description.mode).map_err(|source| {
                        VoiceConnectionError {
                            kind: VoiceConnectionErrorType::UnsupportedMode,
                            source: Some(Box::new(source)),
                        }
                    })?;

                    warn!(
                        preferred = ?session.mode,
                        ?responded,
                        "unmatched encryption mode for preferred session and session description"
                    );
                    session.mode = responded;
                }

                let (mode, ssrc) = (session.mode, session.ssrc);
                let Some(udp) = self.udp.as_ref() else {
                    warn!("session description arrived without a UDP transport");
                    return Ok(None);
                };

                udp.set_secret_key(mode, &description.secret_key)
                    .map_err(|source| VoiceConnectionError {
                        kind: VoiceConnectionErrorType::Handshaking,
                        source: Some(Box::new(source)),
                    })?;
                udp.start_sending();

                let info = VoiceServerInfo {
                    ssrc,
                    udp: Arc::clone(udp),
                };

                self.state = VoiceConnectionState::Active;
                self.send_speaking(SpeakingFlags::MICROPHONE);
                Ok(Some(VoiceEvent::Connected(info)))
            }
            Some(VoiceOpCode::Resumed) => {
                debug!("voice session resumed");
                self.state = VoiceConnectionState::Active;
                if let Some(udp) = self.udp.as_ref() {
                    udp.start_sending();
                }
                Ok(Some(VoiceEvent::Resumed))
            }
            // Heartbeat bookkeeping lives inside the socket; speaking
            // updates of other users belong to the cache layer.
            _ => {
                trace!(op = envelope.op, "ignoring voice gateway event");
                Ok(None)
            }
        }
    }

    fn process_disconnect(&mut self, frame: Option<CloseFrame<'static>>) -> VoiceEvent {
        if let Some(udp) = self.udp.as_ref() {
            udp.stop_sending();
        }

        if matches!(self.state, VoiceConnectionState::Closing) {
            debug!(?frame, "deliberate voice shutdown finished");
            self.state = VoiceConnectionState::Closed;
            return VoiceEvent::Closed(frame);
        }

        let close = CloseEvent::new(
            frame.as_ref().map(|f| f.code),
            frame
                .as_ref()
                .map(|f| f.reason.clone().into_owned())
                .unwrap_or_default(),
            Initiator::Remote,
        );

        match reconnect::decide_voice(&close) {
            Some(Decision::Resume) => {
                debug!(?frame, "resuming the voice session after reconnect");
                self.state = VoiceConnectionState::Disconnected;
                VoiceEvent::Reconnecting
            }
            // Fatal closures and invalidated sessions both tear the
            // connection down; whether to build a fresh one with fresh
            // credentials is the owner's decision.
            _ => {
                warn!(?frame, "voice connection is lost for good");
                self.session = None;
                self.state = VoiceConnectionState::Closed;
                VoiceEvent::Closed(frame)
            }
        }
    }

    /// Completes the UDP leg of the handshake once the connect/discovery
    /// future resolves.
    fn poll_udp_connect(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), VoiceConnectionError>> {
        if !matches!(self.state, VoiceConnectionState::UdpHandshaking) || self.udp_future.is_none()
        {
            return Poll::Ready(Ok(()));
        }

        let future = Pin::new(&mut self.udp_future.as_mut().expect("checked above").0);
        let result = ready!(future.poll(cx));
        self.udp_future = None;

        match result {
            Ok((udp, external)) => {
                let session = self.session.as_ref().expect("ready installed the session");
                debug!(
                    external.ip = ?external.address,
                    external.port = ?external.port,
                    "connected to the voice UDP server, selecting protocol"
                );

                self.socket.send(&json!({
                    "op": VoiceOpCode::SelectProtocol,
                    "d": SelectProtocol {
                        protocol: "udp".into(),
                        data: SelectProtocolData {
                            address: external.address,
                            port: external.port,
                            mode: session.mode.as_str().to_string(),
                        },
                    },
                }));
                self.udp = Some(Arc::new(udp));
                Poll::Ready(Ok(()))
            }
            Err(source) => {
                // A failed discovery is a voice-connection failure: drop
                // the session and let the transport re-handshake from
                // scratch.
                self.session = None;
                self.state = VoiceConnectionState::Disconnected;
                self.socket.close(CloseFrame::RESUME);
                Poll::Ready(Err(VoiceConnectionError {
                    kind: VoiceConnectionErrorType::Handshaking,
                    source: Some(Box::new(source)),
                }))
            }
        }
    }

    fn poll_commands(&mut self, cx: &mut Context<'_>) {
        while let Poll::Ready(Some(command)) = self.channel.command_rx.poll_recv(cx) {
            debug!(?command, "received command from the user channel");
            match command {
                VoiceCommand::Close(frame) => self.close(frame),
                VoiceCommand::Speaking(flags) if self.state.is_active() => {
                    self.send_speaking(flags);
                }
                VoiceCommand::Speaking(..) => {
                    warn!("ignoring speaking update while the session is not active");
                }
            }
        }
    }
}

impl Stream for VoiceConnection {
    type Item = Result<VoiceEvent, VoiceConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            self.poll_commands(cx);

            if let Err(error) = ready!(self.poll_udp_connect(cx)) {
                return Poll::Ready(Some(Err(error)));
            }

            let event = match ready!(Pin::new(&mut self.socket).poll_next(cx)) {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    return Poll::Ready(Some(Err(VoiceConnectionError {
                        kind: VoiceConnectionErrorType::Reconnect,
                        source: Some(Box::new(source)),
                    })));
                }
                None => {
                    if matches!(self.state, VoiceConnectionState::Closed) {
                        return Poll::Ready(None);
                    }
                    self.state = VoiceConnectionState::Closed;
                    return Poll::Ready(Some(Ok(VoiceEvent::Closed(None))));
                }
            };

            match event {
                VoiceSocketEvent::Reconnected => {
                    debug!("voice transport reconnected, waiting for hello");
                    self.reconnected = true;
                    if let Some(udp) = self.udp.as_ref() {
                        udp.stop_sending();
                    }
                }
                VoiceSocketEvent::Disconnected(frame) => {
                    let event = self.process_disconnect(frame);
                    return Poll::Ready(Some(Ok(event)));
                }
                VoiceSocketEvent::Event(envelope) => match self.process_event(&envelope) {
                    Ok(None) => {}
                    Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                    Err(error) => return Poll::Ready(Some(Err(error))),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        VoiceConnection, VoiceConnectionError, VoiceConnectionInfo, VoiceConnectionState,
        VoiceEvent, VoiceSession,
    };
    use crate::crypto::EncryptMode;
    use crate::net::VoiceUdp;
    use crate::voice::error::VoiceConnectionErrorType;
    use heliograph_types::{CloseFrame, Envelope, GuildId, UserId};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn envelope(raw: &str) -> Envelope {
        serde_json::from_str(raw).expect("valid envelope")
    }

    fn connection() -> VoiceConnection {
        VoiceConnection::new(VoiceConnectionInfo::new(
            "region.discord.media:443",
            GuildId::new(81384788765712384),
            UserId::new(1234),
            "33ea9f1a",
            "voice-token",
        ))
    }

    async fn local_udp(ssrc: u32) -> (tokio::net::UdpSocket, Arc<VoiceUdp>) {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let port = peer.local_addr().expect("bound").port();

        let udp = VoiceUdp::connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, ssrc)
            .await
            .expect("should connect");
        (peer, Arc::new(udp))
    }

    #[tokio::test]
    async fn hello_identifies_a_fresh_session() {
        let mut connection = connection();
        connection
            .process_event(&envelope(r#"{"op":8,"d":{"heartbeat_interval":13750.0}}"#))
            .expect("hello should be processed");

        assert_eq!(connection.state(), VoiceConnectionState::Identifying);

        let queued = connection.socket.queued_messages();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["op"], 0);
        assert_eq!(queued[0]["d"]["server_id"], "81384788765712384");
        assert_eq!(queued[0]["d"]["session_id"], "33ea9f1a");
        assert_eq!(queued[0]["d"]["token"], "voice-token");
    }

    #[tokio::test]
    async fn hello_resumes_after_a_reconnect() {
        let mut connection = connection();
        connection.reconnected = true;
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });

        connection
            .process_event(&envelope(r#"{"op":8,"d":{"heartbeat_interval":13750.0}}"#))
            .expect("hello should be processed");

        assert_eq!(connection.state(), VoiceConnectionState::Resuming);
        assert_eq!(connection.socket.queued_messages()[0]["op"], 7);
        // A resume must not tear down the discovered UDP transport.
        assert!(connection.udp_future.is_none());
    }

    #[tokio::test]
    async fn ready_negotiates_a_mode_and_starts_the_udp_leg() {
        let mut connection = connection();
        connection
            .process_event(&envelope(
                r#"{"op":2,"d":{
                    "ssrc":123,
                    "ip":"127.0.0.1",
                    "port":5000,
                    "modes":["aead_xchacha20_poly1305_rtpsize","aead_aes256_gcm_rtpsize"]
                }}"#,
            ))
            .expect("ready should be processed");

        assert_eq!(connection.state(), VoiceConnectionState::UdpHandshaking);
        assert!(connection.udp_future.is_some());

        let session = connection.session.as_ref().expect("session installed");
        assert_eq!(session.ssrc, 123);
        assert_eq!(session.mode, EncryptMode::Aes256Gcm);
    }

    #[tokio::test]
    async fn ready_with_no_supported_mode_fails() {
        let mut connection = connection();
        let error = connection
            .process_event(&envelope(
                r#"{"op":2,"d":{"ssrc":1,"ip":"127.0.0.1","port":5000,"modes":["xsalsa20_poly1305"]}}"#,
            ))
            .expect_err("unsupported modes must fail the handshake");

        assert!(matches!(
            error,
            VoiceConnectionError {
                kind: VoiceConnectionErrorType::UnsupportedMode,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn udp_handshake_selects_protocol_with_the_discovered_address() {
        use crate::net::internal::ConnectionFuture;

        let mut connection = connection();
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });
        connection.state = VoiceConnectionState::UdpHandshaking;

        let responder = tokio::net::UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let port = responder.local_addr().expect("bound").port();

        tokio::spawn(async move {
            let mut buffer = [0u8; 74];
            let (_, addr) = responder
                .recv_from(&mut buffer)
                .await
                .expect("should receive the request");

            let mut response = [0u8; 74];
            response[1] = 0x02;
            response[3] = 70;
            response[4..8].copy_from_slice(&123u32.to_be_bytes());
            response[8..15].copy_from_slice(b"9.9.9.9");
            response[72..74].copy_from_slice(&777u16.to_be_bytes());
            responder
                .send_to(&response, addr)
                .await
                .expect("should send the response");
        });

        connection.udp_future = Some(ConnectionFuture::new(async move {
            let udp = VoiceUdp::connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, 123).await?;
            let external = udp.discover().await?;
            Ok((udp, external))
        }));

        std::future::poll_fn(|cx| connection.poll_udp_connect(cx))
            .await
            .expect("the udp leg should finish");

        let queued = connection.socket.queued_messages();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["op"], 1);
        assert_eq!(queued[0]["d"]["protocol"], "udp");
        assert_eq!(queued[0]["d"]["data"]["address"], "9.9.9.9");
        assert_eq!(queued[0]["d"]["data"]["port"], 777);
        assert_eq!(
            queued[0]["d"]["data"]["mode"],
            "aead_xchacha20_poly1305_rtpsize"
        );
        assert!(connection.udp.is_some());
        assert!(connection.udp_future.is_none());
    }

    #[tokio::test]
    async fn session_description_installs_the_key_and_reports_speaking() {
        let mut connection = connection();
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });
        let (_peer, udp) = local_udp(123).await;
        connection.udp = Some(udp);
        connection.state = VoiceConnectionState::UdpHandshaking;

        let secret_key = serde_json::to_string(&[7u8; 32]).expect("should serialize");
        let raw = format!(
            r#"{{"op":4,"d":{{"mode":"aead_xchacha20_poly1305_rtpsize","secret_key":{secret_key}}}}}"#
        );

        let event = connection
            .process_event(&envelope(&raw))
            .expect("session description should be processed");

        let Some(VoiceEvent::Connected(info)) = event else {
            panic!("expected the connected event");
        };
        assert_eq!(info.ssrc, 123);
        assert!(info.udp.has_secret_key());
        assert!(info.udp.is_sending());
        assert_eq!(connection.state(), VoiceConnectionState::Active);

        let queued = connection.socket.queued_messages();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["op"], 5);
        assert_eq!(queued[0]["d"]["ssrc"], 123);
        assert_eq!(queued[0]["d"]["speaking"], 1);
        assert_eq!(queued[0]["d"]["delay"], 0);
    }

    #[tokio::test]
    async fn resumed_reenables_audio_without_rediscovery() {
        let mut connection = connection();
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });
        let (_peer, udp) = local_udp(123).await;
        udp.set_secret_key(EncryptMode::XChaCha20Poly1305, &[7; 32])
            .expect("first install");
        udp.stop_sending();
        connection.udp = Some(Arc::clone(&udp));
        connection.state = VoiceConnectionState::Resuming;

        let event = connection
            .process_event(&envelope(r#"{"op":9,"d":null}"#))
            .expect("resumed should be processed");

        assert!(matches!(event, Some(VoiceEvent::Resumed)));
        assert_eq!(connection.state(), VoiceConnectionState::Active);
        assert!(udp.is_sending());
        assert!(connection.udp_future.is_none());
    }

    #[tokio::test]
    async fn voice_server_crash_resumes() {
        let mut connection = connection();
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });

        let event = connection.process_disconnect(Some(CloseFrame::new(4015, "server crashed")));
        assert!(matches!(event, VoiceEvent::Reconnecting));
        assert!(connection.session.is_some());
        assert_eq!(connection.state(), VoiceConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn channel_disconnect_tears_the_connection_down() {
        let mut connection = connection();
        connection.session = Some(VoiceSession {
            mode: EncryptMode::XChaCha20Poly1305,
            ssrc: 123,
        });

        let event = connection.process_disconnect(Some(CloseFrame::new(4014, "disconnected")));
        assert!(matches!(event, VoiceEvent::Closed(_)));
        assert!(connection.session.is_none());
        assert_eq!(connection.state(), VoiceConnectionState::Closed);
    }

    #[tokio::test]
    async fn authentication_failure_is_fatal() {
        let mut connection = connection();
        let event =
            connection.process_disconnect(Some(CloseFrame::new(4004, "authentication failed")));
        assert!(matches!(event, VoiceEvent::Closed(_)));
        assert_eq!(connection.state(), VoiceConnectionState::Closed);
    }
}

pub mod error;

use self::error::{VoiceUdpError, VoiceUdpErrorType};
use crate::crypto::EncryptMode;
use discortp::discord::{IpDiscoveryPacket, IpDiscoveryType, MutableIpDiscoveryPacket};
use heliograph_types::SECRET_KEY_LEN;
use std::net::{IpAddr, UdpSocket};
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::trace;

use crate::crypto::Aead;

/// The UDP transport paired with one voice session.
///
/// It owns the socket, the SSRC assigned by the voice server and, once
/// the session description arrives, the AEAD encryptor built from the
/// session secret key. The key is write-once per session; until it is
/// installed every [`send`] is rejected, so no frame can leave before the
/// handshake finished.
///
/// Sending is additionally gated behind [`start_sending`] /
/// [`stop_sending`]. The audio encode loop (which is not part of this
/// crate) keeps pushing frames across a control-channel resume; pausing
/// the gate discards them instead of leaking packets through a
/// half-reestablished session.
///
/// The type is synchronous by design apart from the connect/discovery
/// handshake, because audio frames must be sent in a timed manner and the
/// encode loops of common audio libraries are not async.
///
/// [`send`]: Self::send
/// [`start_sending`]: Self::start_sending
/// [`stop_sending`]: Self::stop_sending
#[derive(Debug)]
pub struct VoiceUdp {
    /// Encryptor installed from the session description, write-once.
    aead: OnceLock<Box<dyn Aead>>,

    keep_alive_counter: AtomicU32,

    /// Whether audio frames may currently leave the socket.
    sending: AtomicBool,

    socket: UdpSocket,
    ssrc: u32,
}

impl VoiceUdp {
    /// Binds a fresh local socket and connects it to the voice server's
    /// UDP endpoint announced in the ready payload.
    pub async fn connect(ip: IpAddr, port: u16, ssrc: u32) -> Result<Self, VoiceUdpError> {
        use tokio::net::UdpSocket as TokioUdpSocket;

        let socket = TokioUdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Connect,
                source: Some(Box::new(source)),
            })?;

        socket
            .connect((ip, port))
            .await
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Connect,
                source: Some(Box::new(source)),
            })?;

        let socket = socket.into_std().map_err(|source| VoiceUdpError {
            kind: VoiceUdpErrorType::Connect,
            source: Some(Box::new(source)),
        })?;
        socket
            .set_nonblocking(false)
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Connect,
                source: Some(Box::new(source)),
            })?;

        Ok(Self {
            aead: OnceLock::new(),
            keep_alive_counter: AtomicU32::new(0),
            sending: AtomicBool::new(false),
            socket,
            ssrc,
        })
    }

    /// SSRC assigned to this session by the voice server.
    #[must_use]
    pub const fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Whether the session secret key has been installed.
    #[must_use]
    pub fn has_secret_key(&self) -> bool {
        self.aead.get().is_some()
    }

    /// Whether audio frames may currently leave the socket.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Allows audio frames to leave the socket.
    pub fn start_sending(&self) {
        self.sending.store(true, Ordering::SeqCst);
    }

    /// Pauses audio sending; submitted frames are discarded.
    pub fn stop_sending(&self) {
        self.sending.store(false, Ordering::SeqCst);
    }

    /// Installs the session secret key delivered by the session
    /// description payload.
    ///
    /// The key is write-once for the lifetime of the session; installing
    /// a second one fails with [`VoiceUdpErrorType::KeyAlreadyInstalled`].
    pub fn set_secret_key(
        &self,
        mode: EncryptMode,
        key: &[u8; SECRET_KEY_LEN],
    ) -> Result<(), VoiceUdpError> {
        self.aead.set(mode.aead(key)).map_err(|_| VoiceUdpError {
            kind: VoiceUdpErrorType::KeyAlreadyInstalled,
            source: None,
        })
    }

    /// As prescribed by the voice API documentation, the client has to
    /// discover its externally visible address and port before it can
    /// select the UDP protocol.
    ///
    /// The exchange is a fixed-size packet carrying the session's SSRC;
    /// the server echoes it back with the public address and port filled
    /// into the same layout.
    #[allow(clippy::missing_panics_doc)]
    pub async fn discover(&self) -> Result<DiscoverIpResult, VoiceUdpError> {
        let socket = self.clone_nonblocking()?;

        let mut bytes = [0u8; IpDiscoveryPacket::const_packet_size()];
        let mut view =
            MutableIpDiscoveryPacket::new(&mut bytes[..]).expect("fixed buffer fits the packet");
        view.set_pkt_type(IpDiscoveryType::Request);
        view.set_length(70);
        view.set_ssrc(self.ssrc);

        socket.send(&bytes).await.map_err(|source| VoiceUdpError {
            kind: VoiceUdpErrorType::DiscoveringIp,
            source: Some(Box::new(source)),
        })?;

        let (len, _addr) = socket
            .recv_from(&mut bytes)
            .await
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::DiscoveringIp,
                source: Some(Box::new(source)),
            })?;

        let view = IpDiscoveryPacket::new(&bytes[..len]).ok_or_else(|| VoiceUdpError {
            kind: VoiceUdpErrorType::DiscoveringIp,
            source: Some("invalid ip discovery response".into()),
        })?;

        if view.get_pkt_type() != IpDiscoveryType::Response {
            return Err(VoiceUdpError {
                kind: VoiceUdpErrorType::DiscoveringIp,
                source: Some("invalid ip discovery response".into()),
            });
        }

        let nul_byte_index = view
            .get_address_raw()
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| VoiceUdpError {
                kind: VoiceUdpErrorType::DiscoveringIp,
                source: Some("invalid ip discovery response".into()),
            })?;

        let address_raw = &view.get_address_raw()[..nul_byte_index];
        let address_str = std::str::from_utf8(address_raw).map_err(|_| VoiceUdpError {
            kind: VoiceUdpErrorType::DiscoveringIp,
            source: Some("invalid ip discovery response".into()),
        })?;

        let address = IpAddr::from_str(address_str).map_err(|_| VoiceUdpError {
            kind: VoiceUdpErrorType::DiscoveringIp,
            source: Some("invalid ip discovery response".into()),
        })?;

        Ok(DiscoverIpResult {
            address,
            port: view.get_port(),
        })
    }

    /// Encrypts one audio frame and transmits it as `header || ciphertext`.
    ///
    /// The frame is rejected until a secret key has been installed. While
    /// sending is paused the frame is silently discarded, which lets the
    /// encode loop keep running across a control-channel resume.
    pub fn send(&self, nonce: &[u8], header: &[u8], frame: &[u8]) -> Result<(), VoiceUdpError> {
        let Some(aead) = self.aead.get() else {
            return Err(VoiceUdpError {
                kind: VoiceUdpErrorType::NoSecretKey,
                source: None,
            });
        };

        if !self.is_sending() {
            trace!("discarding audio frame while sending is paused");
            return Ok(());
        }

        let ciphertext = aead
            .encrypt(nonce, header, frame)
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Encrypting,
                source: Some(Box::new(source)),
            })?;

        let mut packet = Vec::with_capacity(header.len() + ciphertext.len());
        packet.extend_from_slice(header);
        packet.extend_from_slice(&ciphertext);

        self.socket
            .send(&packet)
            .map(|_| ())
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Sending,
                source: Some(Box::new(source)),
            })
    }

    /// Sends a keepalive packet to the voice server.
    ///
    /// Keepalives have to go out roughly every five seconds so NAT
    /// mappings along the path do not expire.
    pub fn send_keepalive(&self) -> Result<(), VoiceUdpError> {
        let counter = self.keep_alive_counter.fetch_add(1, Ordering::SeqCst);

        self.socket
            .send(&counter.to_be_bytes())
            .map(|_| ())
            .map_err(|source| VoiceUdpError {
                kind: VoiceUdpErrorType::Sending,
                source: Some(Box::new(source)),
            })
    }

    /// Clones the socket into a nonblocking handle for the async parts of
    /// the handshake.
    fn clone_nonblocking(&self) -> Result<tokio::net::UdpSocket, VoiceUdpError> {
        let socket = self.socket.try_clone().map_err(|source| VoiceUdpError {
            kind: VoiceUdpErrorType::Connect,
            source: Some(Box::new(source)),
        })?;
        socket.set_nonblocking(true).map_err(|source| VoiceUdpError {
            kind: VoiceUdpErrorType::Connect,
            source: Some(Box::new(source)),
        })?;

        tokio::net::UdpSocket::from_std(socket).map_err(|source| VoiceUdpError {
            kind: VoiceUdpErrorType::Connect,
            source: Some(Box::new(source)),
        })
    }
}

/// It contains the details that can be retrieved with [`VoiceUdp::discover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverIpResult {
    /// External IP address of the client.
    pub address: IpAddr,

    /// External UDP port bound by the client.
    pub port: u16,
}

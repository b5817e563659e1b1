use futures::{Sink, Stream, ready};
use heliograph_types::payload::voice::VoiceHello;
use heliograph_types::{CloseFrame, Envelope, VoiceCloseCode, VoiceOpCode};
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio_websockets::{CloseCode as WsCloseCode, Error as WsError, Message as WsMessage};
use tracing::{debug, trace, warn};

pub mod error;

use self::error::{VoiceSocketError, VoiceSocketErrorType};
use super::SocketState;
use super::compress;
use super::heartbeat::Heartbeater;
use super::internal::{ConnectionFuture, WsConnection};
use crate::reconnect;

#[derive(Debug)]
struct Pending {
    message: Option<WsMessage>,
    is_heartbeat: bool,
}

impl Pending {
    fn close(frame: &CloseFrame<'_>) -> Self {
        Self {
            message: Some(WsMessage::close(
                WsCloseCode::try_from(frame.code).ok(),
                &frame.reason,
            )),
            is_heartbeat: false,
        }
    }
}

/// The voice gateway sibling of [`GatewaySocket`]: transport, heartbeats
/// with zombie detection and reconnection with backoff against the voice
/// control channel.
///
/// The voice gateway carries no dispatch sequence numbers, heartbeats it
/// with a millisecond nonce instead of a replay cursor, and classifies
/// closures with its own close code table. Session handling (identify,
/// resume, the UDP leg of the handshake) is layered on top by
/// [`VoiceConnection`].
///
/// [`GatewaySocket`]: super::GatewaySocket
/// [`VoiceConnection`]: crate::voice::VoiceConnection
#[derive(Debug)]
pub struct VoiceSocket {
    /// WebSocket connection, which may be connected to the voice gateway.
    connection: Option<WsConnection>,

    /// WebSocket endpoint to connect to the voice gateway.
    endpoint: String,

    /// Future to establish a WebSocket connection with the voice gateway.
    future: Option<ConnectionFuture<WsConnection, WsError>>,

    /// This value determines whether it has gracefully disconnected
    /// before. This is useful to determine whether the socket has
    /// reconnected or not.
    gracefully_disconnected: bool,

    /// This allows to keep track of heartbeats during the lifetime
    /// of one voice gateway connection.
    heartbeater: Option<Heartbeater>,

    /// Messages waiting to be sent to the voice gateway, in order.
    pending: VecDeque<Pending>,

    /// Pending event, waiting to be handed to the user via `.next()`.
    pending_event: Option<VoiceSocketEvent>,

    /// Current state of a [`VoiceSocket`].
    state: SocketState,
}

impl VoiceSocket {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self {
            connection: None,
            endpoint,
            future: None,
            gracefully_disconnected: true,
            heartbeater: None,
            pending: VecDeque::new(),
            pending_event: None,
            state: SocketState::Disconnected { attempts: 0 },
        }
    }

    /// Gets the heartbeat information of the socket.
    ///
    /// It returns `None` if it has not connected to the voice gateway.
    #[must_use]
    pub fn heartbeat(&self) -> Option<&Heartbeater> {
        self.heartbeater.as_ref()
    }

    /// Gets the current state of [`VoiceSocket`].
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Queues a message to be sent to the voice gateway.
    pub fn send<T: Serialize>(&mut self, payload: &T) {
        let event = serde_json::to_string(payload).expect("should serialize");
        self.pending.push_back(Pending {
            message: Some(WsMessage::text(event)),
            is_heartbeat: false,
        });
    }

    /// Queues to close the WebSocket connection with the voice gateway.
    pub fn close(&mut self, frame: CloseFrame<'static>) {
        self.close_inner(DisconnectCause::User(frame));
    }
}

impl VoiceSocket {
    fn close_inner(&mut self, cause: DisconnectCause) {
        self.heartbeater = None;
        self.state = match cause {
            DisconnectCause::Transport => SocketState::Disconnected { attempts: 0 },
            DisconnectCause::Gateway { code } => Self::state_after_close(code),
            DisconnectCause::User(frame) => {
                let code = frame.code;
                self.pending.push_back(Pending::close(&frame));
                if matches!(code, 1000 | 1001) {
                    self.gracefully_disconnected = true;
                    SocketState::Closed
                } else {
                    Self::state_after_close(Some(code))
                }
            }
        };
    }

    fn state_after_close(code: Option<u16>) -> SocketState {
        let can_reconnect = match code.map(VoiceCloseCode::try_from) {
            Some(Ok(code)) => code.can_reconnect(),
            // Unknown codes and abnormal closures stay reconnectable.
            _ => true,
        };
        SocketState::after_close(can_reconnect)
    }

    fn queue_heartbeat(&mut self) {
        // The voice gateway echoes the nonce back in its acknowledgement.
        let payload = serde_json::to_string(&json!({
            "op": VoiceOpCode::Heartbeat,
            "d": SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or_default()
                .as_millis(),
        }))
        .expect("should serialize");

        self.pending.push_back(Pending {
            message: Some(WsMessage::text(payload)),
            is_heartbeat: true,
        });
    }

    /// Updates the socket's internal state from one voice gateway frame.
    ///
    /// Malformed frames and unknown opcodes are logged and dropped; the
    /// connection stays up either way.
    fn process_frame(&mut self, event: &str) -> Option<Envelope> {
        let envelope = match serde_json::from_str::<Envelope>(event) {
            Ok(envelope) => envelope,
            Err(source) => {
                warn!(?source, "dropping malformed voice gateway frame");
                return None;
            }
        };

        let Some(opcode) = VoiceOpCode::from(envelope.op) else {
            warn!(op = envelope.op, "received unknown voice gateway opcode");
            return None;
        };

        match opcode {
            VoiceOpCode::Hello => match envelope.data::<VoiceHello>() {
                Ok(hello) => {
                    let interval = Duration::from_secs_f64(hello.heartbeat_interval / 1000.0);
                    debug!(heartbeat_interval = ?interval, "received hello event");
                    self.heartbeater = Some(Heartbeater::new(interval));
                }
                Err(source) => {
                    warn!(?source, "dropping hello frame with a malformed payload");
                    return None;
                }
            },
            VoiceOpCode::HeartbeatAck => {
                if let Some(hbr) = self.heartbeater.as_mut() {
                    if hbr.has_sent() {
                        hbr.acknowledged();
                        trace!(latency = ?hbr.recent_latency(), "received heartbeat ack");
                    } else {
                        warn!("received unwanted heartbeat ack");
                    }
                }
            }
            _ => {}
        }

        Some(envelope)
    }
}

impl VoiceSocket {
    /// Attempts to send the queued messages to the voice gateway if
    /// self.connection is `Some`.
    fn poll_send_pending(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        loop {
            let Some(ws) = self.connection.as_mut() else {
                return Poll::Ready(Ok(()));
            };
            let Some(pending) = self.pending.front_mut() else {
                return Poll::Ready(Ok(()));
            };

            ready!(Pin::new(&mut *ws).poll_ready(cx))?;
            if let Some(message) = pending.message.take() {
                Pin::new(&mut *ws).start_send(message)?;
            }
            ready!(Pin::new(&mut *ws).poll_flush(cx))?;

            let is_heartbeat = pending.is_heartbeat;
            if is_heartbeat {
                if let Some(hbr) = self.heartbeater.as_mut() {
                    hbr.record_sent();
                }
            }
            self.pending.pop_front();
        }
    }

    /// Attempts to send due messages to the voice gateway.
    fn poll_send(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        loop {
            trace!("poll_send - poll_send_pending");
            ready!(self.poll_send_pending(cx))?;

            let due = self
                .heartbeater
                .as_mut()
                .is_some_and(|h| h.interval().poll_tick(cx).is_ready());
            if !due {
                return Poll::Ready(Ok(()));
            }

            if self
                .heartbeater
                .as_ref()
                .is_some_and(Heartbeater::is_zombied)
            {
                warn!("connection is failed or \"zombied\", closing connection");
                self.close_inner(DisconnectCause::User(CloseFrame::RESUME));
                return Poll::Ready(Ok(()));
            }

            trace!("sending heartbeat");
            self.queue_heartbeat();
        }
    }

    /// Attempts to connect to the voice gateway with the WebSocket
    /// protocol.
    ///
    /// # Returns
    ///
    /// * `Poll::Pending` if connection is in progress.
    /// * `Poll::Ready(Ok(true))` if the WebSocket connection has been
    ///   successfully connected.
    /// * `Poll::Ready(Ok(false))` if the connection cannot be reconnected.
    /// * `Poll::Ready(Err)` if connecting to the voice gateway failed.
    fn poll_ws_connect(&mut self, cx: &mut Context<'_>) -> Poll<Result<bool, WsError>> {
        match self.state {
            SocketState::Closed => {
                ready!(self.poll_send_pending(cx))?;
                if let Some(connection) = self.connection.as_mut() {
                    _ = ready!(Pin::new(connection).poll_close(cx));
                }
                return Poll::Ready(Ok(false));
            }
            SocketState::Disconnected { attempts } if self.connection.is_none() => {
                if self.future.is_none() {
                    let url = format!(
                        "wss://{}/?v={}",
                        self.endpoint,
                        heliograph_types::VOICE_API_VERSION,
                    );
                    debug!(?attempts, ?url, "connecting to the voice gateway");

                    self.future = Some(ConnectionFuture::new(async move {
                        tokio::time::sleep(reconnect::backoff(attempts)).await;

                        let tls = tokio_websockets::Connector::new()?;
                        Ok(tokio_websockets::ClientBuilder::new()
                            .uri(&url)
                            .expect("URL should be valid")
                            .limits(tokio_websockets::Limits::unlimited())
                            .connector(&tls)
                            .connect()
                            .await?
                            .0)
                    }));
                }

                trace!("poll_ws_connect - self.future");

                let result =
                    ready!(Pin::new(&mut self.future.as_mut().expect("set above").0).poll(cx));
                self.future = None;
                match result {
                    Ok(connection) => {
                        self.connection = Some(connection);
                        self.state = SocketState::Connected;
                        if self.gracefully_disconnected {
                            self.gracefully_disconnected = false;
                        } else {
                            // this is to inform the user that this has been
                            // reconnected and their session needs to be
                            // resumed.
                            self.pending_event = Some(VoiceSocketEvent::Reconnected);
                        }
                    }
                    Err(source) => {
                        self.state = SocketState::Disconnected {
                            attempts: attempts.saturating_add(1),
                        };
                        return Poll::Ready(Err(source));
                    }
                }
            }
            _ => {}
        }
        Poll::Ready(Ok(true))
    }
}

#[cfg(test)]
impl VoiceSocket {
    /// Messages queued for sending, decoded back for assertions.
    pub(crate) fn queued_messages(&self) -> Vec<serde_json::Value> {
        self.pending
            .iter()
            .filter_map(|pending| pending.message.as_ref())
            .filter_map(|message| message.as_text())
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }
}

/// This type allows to determine the cause of closure of a connection.
#[derive(Debug)]
enum DisconnectCause {
    /// The voice gateway initiated the close.
    Gateway { code: Option<u16> },

    /// The user initiated the close.
    User(CloseFrame<'static>),

    /// A transport error initiated the close.
    Transport,
}

/// The resulting value of `.next()` function in [`VoiceSocket`].
#[derive(Debug)]
pub enum VoiceSocketEvent {
    /// Received an envelope from the voice gateway.
    Event(Envelope),

    /// Successfully reconnected to the voice gateway with a fresh
    /// transport.
    Reconnected,

    /// Got disconnected from the voice gateway.
    Disconnected(Option<CloseFrame<'static>>),
}

const ABNORMAL_CLOSE: CloseFrame<'static> = CloseFrame::new(1006, "");

impl Stream for VoiceSocket {
    type Item = Result<VoiceSocketEvent, VoiceSocketError>;

    #[tracing::instrument(skip_all, name = "poll", fields(
        endpoint = ?self.endpoint,
        latency = ?self.heartbeater.as_ref().and_then(Heartbeater::recent_latency),
        state = ?self.state,
    ))]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending_event.take() {
            return Poll::Ready(Some(Ok(event)));
        }

        loop {
            match ready!(self.poll_ws_connect(cx)) {
                Ok(false) => return Poll::Ready(None),
                Ok(true) => {}
                Err(error) => {
                    return Poll::Ready(Some(Err(VoiceSocketError {
                        kind: VoiceSocketErrorType::WebSocket,
                        source: Some(Box::new(error)),
                    })));
                }
            }

            if ready!(self.poll_send(cx)).is_err() {
                self.close_inner(DisconnectCause::Transport);
                self.connection = None;
                return Poll::Ready(Some(Ok(VoiceSocketEvent::Disconnected(Some(
                    ABNORMAL_CLOSE,
                )))));
            }

            let message = match ready!(
                Pin::new(self.connection.as_mut().expect("connected while polling")).poll_next(cx)
            ) {
                Some(Ok(message)) => message,
                Some(Err(_)) if self.state.is_disconnected() => continue,
                Some(Err(_)) => {
                    self.close_inner(DisconnectCause::Transport);
                    return Poll::Ready(Some(Ok(VoiceSocketEvent::Disconnected(Some(
                        ABNORMAL_CLOSE,
                    )))));
                }
                None => {
                    _ = ready!(
                        Pin::new(self.connection.as_mut().expect("connected while polling"))
                            .poll_close(cx)
                    );
                    debug!("WebSocket connection closed");

                    if !self.state.is_disconnected() {
                        self.close_inner(DisconnectCause::Transport);
                    }
                    self.connection = None;
                    continue;
                }
            };

            if message.is_close() {
                let (code, reason) = message.as_close().expect("close message");
                let frame = (code != WsCloseCode::NO_STATUS_RECEIVED).then(|| CloseFrame {
                    code: code.into(),
                    reason: Cow::Owned(reason.to_string()),
                });

                debug!(?frame, "received WebSocket close message");
                if !self.state.is_disconnected() {
                    self.close_inner(DisconnectCause::Gateway {
                        code: frame.as_ref().map(|f| f.code),
                    });
                }
                return Poll::Ready(Some(Ok(VoiceSocketEvent::Disconnected(frame))));
            }

            // Binary frames on the voice control channel are compressed
            // per message, unlike the transport stream of the gateway.
            let text = if message.is_text() {
                Some(message.as_text().expect("text message").to_owned())
            } else if message.is_binary() {
                match compress::decompress_message(&message.as_payload()[..])
                    .and_then(compress::into_text)
                {
                    Ok(text) => Some(text),
                    Err(source) => {
                        warn!(?source, "dropping frame that failed to decompress");
                        None
                    }
                }
            } else {
                None
            };

            let Some(text) = text else { continue };
            match self.process_frame(&text) {
                Some(envelope) => {
                    return Poll::Ready(Some(Ok(VoiceSocketEvent::Event(envelope))));
                }
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SocketState, VoiceSocket};
    use heliograph_types::CloseFrame;

    fn socket() -> VoiceSocket {
        VoiceSocket::new("region.discord.media:443".to_string())
    }

    #[tokio::test]
    async fn hello_starts_the_heartbeater_from_a_float_interval() {
        let mut socket = socket();
        socket
            .process_frame(r#"{"op":8,"d":{"heartbeat_interval":13750.0}}"#)
            .expect("hello should be forwarded");

        let heartbeat = socket.heartbeat().expect("heartbeater should exist");
        assert_eq!(heartbeat.period(), std::time::Duration::from_millis(13750));
    }

    #[tokio::test]
    async fn fatal_voice_close_codes_end_the_socket() {
        let mut socket = socket();
        socket.close(CloseFrame::new(4004, "authentication failed"));
        assert!(socket.state().is_closed());
    }

    #[tokio::test]
    async fn resumable_voice_close_codes_keep_it_reconnectable() {
        let mut socket = socket();
        socket.close(CloseFrame::RESUME);
        assert_eq!(socket.state(), SocketState::Disconnected { attempts: 0 });
    }
}

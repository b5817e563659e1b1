use futures::{Sink, Stream, ready};
use heliograph_types::payload::incoming::Hello;
use heliograph_types::{CloseFrame, Envelope};
use heliograph_types::{CloseCode, OpCode};
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_websockets::{CloseCode as WsCloseCode, Error as WsError, Message as WsMessage};
use tracing::{debug, trace, warn};

pub mod error;

use self::error::{GatewaySocketError, GatewaySocketErrorType};
use super::SocketState;
use super::compress::{self, CompressError, Inflater};
use super::heartbeat::Heartbeater;
use super::internal::{ConnectionFuture, WsConnection};
use crate::reconnect;

#[derive(Debug)]
struct Pending {
    message: Option<WsMessage>,
    is_heartbeat: bool,
}

impl Pending {
    fn text(json: String) -> Self {
        Self {
            message: Some(WsMessage::text(json)),
            is_heartbeat: false,
        }
    }

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

/// This struct meets the primitive requirements of handling Discord's
/// WebSocket gateway: heartbeats with zombie detection, transparent
/// reconnection with backoff, frame decompression and envelope parsing.
/// Incoming envelopes arrive through [event streaming] and outgoing
/// messages are queued with the [`send(...)`] method.
///
/// However, this struct does not hold any session state: identification,
/// resumption and dispatch routing are layered on top of it by
/// [`Client`], which allows users to customize that behavior based on
/// their specific requirements. Discord will close the connection if it
/// is sent events without being identified first.
///
/// [`send(...)`]: GatewaySocket::send
/// [event streaming]: futures::StreamExt
/// [`Client`]: crate::client::Client
#[derive(Debug)]
pub struct GatewaySocket {
    /// WebSocket connection, which may be connected to the gateway.
    connection: Option<WsConnection>,

    /// WebSocket endpoint to connect to the gateway.
    endpoint: String,

    /// Future to establish a WebSocket connection with the gateway.
    future: Option<ConnectionFuture<WsConnection, WsError>>,

    /// This value determines whether it has gracefully disconnected
    /// before. This is useful to determine whether the socket has
    /// reconnected or not.
    gracefully_disconnected: bool,

    /// This allows to keep track of heartbeats during the lifetime
    /// of one gateway connection.
    heartbeater: Option<Heartbeater>,

    /// Shared-context decompressor; present when transport compression
    /// was requested for this socket.
    inflater: Option<Inflater>,

    /// Messages waiting to be sent to the gateway, in order.
    pending: VecDeque<Pending>,

    /// Pending event, waiting to be handed to the user via `.next()`.
    pending_event: Option<GatewaySocketEvent>,

    /// Replacement endpoint applied on the next (re)connect.
    reconnect: Option<String>,

    /// Highest dispatch sequence number observed on this connection.
    /// It is echoed inside heartbeat payloads and kept across
    /// reconnections for session resumption.
    sequence: Option<u64>,

    /// Current state of a [`GatewaySocket`].
    state: SocketState,
}

impl GatewaySocket {
    #[must_use]
    pub fn new(endpoint: String, transport_compression: bool) -> Self {
        Self {
            connection: None,
            endpoint,
            future: None,
            gracefully_disconnected: true,
            heartbeater: None,
            inflater: transport_compression.then(Inflater::new),
            pending: VecDeque::new(),
            pending_event: None,
            reconnect: None,
            sequence: None,
            state: SocketState::Disconnected { attempts: 0 },
        }
    }

    /// Gets the heartbeat information of the socket.
    ///
    /// It returns `None` if it has not connected to the gateway.
    #[must_use]
    pub fn heartbeat(&self) -> Option<&Heartbeater> {
        self.heartbeater.as_ref()
    }

    /// Highest dispatch sequence number observed so far.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Gets the current state of [`GatewaySocket`].
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Replaces the endpoint used for the next (re)connection without
    /// touching the current connection.
    pub fn set_endpoint(&mut self, endpoint: String) {
        self.reconnect = Some(endpoint);
    }

    /// Queues a message to be sent to the gateway.
    pub fn send<T: Serialize>(&mut self, payload: &T) {
        let event = serde_json::to_string(payload).expect("should serialize");
        self.pending.push_back(Pending::text(event));
    }

    /// Queues to close the WebSocket connection with the gateway.
    ///
    /// Closing with [`CloseFrame::NORMAL`] is terminal: the stream ends
    /// and no reconnection is attempted. Any other close code keeps the
    /// socket in its reconnecting state.
    pub fn close(&mut self, frame: CloseFrame<'static>) {
        self.close_inner(DisconnectCause::User(frame));
    }
}

impl GatewaySocket {
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
        let can_reconnect = match code.map(CloseCode::try_from) {
            Some(Ok(code)) => code.can_reconnect(),
            // Unknown codes and abnormal closures stay reconnectable.
            _ => true,
        };
        SocketState::after_close(can_reconnect)
    }

    fn queue_heartbeat(&mut self) {
        let payload = serde_json::to_string(&json!({
            "op": OpCode::Heartbeat,
            "d": self.sequence,
        }))
        .expect("should serialize");

        self.pending.push_back(Pending {
            message: Some(WsMessage::text(payload)),
            is_heartbeat: true,
        });
    }

    /// Updates the socket's internal state from one gateway frame.
    ///
    /// Malformed frames and unknown opcodes are logged and dropped;
    /// the connection stays up either way.
    fn process_frame(&mut self, event: &str) -> Option<Envelope> {
        let envelope = match serde_json::from_str::<Envelope>(event) {
            Ok(envelope) => envelope,
            Err(source) => {
                warn!(?source, "dropping malformed gateway frame");
                return None;
            }
        };

        if let Some(seq) = envelope.s {
            // The replay cursor stays monotonic even if frames arrive
            // with older sequence numbers.
            self.sequence = Some(self.sequence.map_or(seq, |current| current.max(seq)));
        }

        let Some(opcode) = OpCode::from(envelope.op) else {
            warn!(op = envelope.op, "received unknown gateway opcode");
            return None;
        };

        match opcode {
            OpCode::Hello => match envelope.data::<Hello>() {
                Ok(hello) => {
                    let interval = Duration::from_millis(hello.heartbeat_interval);
                    debug!(heartbeat_interval = ?interval, "received hello event");
                    self.heartbeater = Some(Heartbeater::new(interval));
                }
                Err(source) => {
                    warn!(?source, "dropping hello frame with a malformed payload");
                    return None;
                }
            },
            OpCode::Heartbeat => {
                trace!("gateway requested an immediate heartbeat");
                self.queue_heartbeat();
            }
            OpCode::HeartbeatAck => {
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

    fn decompress_frame(&mut self, frame: &[u8]) -> Result<Option<String>, CompressError> {
        let bytes = match self.inflater.as_mut() {
            Some(inflater) => match inflater.inflate(frame)? {
                Some(bytes) => bytes.to_vec(),
                None => return Ok(None),
            },
            None => compress::decompress_message(frame)?,
        };

        compress::into_text(bytes).map(Some)
    }
}

impl GatewaySocket {
    /// Attempts to send the queued messages to the gateway if
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

    /// Attempts to send due messages to the gateway.
    ///
    /// # Returns
    ///
    /// * `Poll::Pending` if sending is in progress.
    /// * `Poll::Ready(Ok)` if no more pending messages remain.
    /// * `Poll::Ready(Err)` if sending a message failed.
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

    /// Attempts to connect to the gateway with the WebSocket protocol.
    ///
    /// # Returns
    ///
    /// * `Poll::Pending` if connection is in progress.
    /// * `Poll::Ready(Ok(true))` if the WebSocket connection has been
    ///   successfully connected.
    /// * `Poll::Ready(Ok(false))` if the connection cannot be reconnected.
    /// * `Poll::Ready(Err)` if connecting to the gateway failed.
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
                // Replace the old endpoint with a new one if needed.
                if let Some(new_endpoint) = self.reconnect.take() {
                    self.endpoint = new_endpoint;
                }

                if self.future.is_none() {
                    let compress = if self.inflater.is_some() {
                        "&compress=zlib-stream"
                    } else {
                        ""
                    };
                    let url = format!(
                        "wss://{}/?v={}&encoding=json{compress}",
                        self.endpoint,
                        heliograph_types::API_VERSION,
                    );
                    debug!(?attempts, ?url, "connecting to the gateway");

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
                        if let Some(inflater) = self.inflater.as_mut() {
                            inflater.reset();
                        }
                        if self.gracefully_disconnected {
                            self.gracefully_disconnected = false;
                        } else {
                            // this is to inform the user that this has been
                            // reconnected and their session needs to be
                            // resumed (or re-identified).
                            self.pending_event = Some(GatewaySocketEvent::Reconnected);
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
impl GatewaySocket {
    /// Messages queued for sending, decoded back for assertions.
    pub(crate) fn queued_messages(&self) -> Vec<serde_json::Value> {
        self.pending
            .iter()
            .filter_map(|pending| pending.message.as_ref())
            .filter_map(|message| message.as_text())
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub(crate) fn queued_close_code(&self) -> Option<u16> {
        self.pending
            .iter()
            .filter_map(|pending| pending.message.as_ref())
            .find_map(|message| message.as_close())
            .map(|(code, _)| code.into())
    }
}

/// This type allows to determine the cause of closure of a connection.
#[derive(Debug)]
enum DisconnectCause {
    /// The gateway initiated the close.
    Gateway { code: Option<u16> },

    /// The user initiated the close.
    User(CloseFrame<'static>),

    /// A transport error initiated the close.
    Transport,
}

/// The resulting value of `.next()` function in [`GatewaySocket`].
#[derive(Debug)]
pub enum GatewaySocketEvent {
    /// Received an envelope from the gateway.
    Event(Envelope),

    /// Successfully reconnected to the gateway with a fresh transport.
    Reconnected,

    /// Got disconnected from the gateway.
    Disconnected(Option<CloseFrame<'static>>),
}

const ABNORMAL_CLOSE: CloseFrame<'static> = CloseFrame::new(1006, "");

impl Stream for GatewaySocket {
    type Item = Result<GatewaySocketEvent, GatewaySocketError>;

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
                    return Poll::Ready(Some(Err(GatewaySocketError {
                        kind: GatewaySocketErrorType::WebSocket,
                        source: Some(Box::new(error)),
                    })));
                }
            }

            if ready!(self.poll_send(cx)).is_err() {
                self.close_inner(DisconnectCause::Transport);
                self.connection = None;
                return Poll::Ready(Some(Ok(GatewaySocketEvent::Disconnected(Some(
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
                    return Poll::Ready(Some(Ok(GatewaySocketEvent::Disconnected(Some(
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
                return Poll::Ready(Some(Ok(GatewaySocketEvent::Disconnected(frame))));
            }

            let text = if message.is_text() {
                Some(message.as_text().expect("text message").to_owned())
            } else if message.is_binary() {
                match self.decompress_frame(&message.as_payload()[..]) {
                    Ok(text) => text,
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
                    return Poll::Ready(Some(Ok(GatewaySocketEvent::Event(envelope))));
                }
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GatewaySocket, SocketState};
    use heliograph_types::CloseFrame;

    fn socket() -> GatewaySocket {
        GatewaySocket::new("gateway.discord.gg".to_string(), false)
    }

    #[tokio::test]
    async fn hello_starts_the_heartbeater() {
        let mut socket = socket();
        assert!(socket.heartbeat().is_none());

        let envelope = socket
            .process_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#)
            .expect("hello should be forwarded");
        assert_eq!(envelope.op, 10);

        let heartbeat = socket.heartbeat().expect("heartbeater should exist");
        assert_eq!(heartbeat.period(), std::time::Duration::from_millis(41250));
    }

    #[tokio::test]
    async fn heartbeat_ack_clears_the_pending_probe() {
        let mut socket = socket();
        let _ = socket.process_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
        socket
            .heartbeater
            .as_mut()
            .expect("heartbeater should exist")
            .record_sent();
        assert!(socket.heartbeat().expect("heartbeater").is_zombied());

        let _ = socket.process_frame(r#"{"op":11}"#);
        assert!(!socket.heartbeat().expect("heartbeater").is_zombied());
    }

    #[tokio::test]
    async fn sequence_cursor_is_monotonic() {
        let mut socket = socket();
        let _ = socket.process_frame(r#"{"op":0,"t":"MESSAGE_CREATE","s":5,"d":{}}"#);
        assert_eq!(socket.sequence(), Some(5));

        // A replayed older frame must not move the cursor backwards.
        let _ = socket.process_frame(r#"{"op":0,"t":"MESSAGE_CREATE","s":3,"d":{}}"#);
        assert_eq!(socket.sequence(), Some(5));

        let _ = socket.process_frame(r#"{"op":0,"t":"MESSAGE_CREATE","s":6,"d":{}}"#);
        assert_eq!(socket.sequence(), Some(6));
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_dropped() {
        let mut socket = socket();
        assert!(socket.process_frame("not json at all").is_none());
        assert!(socket.process_frame(r#"{"op":255,"d":null}"#).is_none());
        assert!(socket.state().is_disconnected());
    }

    #[tokio::test]
    async fn server_heartbeat_request_queues_a_probe() {
        let mut socket = socket();
        let _ = socket.process_frame(r#"{"op":0,"t":"MESSAGE_CREATE","s":12,"d":{}}"#);
        let _ = socket.process_frame(r#"{"op":1,"d":null}"#);

        let queued = socket.queued_messages();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["op"], 1);
        assert_eq!(queued[0]["d"], 12);
    }

    #[tokio::test]
    async fn normal_user_close_is_terminal() {
        let mut socket = socket();
        socket.close(CloseFrame::NORMAL);

        assert!(socket.state().is_closed());
        assert_eq!(socket.queued_close_code(), Some(1000));
    }

    #[tokio::test]
    async fn resume_close_keeps_the_socket_reconnectable() {
        let mut socket = socket();
        socket.close(CloseFrame::RESUME);

        assert_eq!(socket.state(), SocketState::Disconnected { attempts: 0 });
    }
}

mod event;
mod info;
mod session;

pub mod error;

pub use self::event::ClientEvent;
pub use self::info::{GatewayConfig, Token};
pub use self::session::Session;

use self::error::{ReceiveEventError, ReceiveEventErrorType};
use crate::dispatch::{EventDispatcher, HandlerRegistry};
use crate::net::Heartbeater;
use crate::net::gateway::{GatewaySocket, GatewaySocketEvent};
use crate::reconnect::{self, CloseEvent, Decision, Initiator};
use futures::{Stream, ready};
use heliograph_types::payload::incoming::Ready;
use heliograph_types::payload::outgoing::{ConnectionProperties, Identify, Resume};
use heliograph_types::{CloseFrame, Envelope, OpCode};
use serde_json::json;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// The current state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Not connected. The socket (re)establishes the transport on its
    /// own with backoff; the client waits for it to come back.
    Disconnected,

    /// The transport is up, waiting for hello to start the handshake.
    Connecting,

    /// Sent identify, waiting for the ready dispatch.
    Identifying,

    /// Sent resume, waiting for the gateway to finish the replay.
    Resuming,

    /// Handshake finished. This is the only state in which dispatch
    /// events are accepted and routed.
    Connected,

    /// A deliberate local shutdown is in progress.
    Closing,

    /// The connection ended for good.
    Closed,
}

impl ClientState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Manages the event gateway connection end to end: drives a
/// [`GatewaySocket`], runs the hello → identify/resume handshake, applies
/// the reconnect policy when the transport drops, and routes dispatch
/// events through the [`HandlerRegistry`] into the [`EventDispatcher`].
///
/// The stream yields connection lifecycle events ([`ClientEvent`]);
/// domain events reach listener code through the dispatcher's worker
/// pool, ordered per entity. Which session handshake runs after a
/// reconnect is decided by [`reconnect::decide`] from the close code of
/// the previous transport: a still-valid session is resumed, an
/// invalidated one is replaced by a fresh identify, and fatal closures
/// end the stream.
#[derive(Debug)]
pub struct Client {
    /// Connection parameters to connect to the gateway.
    config: GatewayConfig,

    /// Worker pool the produced listener deliveries are pushed into.
    dispatcher: EventDispatcher,

    /// Packet handlers, looked up by dispatch event type tag.
    registry: HandlerRegistry,

    /// The current session assigned by the gateway from the ready
    /// dispatch. This is what makes resuming possible.
    session: Option<Session>,

    /// The WebSocket connection used to communicate with the gateway.
    socket: GatewaySocket,

    /// Current state of this mere struct here.
    state: ClientState,
}

impl Client {
    #[must_use]
    pub fn new(config: GatewayConfig, registry: HandlerRegistry, dispatcher: EventDispatcher) -> Self {
        let socket = GatewaySocket::new(config.endpoint.clone(), config.transport_compression);
        Self {
            config,
            dispatcher,
            registry,
            session: None,
            socket,
            state: ClientState::Disconnected,
        }
    }

    /// Gets the current state of [`Client`].
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Gets the current gateway session, if the handshake installed one.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Gets the heartbeat information of the underlying socket.
    ///
    /// It returns `None` if it has not connected to the gateway.
    #[must_use]
    pub fn heartbeat(&self) -> Option<&Heartbeater> {
        self.socket.heartbeat()
    }

    /// Queues a deliberate shutdown.
    ///
    /// The gateway invalidates the session on a normal closure, so no
    /// reconnection follows; the stream ends after a final
    /// [`ClientEvent::Closed`].
    pub fn close(&mut self) {
        self.state = ClientState::Closing;
        self.socket.close(CloseFrame::NORMAL);
    }

    /// Tears the client down and waits until the dispatcher drained
    /// every queued listener delivery.
    pub async fn shutdown(self) {
        self.dispatcher.close().await;
    }
}

impl Client {
    fn send_identify(&mut self) {
        debug!("identifying a fresh gateway session");
        self.state = ClientState::Identifying;
        self.socket.send(&json!({
            "op": OpCode::Identify,
            "d": Identify {
                token: self.config.token.expose().into(),
                properties: ConnectionProperties::library(),
                compress: false,
                intents: self.config.intents,
            },
        }));
    }

    fn send_resume(&mut self) {
        let Some((session_id, seq)) = self
            .session
            .as_ref()
            .map(|session| (session.id().to_owned(), session.sequence()))
        else {
            // No session survived; a resume would be rejected anyway.
            self.send_identify();
            return;
        };

        debug!(session = ?session_id, ?seq, "resuming the retained gateway session");
        self.state = ClientState::Resuming;
        self.socket.send(&json!({
            "op": OpCode::Resume,
            "d": Resume {
                token: self.config.token.expose().into(),
                session_id,
                seq,
            },
        }));
    }

    /// Updates the client's state from one decoded envelope and returns
    /// the lifecycle event to surface, if any.
    fn process_event(
        &mut self,
        envelope: &Envelope,
    ) -> Result<Option<ClientEvent>, ReceiveEventError> {
        match OpCode::from(envelope.op) {
            Some(OpCode::Dispatch) => self.process_dispatch(envelope),
            Some(OpCode::Hello) => {
                // The socket already started heartbeating from hello;
                // what is left is choosing how to attach the session.
                if self.session.is_some() {
                    self.send_resume();
                } else {
                    self.send_identify();
                }
                Ok(None)
            }
            Some(OpCode::Reconnect) => {
                debug!("gateway asked for an immediate reconnect");
                // Closing with the resumable code keeps the session; the
                // socket reconnects and the next hello resumes it.
                self.socket.close(CloseFrame::RESUME);
                Ok(None)
            }
            Some(OpCode::InvalidSession) => {
                let resumable = envelope.data::<bool>().unwrap_or(false);
                debug!(?resumable, "gateway invalidated the session");
                if resumable && self.session.is_some() {
                    self.send_resume();
                } else {
                    self.session = None;
                    self.send_identify();
                }
                Ok(None)
            }
            // Heartbeat bookkeeping lives inside the socket.
            _ => Ok(None),
        }
    }

    fn process_dispatch(
        &mut self,
        envelope: &Envelope,
    ) -> Result<Option<ClientEvent>, ReceiveEventError> {
        if let (Some(session), Some(seq)) = (self.session.as_mut(), envelope.s) {
            session.observe_sequence(seq);
        }

        let Some(kind) = envelope.t.as_deref() else {
            warn!("received dispatch event without a type tag");
            return Ok(None);
        };

        match kind {
            "READY" => {
                let ready = envelope.data::<Ready>().map_err(|source| ReceiveEventError {
                    kind: ReceiveEventErrorType::Deserializing,
                    source: Some(Box::new(source)),
                })?;
                debug!(session = ?ready.session_id, "gateway session is ready");

                self.socket
                    .set_endpoint(strip_scheme(&ready.resume_gateway_url).to_owned());
                self.session = Some(Session::new(
                    ready.session_id,
                    Some(ready.resume_gateway_url.into_boxed_str()),
                    envelope.s.unwrap_or_default(),
                ));
                self.state = ClientState::Connected;

                // Cache layers typically hook the ready payload as well.
                self.route_dispatch(kind, envelope);
                Ok(Some(ClientEvent::Ready))
            }
            "RESUMED" => {
                debug!("gateway session resumed");
                self.state = ClientState::Connected;
                Ok(Some(ClientEvent::Resumed))
            }
            _ if self.state.is_connected() => {
                self.route_dispatch(kind, envelope);
                Ok(None)
            }
            _ => {
                warn!(%kind, state = ?self.state, "dropping dispatch event outside of the connected state");
                Ok(None)
            }
        }
    }

    /// Looks the event type tag up in the handler registry and pushes the
    /// produced deliveries into the dispatcher.
    fn route_dispatch(&self, kind: &str, envelope: &Envelope) {
        let Some(handler) = self.registry.get(kind) else {
            debug!(%kind, "no handler registered for dispatch event");
            return;
        };
        let Some(data) = envelope.d.as_deref() else {
            warn!(%kind, "dispatch event without a payload");
            return;
        };

        match handler.handle(data) {
            Ok(deliveries) => {
                for delivery in deliveries {
                    self.dispatcher.submit(delivery);
                }
            }
            // A broken handler must not take the connection down with it.
            Err(source) => warn!(%kind, ?source, "packet handler failed to decode the event"),
        }
    }

    fn process_disconnect(&mut self, frame: Option<CloseFrame<'static>>) -> ClientEvent {
        if matches!(self.state, ClientState::Closing) {
            // A deliberate shutdown never reconnects, whatever close
            // frame the server answered with. The socket is already in
            // its terminal state from the normal close.
            debug!(?frame, "deliberate shutdown finished");
            self.state = ClientState::Closed;
            return ClientEvent::Closed(frame);
        }

        let close = CloseEvent::new(
            frame.as_ref().map(|f| f.code),
            frame
                .as_ref()
                .map(|f| f.reason.clone().into_owned())
                .unwrap_or_default(),
            Initiator::Remote,
        );

        match reconnect::decide(&close, self.session.is_some()) {
            None | Some(Decision::Fatal) => {
                warn!(?frame, "gateway connection is lost for good");
                self.session = None;
                self.state = ClientState::Closed;
                ClientEvent::Closed(frame)
            }
            Some(Decision::Reidentify) => {
                debug!(?frame, "session is gone, identifying from scratch after reconnect");
                self.session = None;
                self.state = ClientState::Disconnected;
                ClientEvent::Reconnecting
            }
            Some(Decision::Resume) => {
                debug!(?frame, "resuming the retained session after reconnect");
                self.state = ClientState::Disconnected;
                ClientEvent::Reconnecting
            }
        }
    }
}

impl Stream for Client {
    type Item = Result<ClientEvent, ReceiveEventError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let event = match ready!(Pin::new(&mut self.socket).poll_next(cx)) {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    return Poll::Ready(Some(Err(ReceiveEventError {
                        kind: ReceiveEventErrorType::Reconnect,
                        source: Some(Box::new(source)),
                    })));
                }
                None => {
                    if matches!(self.state, ClientState::Closed) {
                        return Poll::Ready(None);
                    }
                    self.state = ClientState::Closed;
                    return Poll::Ready(Some(Ok(ClientEvent::Closed(None))));
                }
            };

            match event {
                GatewaySocketEvent::Reconnected => {
                    debug!("transport reconnected, waiting for hello");
                    self.state = ClientState::Connecting;
                }
                GatewaySocketEvent::Disconnected(frame) => {
                    let event = self.process_disconnect(frame);
                    return Poll::Ready(Some(Ok(event)));
                }
                GatewaySocketEvent::Event(envelope) => match self.process_event(&envelope) {
                    Ok(None) => {}
                    Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                    Err(error) => return Poll::Ready(Some(Err(error))),
                },
            }
        }
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url)
}

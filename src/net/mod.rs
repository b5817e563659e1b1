pub mod compress;
pub mod gateway;
pub mod heartbeat;
pub mod udp;
pub mod voice;

pub use self::gateway::GatewaySocket;
pub use self::heartbeat::Heartbeater;
pub use self::udp::VoiceUdp;
pub use self::voice::VoiceSocket;

/// Determines the transport state of a gateway socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Successfully connected to the gateway.
    Connected,

    /// Disconnected from the gateway.
    ///
    /// It may reconnect to the gateway if needed.
    Disconnected {
        /// Consecutive failed connect rounds so far, used to seed the
        /// reconnect backoff.
        attempts: u32,
    },

    /// Permanently closed; the socket will not attempt to reconnect.
    Closed,
}

impl SocketState {
    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    #[must_use]
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub(crate) const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    #[must_use]
    pub(crate) const fn after_close(can_reconnect: bool) -> Self {
        if can_reconnect {
            Self::Disconnected { attempts: 0 }
        } else {
            Self::Closed
        }
    }
}

pub(crate) mod internal {
    use std::pin::Pin;
    use tokio::net::TcpStream;
    use tokio_websockets::{MaybeTlsStream, WebSocketStream};

    /// [`tokio_websockets`] library WebSocket connection.
    pub type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Wrapper struct around an `async fn` with a `Debug` implementation.
    pub struct ConnectionFuture<T, E>(pub Pin<Box<dyn Future<Output = Result<T, E>> + Send>>);

    impl<T, E> ConnectionFuture<T, E> {
        #[must_use]
        pub fn new<F: Future<Output = Result<T, E>> + Send + 'static>(future: F) -> Self {
            Self(Box::pin(future))
        }
    }

    impl<T, E> std::fmt::Debug for ConnectionFuture<T, E> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("ConnectionFuture")
                .field(&"<async fn>")
                .finish()
        }
    }

    /// Wrapper struct around a channel with a `Debug` implementation to
    /// get rid of `Debug` clutter made from [`tokio`].
    pub(crate) struct MpscWrapper<T>(pub T);

    impl<T> std::fmt::Debug for MpscWrapper<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("Channel").finish_non_exhaustive()
        }
    }

    impl<T> std::ops::Deref for MpscWrapper<T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }

    impl<T> std::ops::DerefMut for MpscWrapper<T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.0
        }
    }
}

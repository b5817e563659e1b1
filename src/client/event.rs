use heliograph_types::CloseFrame;

/// The resulting value of `.next()` function in [`Client`].
///
/// Only connection lifecycle events surface here; dispatch events are
/// routed through the registered packet handlers into the event
/// dispatcher instead of flowing through this stream.
///
/// [`Client`]: super::Client
#[derive(Debug)]
pub enum ClientEvent {
    /// The identify handshake finished and dispatch events are flowing.
    Ready,

    /// The retained session was reattached after a transport drop and
    /// the gateway replayed the missed events.
    Resumed,

    /// The transport dropped; the client is reconnecting on its own and
    /// will resume or re-identify as the close code allows.
    Reconnecting,

    /// The connection ended for good, either deliberately or because of
    /// a close code that forbids retrying. No reconnection follows.
    Closed(Option<CloseFrame<'static>>),
}

use std::error::Error;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::net::internal::MpscWrapper;
use heliograph_types::CloseFrame;
use heliograph_types::payload::SpeakingFlags;

/// Commands that may be queued from other tasks.
#[derive(Debug)]
pub(crate) enum VoiceCommand {
    Close(CloseFrame<'static>),
    Speaking(SpeakingFlags),
}

/// A channel between the [voice connection] and the user for controlling
/// it from tasks that do not own it.
///
/// [voice connection]: super::VoiceConnection
#[derive(Debug)]
pub(crate) struct MessageChannel {
    pub(crate) command_rx: MpscWrapper<mpsc::UnboundedReceiver<VoiceCommand>>,
    pub(crate) command_tx: MpscWrapper<mpsc::UnboundedSender<VoiceCommand>>,
}

impl MessageChannel {
    #[must_use]
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            command_rx: MpscWrapper(command_rx),
            command_tx: MpscWrapper(command_tx),
        }
    }

    #[must_use]
    pub fn sender(&self) -> VoiceSender {
        VoiceSender {
            command_tx: self.command_tx.0.clone(),
        }
    }
}

/// A handle to control the associated [voice connection] from other
/// tasks.
///
/// [voice connection]: super::VoiceConnection
#[derive(Debug, Clone)]
pub struct VoiceSender {
    command_tx: mpsc::UnboundedSender<VoiceCommand>,
}

impl VoiceSender {
    /// Whether the channel is closed.
    ///
    /// The channel will be closed if the associated [voice connection]
    /// has been dropped.
    ///
    /// [voice connection]: super::VoiceConnection
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Queues the current speaking status to be sent to the voice
    /// gateway.
    pub fn speaking(&self, flags: SpeakingFlags) -> Result<(), ChannelError> {
        self.command_tx
            .send(VoiceCommand::Speaking(flags))
            .map_err(|source| ChannelError {
                kind: ChannelErrorType::Closed,
                source: Some(Box::new(source)),
            })
    }

    /// Queues to close the associated [voice connection].
    ///
    /// [voice connection]: super::VoiceConnection
    pub fn close(&self, frame: CloseFrame<'static>) -> Result<(), ChannelError> {
        self.command_tx
            .send(VoiceCommand::Close(frame))
            .map_err(|source| ChannelError {
                kind: ChannelErrorType::Closed,
                source: Some(Box::new(source)),
            })
    }
}

#[derive(Debug)]
pub struct ChannelError {
    pub(crate) kind: ChannelErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl ChannelError {
    #[must_use]
    pub const fn kind(&self) -> &ChannelErrorType {
        &self.kind
    }
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ChannelErrorType::Closed => f.write_str("tried sending over a closed channel"),
        }
    }
}

impl Error for ChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ChannelErrorType {
    /// Tried sending over a closed channel.
    Closed,
}

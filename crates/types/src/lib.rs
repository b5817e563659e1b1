#![forbid(unsafe_code)]
#![warn(
    clippy::pedantic,
    clippy::must_use_candidate,
    clippy::empty_enum,
    clippy::unwrap_used
)]
#![allow(
    clippy::new_without_default,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

mod deserializers;

pub mod close_code;
pub mod id;
pub mod intents;
pub mod opcode;
pub mod payload;

pub use self::close_code::{CloseCode, ClosePolicy, VoiceCloseCode};
pub use self::id::{ChannelId, GuildId, UserId};
pub use self::intents::Intents;
pub use self::opcode::{OpCode, VoiceOpCode};
pub use self::payload::{CloseFrame, Envelope};

/// Discord gateway API version that heliograph currently speaks.
pub const API_VERSION: u8 = 10;

/// Discord voice gateway API version that heliograph currently speaks.
pub const VOICE_API_VERSION: u8 = 4;

/// Secret key size to encrypt/decrypt voice packets.
pub const SECRET_KEY_LEN: usize = 32;

mod hello;
mod identify;
mod ready;
mod resume;
mod select_protocol;
mod session_description;

pub use self::hello::VoiceHello;
pub use self::identify::VoiceIdentify;
pub use self::ready::VoiceReady;
pub use self::resume::VoiceResume;
pub use self::select_protocol::{SelectProtocol, SelectProtocolData};
pub use self::session_description::SessionDescription;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

// `heartbeat_interval` also appears here but it is an erroneous field
// and should be ignored; the authoritative one arrives in hello.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct VoiceReady {
    pub ssrc: u32,
    #[serde(with = "crate::deserializers::ip_string")]
    pub ip: IpAddr,
    pub port: u16,
    /// Encryption modes offered by the voice server, in no particular order.
    pub modes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::Token;
    use std::net::Ipv4Addr;

    #[test]
    fn structure() {
        let payload = VoiceReady {
            ssrc: 1,
            ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 1234,
            modes: vec!["xsalsa20_poly1305".to_string()],
        };
        serde_test::assert_tokens(
            &payload,
            &[
                Token::Struct {
                    name: "VoiceReady",
                    len: 4,
                },
                Token::Str("ssrc"),
                Token::U32(1),
                Token::Str("ip"),
                Token::Str("127.0.0.1"),
                Token::Str("port"),
                Token::U16(1234),
                Token::Str("modes"),
                Token::Seq { len: Some(1) },
                Token::Str("xsalsa20_poly1305"),
                Token::SeqEnd,
                Token::StructEnd,
            ],
        );
    }
}

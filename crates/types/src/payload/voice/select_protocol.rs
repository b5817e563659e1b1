use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct SelectProtocol {
    /// Always `"udp"` for the transport this crate implements.
    pub protocol: String,
    pub data: SelectProtocolData,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct SelectProtocolData {
    /// Externally visible address found through IP discovery.
    #[serde(with = "crate::deserializers::ip_string")]
    pub address: IpAddr,
    pub port: u16,
    pub mode: String,
}

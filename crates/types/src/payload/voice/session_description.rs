use serde::{Deserialize, Serialize};

use crate::SECRET_KEY_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Hash, Serialize)]
pub struct SessionDescription {
    pub mode: String,
    pub secret_key: [u8; SECRET_KEY_LEN],
}
